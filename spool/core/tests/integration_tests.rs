//! End-to-end rendering scenarios
//!
//! Each test builds a root component, runs it through the response driver and
//! inspects what a transport would put on the wire.

use futures::StreamExt;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use spool_core::{
    combine, component, el, frames, producer, render_once, render_response, ActionHandle, ClientAction,
    DriverState, Frame, FrameStream, Node, Props, RenderContext, RenderError, RequestInfo,
    ResponseBody, ServerActions,
};
use tokio::sync::oneshot;

fn ctx(path: &str) -> RenderContext {
    RenderContext::new(RequestInfo::new("GET", path))
}

async fn collect_items(body: &mut ResponseBody) -> Vec<Result<String, RenderError>> {
    let mut items = Vec::new();
    while let Some(item) = body.next().await {
        items.push(item);
    }
    items
}

async fn next_fragment(body: &mut ResponseBody) -> String {
    body.next().await.unwrap().unwrap()
}

// ============================================================================
// Head
// ============================================================================

#[tokio::test]
async fn test_status_then_text_gives_404_missing() {
    let root = producer(|emit| async move {
        emit.status(404).await?;
        emit.render("missing").await?;
        Ok(())
    });
    let response = render_response(ctx("/nope"), root).await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.into_string().await.unwrap(), "<!DOCTYPE html>missing");
}

#[tokio::test]
async fn test_headers_after_first_renderable_are_never_applied() {
    let root = frames([
        Frame::render(el("p").child("body")),
        Frame::SetHeaders(vec![("X-Late".into(), "1".into())]),
    ]);
    let mut response = render_response(ctx("/"), root).await.unwrap();
    assert_eq!(response.header("x-late"), None);

    let items = collect_items(&mut response.body).await;
    assert_eq!(items.last(), Some(&Err(RenderError::HeadersFinalized)));
    assert_eq!(response.header("x-late"), None);
}

#[tokio::test]
async fn test_late_redirect_from_nested_component_truncates() {
    let guard = component(
        "guard",
        |_props: Props, _ctx: RenderContext| {
            producer(|_emit| async move { Err(RenderError::redirect("/login")) })
        },
        Props::new(),
    );
    let root = render_once(el("main").child("head").child(guard).child("never"));
    let mut response = render_response(ctx("/"), root).await.unwrap();
    assert_eq!(response.status, 200);

    let items = collect_items(&mut response.body).await;
    assert_eq!(
        items,
        vec![
            Ok("<!DOCTYPE html>".to_string()),
            Ok("<main>".to_string()),
            Ok("head".to_string()),
            Err(RenderError::redirect("/login")),
        ]
    );
    assert_eq!(response.body.state(), DriverState::Closed);
}

// ============================================================================
// Actions
// ============================================================================

#[tokio::test]
async fn test_unregistered_action_never_reaches_markup() {
    let stray = ActionHandle::next();
    let root = render_once(el("form").attr("action", stray).child("fields"));
    let mut response = render_response(ctx("/"), root).await.unwrap();

    let items = collect_items(&mut response.body).await;
    assert_eq!(items.last(), Some(&Err(RenderError::UnresolvedAction(stray))));
    for item in items.iter().flatten() {
        assert!(!item.contains("action#"), "leaked {item:?}");
        assert!(!item.contains("fields"));
    }
}

#[tokio::test]
async fn test_server_action_url_round_trip() {
    let mut actions = ServerActions::new();
    let save = actions
        .register("save", |_props: Props, _ctx: RenderContext| render_once("saved"))
        .unwrap();

    let page_ctx = RenderContext::new(RequestInfo::new("GET", "/tasks").with_query("page=2"));
    page_ctx.register_server_actions(&actions);
    let submit =
        page_ctx.client_action(&ClientAction::new("(e) => e.target.form.requestSubmit()"));

    let root = render_once(
        el("form")
            .attr("method", "post")
            .attr("action", save)
            .child(el("select").attr("onchange", submit)),
    );
    let html = render_response(page_ctx, root)
        .await
        .unwrap()
        .into_string()
        .await
        .unwrap();
    assert_eq!(
        html,
        "<!DOCTYPE html><form method=\"post\" action=\"/tasks?page=2&_action=save\">\
         <select onchange=\"((e) => e.target.form.requestSubmit())(event)\"></select></form>"
    );

    // The action URL dispatches back to the registered component.
    let request = RequestInfo::new("POST", "/tasks").with_query("page=2&_action=save");
    let key = request.query_param("_action").unwrap();
    let invoke = actions.get(&key).unwrap();
    let action_ctx = RenderContext::new(request);
    let dispatched = invoke(Props::new(), action_ctx.clone());
    let body = render_response(action_ctx, dispatched)
        .await
        .unwrap()
        .into_string()
        .await
        .unwrap();
    assert_eq!(body, "<!DOCTYPE html>saved");
}

// ============================================================================
// Deferred pass and bookmarks
// ============================================================================

#[tokio::test]
async fn test_deferred_bookmark_patch_follows_initial_element() {
    let ctx = ctx("/login");
    let (release, wait) = oneshot::channel::<()>();
    let root = {
        let ctx = ctx.clone();
        producer(move |emit| async move {
            let bookmark = ctx.bookmark_with_id("greeting")?;
            emit.render(el("main").child(bookmark.write(el("p").child("Loading"))?))
                .await?;
            emit.defer().await?;
            let _ = wait.await;
            emit.render(bookmark.write(el("p").child("Hello"))?).await?;
            Ok(())
        })
    };

    let mut response = render_response(ctx, root).await.unwrap();
    let mut main = String::new();
    loop {
        let fragment = next_fragment(&mut response.body).await;
        main.push_str(&fragment);
        if fragment == "</main>" {
            break;
        }
    }
    assert!(main.contains("<marker id=\"greeting\"></marker><p>Loading</p>"));
    assert!(!main.contains("<template"));

    // The root is parked on the gate: nothing to send yet.
    let mut next = tokio_test::task::spawn(response.body.next());
    tokio_test::assert_pending!(next.poll());
    release.send(()).unwrap();
    let patch = tokio_test::assert_ready!(next.poll());
    drop(next);
    assert_eq!(
        patch,
        Some(Ok(
            r#"<template data-bookmark="greeting"><p>Hello</p></template><script>swap("greeting")</script>"#
                .to_string()
        ))
    );
    assert_eq!(response.body.next().await, None);
}

fn bookmark_writer(writes: usize) -> impl Fn(Props, RenderContext) -> FrameStream + Send + Sync {
    move |_props: Props, ctx: RenderContext| {
        producer(move |emit| async move {
            let bookmark = ctx.bookmark();
            emit.render(bookmark.write(el("span").child("v1"))?).await?;
            for n in 2..=writes {
                emit.defer().await?;
                emit.render(bookmark.write(el("span").child(format!("v{n}")))?)
                    .await?;
            }
            Ok(())
        })
    }
}

#[tokio::test]
async fn test_bookmark_with_one_write_has_no_patch() {
    let root = render_once(component("writer", bookmark_writer(1), Props::new()));
    let html = render_response(ctx("/"), root)
        .await
        .unwrap()
        .into_string()
        .await
        .unwrap();
    assert_eq!(html.matches("<marker").count(), 1);
    assert_eq!(html.matches("<template").count(), 0);
    assert!(html.contains("<span>v1</span>"));
}

#[tokio::test]
async fn test_bookmark_with_three_writes_has_two_patches() {
    let root = render_once(component("writer", bookmark_writer(3), Props::new()));
    let html = render_response(ctx("/"), root)
        .await
        .unwrap()
        .into_string()
        .await
        .unwrap();
    assert_eq!(html.matches("<marker").count(), 1);
    assert_eq!(html.matches("<template").count(), 2);
    assert_eq!(html.matches("function swap").count(), 1);

    let v2 = html.find("<span>v2</span>").unwrap();
    let v3 = html.find("<span>v3</span>").unwrap();
    assert!(html.find("<marker").unwrap() < v2);
    assert!(v2 < v3);
}

#[tokio::test]
async fn test_pre_defer_frames_in_main_pass_post_defer_in_deferred_pass() {
    let split = component(
        "split",
        |_props: Props, _ctx: RenderContext| {
            producer(|emit| async move {
                emit.render("pre1").await?;
                emit.render("pre2").await?;
                emit.defer().await?;
                emit.render("post1").await?;
                emit.render("post2").await?;
                Ok(())
            })
        },
        Props::new(),
    );
    let root = render_once(el("div").child(split).child("tail"));
    let mut response = render_response(ctx("/"), root).await.unwrap();

    let mut seen = Vec::new();
    while let Some(item) = response.body.next().await {
        seen.push((item.unwrap(), response.body.state()));
    }
    let main: Vec<&str> = seen
        .iter()
        .filter(|(_, state)| *state == DriverState::Streaming)
        .map(|(fragment, _)| fragment.as_str())
        .collect();
    let deferred: Vec<&str> = seen
        .iter()
        .filter(|(_, state)| *state == DriverState::DeferredFlush)
        .map(|(fragment, _)| fragment.as_str())
        .collect();

    assert_eq!(
        main,
        vec!["<!DOCTYPE html>", "<div>", "pre1", "pre2", "tail", "</div>"]
    );
    assert_eq!(deferred, vec!["post1", "post2"]);
}

fn gated_split(name: &'static str, gate: oneshot::Receiver<()>) -> Node {
    let gate = Mutex::new(Some(gate));
    component(
        name,
        move |_props: Props, _ctx: RenderContext| {
            let gate = gate.lock().take();
            producer(move |emit| async move {
                emit.render(format!("{name}-pre")).await?;
                emit.defer().await?;
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                emit.render(format!("{name}-post")).await?;
                Ok(())
            })
        },
        Props::new(),
    )
}

#[tokio::test]
async fn test_parked_producers_resume_in_arrival_order() {
    let (release_a, gate_a) = oneshot::channel();
    let (release_b, gate_b) = oneshot::channel();
    let root = render_once(Node::fragment([
        gated_split("a", gate_a),
        gated_split("b", gate_b),
    ]));
    let mut response = render_response(ctx("/"), root).await.unwrap();

    assert_eq!(next_fragment(&mut response.body).await, "<!DOCTYPE html>");
    assert_eq!(next_fragment(&mut response.body).await, "a-pre");
    assert_eq!(next_fragment(&mut response.body).await, "b-pre");

    release_b.send(()).unwrap();
    assert_eq!(next_fragment(&mut response.body).await, "b-post");
    assert_eq!(response.body.state(), DriverState::DeferredFlush);
    release_a.send(()).unwrap();
    assert_eq!(next_fragment(&mut response.body).await, "a-post");
    assert_eq!(response.body.next().await, None);
}

#[tokio::test]
async fn test_defer_inside_combined_sequence_parks_every_member() {
    let (release_b, gate_b) = oneshot::channel::<()>();
    let gate_b = Mutex::new(Some(gate_b));
    let pair = component(
        "pair",
        move |_props: Props, _ctx: RenderContext| {
            let gate = gate_b.lock().take();
            let a = frames([Frame::render("a1"), Frame::Defer, Frame::render("a2")]);
            let b = producer(move |emit| async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                emit.render("b1").await?;
                Ok(())
            });
            combine([a, b])
        },
        Props::new(),
    );
    let root = render_once(el("div").child(pair).child("tail"));
    let mut response = render_response(ctx("/"), root).await.unwrap();

    let mut main = Vec::new();
    loop {
        let fragment = next_fragment(&mut response.body).await;
        let done = fragment == "</div>";
        main.push(fragment);
        if done {
            break;
        }
    }
    assert_eq!(main, vec!["<!DOCTYPE html>", "<div>", "a1", "tail", "</div>"]);

    assert_eq!(next_fragment(&mut response.body).await, "a2");
    release_b.send(()).unwrap();
    assert_eq!(next_fragment(&mut response.body).await, "b1");
    assert_eq!(response.body.next().await, None);
}

// ============================================================================
// Concurrency and determinism
// ============================================================================

fn gated_panel(name: &'static str, gate: oneshot::Receiver<()>) -> Node {
    let gate = Mutex::new(Some(gate));
    component(
        name,
        move |_props: Props, _ctx: RenderContext| {
            let gate = gate.lock().take();
            producer(move |emit| async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                emit.render(el("section").child(name)).await?;
                Ok(())
            })
        },
        Props::new(),
    )
}

#[tokio::test]
async fn test_concurrent_panels_stream_in_completion_order() {
    let (release_a, gate_a) = oneshot::channel();
    let (release_b, gate_b) = oneshot::channel();
    let root = render_once(el("main").child(Node::concurrent([
        gated_panel("a", gate_a),
        gated_panel("b", gate_b),
    ])));
    let mut response = render_response(ctx("/"), root).await.unwrap();
    assert_eq!(next_fragment(&mut response.body).await, "<!DOCTYPE html>");
    assert_eq!(next_fragment(&mut response.body).await, "<main>");

    release_b.send(()).unwrap();
    assert_eq!(next_fragment(&mut response.body).await, "<section>b</section>");
    release_a.send(()).unwrap();
    assert_eq!(next_fragment(&mut response.body).await, "<section>a</section>");
    assert_eq!(next_fragment(&mut response.body).await, "</main>");
}

fn page() -> FrameStream {
    let card = |title: &'static str, count: i64| {
        component(
            "card",
            move |_props: Props, ctx: RenderContext| {
                producer(move |emit| async move {
                    emit.render(ctx.once("card-style", "<style>.card{}</style>")).await?;
                    emit.render(
                        el("article")
                            .attr("class", "card")
                            .child(el("h2").child(title))
                            .child(count),
                    )
                    .await?;
                    Ok(())
                })
            },
            Props::new(),
        )
    };
    render_once(el("main").children([card("Open", 1200), card("Closed", 0)]))
}

#[tokio::test]
async fn test_rendering_is_deterministic() {
    let first = render_response(ctx("/"), page())
        .await
        .unwrap()
        .into_string()
        .await
        .unwrap();
    let second = render_response(ctx("/"), page())
        .await
        .unwrap()
        .into_string()
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first,
        "<!DOCTYPE html><main><style>.card{}</style>\
         <article class=\"card\"><h2>Open</h2>1,200</article>\
         <article class=\"card\"><h2>Closed</h2>0</article></main>"
    );
}
