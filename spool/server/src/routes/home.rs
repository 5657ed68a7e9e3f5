//! Dashboard
//!
//! Two panels with different latencies render through `Node::concurrent`, so
//! the faster one reaches the browser first regardless of declaration order.

use std::sync::Arc;
use std::time::Duration;

use spool_core::{component, el, producer, Node, Props, RenderContext, RenderError, ServerActions};
use tracing::info;

use super::{layout, session, DemoStore};
use crate::server::Page;

const OPEN_TASKS: &[&str] = &["Review pull requests", "Rotate API keys", "Plan the release"];
const ACTIVITY: &[&str] = &["demo signed in", "counter saved", "deploy finished"];

pub fn page(store: &Arc<DemoStore>) -> Result<Page, RenderError> {
    let mut actions = ServerActions::new();
    let sign_out_store = Arc::clone(store);
    let sign_out = actions.register("logout", move |_props: Props, ctx: RenderContext| {
        let store = Arc::clone(&sign_out_store);
        producer(move |_emit| async move {
            let session = session(&ctx)?;
            store.sign_out(&session);
            info!("signed out");
            Err(RenderError::redirect("/login?notice=Signed+out"))
        })
    })?;

    let store = Arc::clone(store);
    let page = Page::new(move |_props: Props, ctx: RenderContext| {
        let store = Arc::clone(&store);
        producer(move |emit| async move {
            let session = session(&ctx)?;
            let Some(user) = store.user(&session) else {
                return Err(RenderError::redirect("/login"));
            };

            let delay = store.delay();
            emit.render(layout(
                "Dashboard",
                el("main")
                    .child(el("h1").child(format!("Welcome, {user}")))
                    .child(Node::concurrent([
                        panel("Open tasks", OPEN_TASKS, delay * 2),
                        panel("Activity", ACTIVITY, delay),
                    ]))
                    .child(el("a").attr("href", "/counter").child("Counter"))
                    .child(
                        el("form")
                            .attr("method", "post")
                            .attr("action", sign_out)
                            .child(el("button").attr("type", "submit").child("Sign out")),
                    ),
            ))
            .await?;
            Ok(())
        })
    });
    Ok(page.with_actions(actions))
}

/// Slow section listing `items`
fn panel(title: &'static str, items: &'static [&'static str], delay: Duration) -> Node {
    component(
        "panel",
        move |_props: Props, _ctx: RenderContext| {
            producer(move |emit| async move {
                tokio::time::sleep(delay).await;
                emit.render(
                    el("section")
                        .child(el("h2").child(title))
                        .child(el("p").child(items.len()).child(" items"))
                        .child(el("ul").children(items.iter().map(|item| el("li").child(*item)))),
                )
                .await?;
                Ok(())
            })
        },
        Props::new(),
    )
}
