//! Sign-in page
//!
//! The form posts to the `login` server action, which answers with a
//! redirect either way. Below the form a greeting bookmark is written once in
//! the main pass and rewritten twice from the deferred pass.

use std::sync::Arc;
use std::time::Duration;

use spool_core::node::escape;
use spool_core::style::css;
use spool_core::{
    component, el, producer, Node, Props, RenderContext, RenderError, ServerActions, Styled,
};
use tracing::{info, warn};

use super::{layout, session, DemoStore};
use crate::server::Page;

const FORM_STYLE: &str = "form.login{display:flex;flex-direction:column;gap:.5rem}";

pub fn page(store: &Arc<DemoStore>) -> Result<Page, RenderError> {
    let mut actions = ServerActions::new();
    let login_store = Arc::clone(store);
    let login = actions.register("login", move |_props: Props, ctx: RenderContext| {
        let store = Arc::clone(&login_store);
        producer(move |_emit| async move {
            let request = ctx.request();
            if request.method != "POST" {
                return Err(RenderError::redirect("/login"));
            }
            let username = request.form_value("username").unwrap_or_default();
            let password = request.form_value("password").unwrap_or_default();
            if !store.verify(username, password) {
                warn!(user = username, "rejected sign-in");
                return Err(RenderError::redirect(
                    "/login?error=Invalid+username+or+password",
                ));
            }

            let session = session(&ctx)?;
            store.sign_in(&session, username);
            info!(user = username, "signed in");
            Err(RenderError::redirect("/"))
        })
    })?;

    let container = Arc::new(Styled::new(
        "div",
        "max-width:24rem;margin:4rem auto;font-family:sans-serif",
    ));
    let alert = Arc::new(
        Styled::new("p", "padding:.5rem;border-radius:4px")
            .variant("tone", "error", "alert-error")
            .variant("tone", "notice", "alert-notice")
            .default_variant("tone", "notice"),
    );
    let delay = store.delay();

    let page = Page::new(move |_props: Props, ctx: RenderContext| {
        let container = Arc::clone(&container);
        let alert = Arc::clone(&alert);
        producer(move |emit| async move {
            session(&ctx)?;

            let request = ctx.request();
            let message = match (request.query_param("error"), request.query_param("notice")) {
                (Some(error), _) => Some(("error", error)),
                (None, Some(notice)) => Some(("notice", notice)),
                (None, None) => None,
            };
            let alert = message.map(|(tone, text)| {
                alert.component(
                    Props::new()
                        .with("tone", tone)
                        .with("role", "alert")
                        .child(escape(&text)),
                )
            });

            let form = el("form")
                .attr("class", "login")
                .attr("method", "post")
                .attr("action", login)
                .child(el("input").attr("name", "username").attr("placeholder", "Username"))
                .child(
                    el("input")
                        .attr("name", "password")
                        .attr("type", "password")
                        .attr("placeholder", "Password"),
                )
                .child(el("button").attr("type", "submit").child("Sign in"));

            emit.render(layout(
                "Sign in",
                container.component(Props::new().with_children([
                    el("h1").child("Sign in").into(),
                    Node::from(alert),
                    ctx.once("login-form-style", css(FORM_STYLE)),
                    form.into(),
                    el("p").child("Try demo / demo").into(),
                    greeting(delay),
                ])),
            ))
            .await?;
            Ok(())
        })
    });
    Ok(page.with_actions(actions))
}

/// Bookmark written three times: once inline, twice from the deferred pass
fn greeting(delay: Duration) -> Node {
    component(
        "greeting",
        move |_props: Props, ctx: RenderContext| {
            producer(move |emit| async move {
                let bookmark = ctx.bookmark();
                emit.render(bookmark.write(el("p").child("Hello"))?).await?;
                emit.defer().await?;

                tokio::time::sleep(delay).await;
                emit.render(bookmark.write(el("p").child("Hello World"))?)
                    .await?;
                tokio::time::sleep(delay).await;
                emit.render(bookmark.write(el("p").child("Hello World!!!"))?)
                    .await?;
                Ok(())
            })
        },
        Props::new(),
    )
}
