//! Counter
//!
//! The saved value lives in the store and changes through the `increment`
//! server action. The preview value only changes in the browser, through a
//! client action bound to the button's `onclick`.

use std::sync::Arc;

use serde_json::json;
use spool_core::{
    el, producer, script, ClientAction, Props, RenderContext, RenderError, ServerActions,
};
use tracing::debug;

use super::{layout, session, DemoStore};
use crate::server::Page;

const PREVIEW_STEP: &str =
    "(event, step) => { const out = document.getElementById('preview'); out.value = Number(out.value) + step; }";

const PREVIEW_RESET: &str =
    "(event, value) => { document.getElementById('preview').value = value; }";

pub fn page(store: &Arc<DemoStore>) -> Result<Page, RenderError> {
    let mut actions = ServerActions::new();
    let increment_store = Arc::clone(store);
    let increment = actions.register("increment", move |_props: Props, ctx: RenderContext| {
        let store = Arc::clone(&increment_store);
        producer(move |_emit| async move {
            let session = session(&ctx)?;
            let count = store.increment(&session);
            debug!(count, "counter saved");
            Err(RenderError::redirect("/counter"))
        })
    })?;

    let store = Arc::clone(store);
    let page = Page::new(move |_props: Props, ctx: RenderContext| {
        let store = Arc::clone(&store);
        producer(move |emit| async move {
            let session = session(&ctx)?;
            let count = store.count(&session);
            let step = ctx.client_action(&ClientAction::new(PREVIEW_STEP).arg(1));

            emit.render(layout(
                "Counter",
                el("main")
                    .child(el("h1").child("Counter"))
                    .child(
                        el("p")
                            .child("Saved: ")
                            .child(el("strong").attr("id", "saved").child(count)),
                    )
                    .child(
                        el("form")
                            .attr("method", "post")
                            .attr("action", increment)
                            .child(el("button").attr("type", "submit").child("Save +1")),
                    )
                    .child(
                        el("p")
                            .child("Preview: ")
                            .child(el("output").attr("id", "preview").child(count)),
                    )
                    .child(
                        el("button")
                            .attr("type", "button")
                            .attr("onclick", step)
                            .child("Preview +1"),
                    )
                    .child(
                        el("button")
                            .attr("type", "button")
                            .attr("class", "reset")
                            .child("Reset preview"),
                    )
                    .child(script::bind("button.reset", "click", PREVIEW_RESET, &[json!(count)]))
                    .child(el("a").attr("href", "/").child("Back")),
            ))
            .await?;
            Ok(())
        })
    });
    Ok(page.with_actions(actions))
}
