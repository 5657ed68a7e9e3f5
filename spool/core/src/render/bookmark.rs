//! Bookmarks
//!
//! A bookmark is a named slot in the response. The first write lands in the
//! main pass together with a placeholder; every later write happens in the
//! deferred pass and is shipped as a template plus an inline call that moves
//! the template content over the element following the placeholder.
//!
//! ```text
//!   main:      <marker id="bm-1a2b3c4d"></marker><p>Loading…</p>
//!   deferred:  <template data-bookmark="bm-1a2b3c4d"><p>Done</p></template>
//!              <script>swap("bm-1a2b3c4d")</script>
//! ```
//!
//! Content written to a bookmark should be a single element so the swap has
//! exactly one node to replace.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::{Phase, RenderContext};
use crate::error::RenderError;
use crate::node::{el, Node};

/// Emit-once key of the swap helper
pub const SWAP_HELPER_KEY: &str = "spool:bookmark-swap";

/// Client-side helper that applies a deferred bookmark write
pub const SWAP_HELPER: &str = "<script>function swap(id){var m=document.getElementById(id),\
s=document.currentScript,t=s.previousElementSibling,o=m.nextElementSibling;\
if(o){o.replaceWith(t.content)}else{m.after(t.content)}t.remove();s.remove();}</script>";

/// Named slot whose content can be replaced later in the response
#[derive(Clone, Debug)]
pub struct Bookmark {
    ctx: RenderContext,
    id: String,
    writes: Arc<AtomicUsize>,
}

impl Bookmark {
    /// Random id of the form `bm-` followed by eight hex digits
    #[must_use]
    pub fn generate_id() -> String {
        format!("bm-{}", hex::encode(rand::random::<[u8; 4]>()))
    }

    pub(crate) fn new(ctx: RenderContext, id: String) -> Self {
        Self {
            ctx,
            id,
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Placeholder element id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Writes accepted so far
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Markup for the next write of `content`
    ///
    /// The first write must happen in the main pass, every later one in the
    /// deferred pass.
    pub fn write(&self, content: impl Into<Node>) -> Result<Node, RenderError> {
        let phase = self.ctx.phase();
        let first = self.writes() == 0;

        match (first, phase) {
            (true, Phase::Deferred) => {
                return Err(RenderError::BookmarkFirstWriteDeferred(self.id.clone()))
            }
            (false, Phase::Main) => {
                return Err(RenderError::BookmarkPatchInMainPass(self.id.clone()))
            }
            _ => {}
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        if first {
            return Ok(Node::fragment([
                self.ctx.once(SWAP_HELPER_KEY, SWAP_HELPER),
                Node::from(el("marker").attr("id", self.id.as_str())),
                content.into(),
            ]));
        }

        // JSON string literal doubles as a JS string literal.
        let target = serde_json::Value::from(self.id.as_str());
        Ok(Node::fragment([
            Node::from(
                el("template")
                    .attr("data-bookmark", self.id.as_str())
                    .child(content),
            ),
            Node::text(format!("<script>swap({target})</script>")),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestInfo;
    use crate::render::render_to_string;
    use pretty_assertions::assert_eq;

    fn ctx() -> RenderContext {
        RenderContext::new(RequestInfo::new("GET", "/login"))
    }

    #[test]
    fn test_generated_ids() {
        let id = Bookmark::generate_id();
        assert_eq!(id.len(), 11);
        assert!(id.starts_with("bm-"));
        assert!(id[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_first_write_emits_helper_marker_and_content() {
        let ctx = ctx();
        let bookmark = ctx.bookmark_with_id("greeting").unwrap();
        let node = bookmark.write(el("p").child("hello")).unwrap();
        let html = render_to_string(ctx.clone(), node).await.unwrap();
        assert_eq!(
            html,
            format!("{SWAP_HELPER}<marker id=\"greeting\"></marker><p>hello</p>")
        );
        assert_eq!(bookmark.writes(), 1);
    }

    #[tokio::test]
    async fn test_helper_is_emitted_once_per_response() {
        let ctx = ctx();
        let a = ctx.bookmark_with_id("a").unwrap().write("x").unwrap();
        let b = ctx.bookmark_with_id("b").unwrap().write("y").unwrap();
        let html = render_to_string(ctx, Node::fragment([a, b])).await.unwrap();
        assert_eq!(html.matches("function swap").count(), 1);
        assert_eq!(html.matches("<marker").count(), 2);
    }

    #[tokio::test]
    async fn test_unrendered_first_write_leaves_helper_for_the_next_one() {
        let ctx = ctx();
        let abandoned = ctx.bookmark_with_id("abandoned").unwrap().write("x").unwrap();
        drop(abandoned);

        let node = ctx.bookmark_with_id("shown").unwrap().write("y").unwrap();
        let html = render_to_string(ctx, node).await.unwrap();
        assert_eq!(
            html,
            format!("{SWAP_HELPER}<marker id=\"shown\"></marker>y")
        );
    }

    #[tokio::test]
    async fn test_later_writes_are_patches() {
        let ctx = ctx();
        let bookmark = ctx.bookmark_with_id("greeting").unwrap();
        bookmark.write("first").unwrap();

        assert_eq!(
            bookmark.write("too early").unwrap_err(),
            RenderError::BookmarkPatchInMainPass("greeting".into())
        );

        ctx.set_phase(Phase::Deferred);
        let node = bookmark.write(el("p").child("later")).unwrap();
        let html = render_to_string(ctx, node).await.unwrap();
        assert_eq!(
            html,
            r#"<template data-bookmark="greeting"><p>later</p></template><script>swap("greeting")</script>"#
        );
        assert_eq!(bookmark.writes(), 2);
    }

    #[test]
    fn test_first_write_in_deferred_pass_is_rejected() {
        let ctx = ctx();
        ctx.set_phase(Phase::Deferred);
        let bookmark = ctx.bookmark_with_id("late").unwrap();
        assert_eq!(
            bookmark.write("x").unwrap_err(),
            RenderError::BookmarkFirstWriteDeferred("late".into())
        );
        assert_eq!(bookmark.writes(), 0);
    }
}
