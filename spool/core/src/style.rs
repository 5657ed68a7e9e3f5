//! Scoped styles
//!
//! [`Styled`] pairs a tag with a block of CSS under a generated class name.
//! The style block is emitted once per response no matter how many instances
//! render; each instance gets the generated class plus any variant classes
//! selected through its props.
//!
//! ```ignore
//! let button = Styled::new("button", "padding: 4px 8px;")
//!     .variant("tone", "danger", "danger")
//!     .default_variant("tone", "plain");
//! let node = button.component(Props::new().with("tone", "danger").child("Delete"));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::context::RenderContext;
use crate::frame::render_once;
use crate::node::{component, el, AttrValue, Node, Props};

/// A `<style>` block
pub fn css(rules: &str) -> Node {
    Node::text(format!("<style>{rules}</style>"))
}

/// Tag with generated-class styling and prop-driven variants
#[derive(Clone, Debug)]
pub struct Styled {
    tag: String,
    class: String,
    rules: String,
    variants: BTreeMap<String, BTreeMap<String, String>>,
    defaults: BTreeMap<String, String>,
}

impl Styled {
    /// `rules` are scoped to a fresh class name
    pub fn new(tag: impl Into<String>, rules: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            class: format!("x{}", hex::encode(rand::random::<[u8; 4]>())),
            rules: rules.into(),
            variants: BTreeMap::new(),
            defaults: BTreeMap::new(),
        }
    }

    /// Add `class` when prop `prop` equals `value`
    #[must_use]
    pub fn variant(
        mut self,
        prop: impl Into<String>,
        value: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        self.variants
            .entry(prop.into())
            .or_default()
            .insert(value.into(), class.into());
        self
    }

    /// Value of a variant prop when the instance does not set it
    #[must_use]
    pub fn default_variant(mut self, prop: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(prop.into(), value.into());
        self
    }

    /// Generated class name
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Markup for one instance
    ///
    /// Props that are not variants become attributes; `false` and `null`
    /// props are omitted.
    pub fn render(&self, ctx: &RenderContext, mut props: Props) -> Node {
        let style = ctx.once(
            format!("style:{}", self.class),
            format!("<style>.{}{{{}}}</style>", self.class, self.rules),
        );

        let mut classes = vec![self.class.clone()];
        if let Some(extra) = props.str("class") {
            classes.push(extra.to_string());
        }
        for (prop, options) in &self.variants {
            let selected = props
                .str(prop)
                .or_else(|| self.defaults.get(prop).map(String::as_str));
            if let Some(class) = selected.and_then(|value| options.get(value)) {
                classes.push(class.clone());
            }
        }

        let mut element = el(self.tag.as_str()).attr("class", classes.join(" "));
        for (name, value) in props.values() {
            if name == "class" || self.variants.contains_key(name) {
                continue;
            }
            let value = match value {
                Value::Null | Value::Bool(false) => continue,
                Value::Bool(true) => AttrValue::Text(String::new()),
                Value::String(text) => AttrValue::Text(text.clone()),
                Value::Number(n) => n.as_f64().map_or_else(|| AttrValue::Text(n.to_string()), AttrValue::Number),
                other => AttrValue::Text(other.to_string()),
            };
            element = element.attr(name.as_str(), value);
        }

        Node::fragment([style, element.children(props.take_children()).into()])
    }

    /// Component node rendering one instance
    pub fn component(self: &Arc<Self>, props: Props) -> Node {
        let styled = Arc::clone(self);
        component(
            "styled",
            move |props: Props, ctx: RenderContext| render_once(styled.render(&ctx, props)),
            props,
        )
    }
}
