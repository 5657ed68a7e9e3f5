//! Virtual Node Model
//!
//! Immutable descriptions of what to render. Building a node never performs
//! I/O; components only run once the renderer reaches them.
//!
//! # Example
//!
//! ```ignore
//! use spool_core::node::{el, Node};
//!
//! let page: Node = el("main")
//!     .attr("class", "page")
//!     .child(el("h1").child("Projects"))
//!     .child(3)
//!     .into();
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::num::FpCategory;
use std::sync::Arc;

use serde_json::Value;

use crate::actions::ActionHandle;
use crate::context::RenderContext;
use crate::frame::FrameStream;

// ============================================================================
// Components
// ============================================================================

/// A component body: props in, frame sequence out
pub type ComponentFn = Arc<dyn Fn(Props, RenderContext) -> FrameStream + Send + Sync>;

/// Named properties handed to a component
#[derive(Clone, Debug, Default)]
pub struct Props {
    values: BTreeMap<String, Value>,
    children: Vec<Node>,
}

impl Props {
    /// Empty props
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Append a child node
    #[must_use]
    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    /// Replace the children
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children = children.into_iter().collect();
        self
    }

    /// Raw property value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Property as a string slice, if it is a JSON string
    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// All properties in key order
    pub fn values(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Children passed to the component
    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Move the children out, usually to wrap them in the component's own markup
    pub fn take_children(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.children)
    }
}

/// A component invocation waiting to be executed by the renderer
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    invoke: ComponentFn,
    props: Props,
}

impl Component {
    /// Create an invocation of `invoke` with `props`
    pub fn new(name: &'static str, invoke: ComponentFn, props: Props) -> Self {
        Self {
            name,
            invoke,
            props,
        }
    }

    /// Name used in logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Props the component will receive
    #[must_use]
    pub fn props(&self) -> &Props {
        &self.props
    }

    /// Start the component's frame sequence
    pub fn invoke(self, ctx: RenderContext) -> FrameStream {
        (self.invoke)(self.props, ctx)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("props", &self.props)
            .finish()
    }
}

/// Build a component node from a plain function or closure
pub fn component<F>(name: &'static str, f: F, props: Props) -> Node
where
    F: Fn(Props, RenderContext) -> FrameStream + Send + Sync + 'static,
{
    Node::Component(Component::new(name, Arc::new(f), props))
}

// ============================================================================
// Attributes
// ============================================================================

/// Value of an element attribute
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// Literal text, emitted verbatim
    Text(String),
    /// Number, emitted in its shortest round-trip form without grouping
    Number(f64),
    /// Reference to a registered action, resolved at render time
    Action(ActionHandle),
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<ActionHandle> for AttrValue {
    fn from(value: ActionHandle) -> Self {
        Self::Action(value)
    }
}

macro_rules! number_conversions {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for AttrValue {
                fn from(value: $ty) -> Self {
                    Self::Number(value as f64)
                }
            }

            impl From<$ty> for Node {
                fn from(value: $ty) -> Self {
                    Self::Number(value as f64)
                }
            }
        )*
    };
}

number_conversions!(i32, i64, u32, u64, usize, f32, f64);

// ============================================================================
// Nodes
// ============================================================================

/// An element with ordered attributes and children
#[derive(Clone, Debug)]
pub struct Element {
    /// Tag name
    pub tag: String,
    /// Attributes in insertion order
    pub attributes: Vec<(String, AttrValue)>,
    /// Children in document order
    pub children: Vec<Node>,
}

impl Element {
    /// New element without attributes or children
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Set an attribute, replacing an earlier value with the same name
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
        self
    }

    /// Set an attribute only when a value is present
    #[must_use]
    pub fn attr_opt<V: Into<AttrValue>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.attr(name, value),
            None => self,
        }
    }

    /// Append a child
    #[must_use]
    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    /// Append several children
    #[must_use]
    pub fn children<I, N>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children.extend(nodes.into_iter().map(Into::into));
        self
    }
}

/// Shorthand for [`Element::new`]
pub fn el(tag: impl Into<String>) -> Element {
    Element::new(tag)
}

/// A renderable description
#[derive(Clone, Debug, Default)]
pub enum Node {
    /// Tag with attributes and children
    Element(Element),
    /// Component invocation
    Component(Component),
    /// Children without a wrapping tag
    Fragment(Vec<Node>),
    /// Independent children rendered concurrently, emitted in completion order
    Concurrent(Vec<Node>),
    /// Markup emitted verbatim
    Text(String),
    /// Number emitted with locale formatting
    Number(f64),
    /// Rendered only where the renderer first reaches `key` in this response
    Once {
        /// Dedup key, claimed at render time
        key: String,
        /// Content of the first occurrence
        node: Box<Node>,
    },
    /// Nothing
    #[default]
    Empty,
}

impl Node {
    /// Text leaf
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Fragment of the given children
    pub fn fragment<I, N>(nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        Self::Fragment(nodes.into_iter().map(Into::into).collect())
    }

    /// Independent children that may render concurrently
    pub fn concurrent<I, N>(nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        Self::Concurrent(nodes.into_iter().map(Into::into).collect())
    }

    /// Whether the renderer skips this node (0 is not falsy)
    #[must_use]
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::Number(n) => n.is_nan(),
            _ => false,
        }
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

impl From<Component> for Node {
    fn from(value: Component) -> Self {
        Self::Component(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Self::Fragment(value)
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

// ============================================================================
// Formatting helpers
// ============================================================================

/// Format a number the way `toLocaleString()` does for en-US
///
/// Thousands are grouped with commas and at most three fraction digits are kept.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "∞" } else { "-∞" }.to_string();
    }

    let fixed = format!("{:.3}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let mut out = String::new();
    if value < 0.0 && (int_part != "0" || !frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// Format a number for an attribute value, as JavaScript's `String(n)` does
///
/// No grouping, no trailing `.0`, and the shortest digits that round-trip.
/// Magnitudes outside `1e-6..1e21` use exponent notation (`1e+21`, `1e-7`).
#[must_use]
pub fn format_attr_number(value: f64) -> String {
    match value.classify() {
        FpCategory::Nan => return "NaN".to_string(),
        FpCategory::Infinite => {
            return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
        }
        FpCategory::Zero => return "0".to_string(),
        FpCategory::Subnormal | FpCategory::Normal => {}
    }

    let magnitude = value.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return value.to_string();
    }
    let exponent = format!("{value:e}");
    match exponent.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exponent,
    }
}

/// Escape text for use inside markup or a double-quoted attribute
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
