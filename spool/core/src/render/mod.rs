//! Tree Renderer
//!
//! Walks a node tree depth-first and produces a flat stream of markup
//! fragments. Components are executed when the walk reaches them; their
//! frames are expanded in place, so a slow component holds back only the
//! markup that follows it.
//!
//! The walk is an explicit work stack rather than recursion:
//!
//! ```text
//!   stack (top last)                      emitted
//!   [Node(<div>)]                       → "<div>"
//!   [Markup("</div>"), Node(B), Node(A)]
//!   [Markup("</div>"), Node(B), Producer(A)]   ... A's frames
//!   [Markup("</div>"), Node(B)]               ... B
//!   [Markup("</div>")]                  → "</div>"
//! ```
//!
//! A `Defer` frame during the main pass moves the producer from the stack
//! into the context's parked set and the walk carries on with the next
//! sibling. `Node::Concurrent` children are rendered to completion through
//! the [`Combinator`] and emitted whole, in completion order.

pub mod bookmark;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream};
use futures::{Future, StreamExt, TryStreamExt};
use tracing::{debug, warn};

use crate::combinator::Combinator;
use crate::context::{Phase, RenderContext};
use crate::error::RenderError;
use crate::frame::{Frame, FrameStream};
use crate::node::{format_attr_number, format_number, AttrValue, Element, Node};

/// Stream of rendered markup fragments
pub type FragmentStream = BoxStream<'static, Result<String, RenderError>>;

enum Work {
    Node(Node),
    Markup(String),
    Producer {
        name: &'static str,
        stream: FrameStream,
    },
    Merge(Combinator<FragmentStream>),
}

/// Depth-first renderer over one subtree
pub struct TreeWalk {
    ctx: RenderContext,
    stack: Vec<Work>,
    failed: bool,
}

impl TreeWalk {
    /// Walk starting at `node`
    #[must_use]
    pub fn new(ctx: RenderContext, node: Node) -> Self {
        Self {
            ctx,
            stack: vec![Work::Node(node)],
            failed: false,
        }
    }

    /// Walk the frames of an already running producer
    #[must_use]
    pub fn from_producer(ctx: RenderContext, name: &'static str, stream: FrameStream) -> Self {
        Self {
            ctx,
            stack: vec![Work::Producer { name, stream }],
            failed: false,
        }
    }

    /// Render `node` first, then keep pulling `stream`
    #[must_use]
    pub(crate) fn resume(
        ctx: RenderContext,
        name: &'static str,
        stream: FrameStream,
        node: Node,
    ) -> Self {
        Self {
            ctx,
            stack: vec![Work::Producer { name, stream }, Work::Node(node)],
            failed: false,
        }
    }

    fn fail(&mut self, err: RenderError) -> Poll<Option<Result<String, RenderError>>> {
        self.failed = true;
        self.stack.clear();
        Poll::Ready(Some(Err(err)))
    }

    /// Expand one node, returning markup to emit right away
    fn expand(&mut self, node: Node) -> Result<Option<String>, RenderError> {
        if node.is_falsy() {
            return Ok(None);
        }
        match node {
            Node::Element(element) => {
                let open = self.open_tag(&element)?;
                self.stack.push(Work::Markup(format!("</{}>", element.tag)));
                self.stack
                    .extend(element.children.into_iter().rev().map(Work::Node));
                Ok(Some(open))
            }
            Node::Fragment(children) => {
                self.stack.extend(children.into_iter().rev().map(Work::Node));
                Ok(None)
            }
            Node::Concurrent(children) => {
                let merge = children
                    .into_iter()
                    .map(|child| stream::once(render_to_string(self.ctx.clone(), child)).boxed())
                    .collect();
                self.stack.push(Work::Merge(merge));
                Ok(None)
            }
            Node::Component(component) => {
                let name = component.name();
                debug!(component = name, "invoking component");
                let stream = component.invoke(self.ctx.clone());
                self.stack.push(Work::Producer { name, stream });
                Ok(None)
            }
            Node::Text(text) => Ok(Some(text)),
            Node::Number(n) => Ok(Some(format_number(n))),
            Node::Once { key, node } => {
                if self.ctx.claim_once(&key) {
                    self.stack.push(Work::Node(*node));
                }
                Ok(None)
            }
            Node::Empty => Ok(None),
        }
    }

    fn open_tag(&self, element: &Element) -> Result<String, RenderError> {
        if !is_valid_name(&element.tag) {
            return Err(RenderError::Protocol(format!(
                "invalid tag name {:?}",
                element.tag
            )));
        }

        let mut open = format!("<{}", element.tag);
        for (name, value) in &element.attributes {
            if !is_valid_name(name) {
                return Err(RenderError::Protocol(format!(
                    "invalid attribute name {name:?} on <{}>",
                    element.tag
                )));
            }
            let value = match value {
                AttrValue::Text(text) => text.clone(),
                AttrValue::Number(n) => format_attr_number(*n),
                AttrValue::Action(handle) => self
                    .ctx
                    .resolve_action(*handle)
                    .ok_or(RenderError::UnresolvedAction(*handle))?,
            };
            open.push_str(&format!(" {name}=\"{value}\""));
        }
        open.push('>');
        Ok(open)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '\'' | '/' | '='))
}

impl Stream for TreeWalk {
    type Item = Result<String, RenderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.failed {
            return Poll::Ready(None);
        }

        loop {
            let Some(work) = this.stack.pop() else {
                return Poll::Ready(None);
            };

            match work {
                Work::Markup(markup) => return Poll::Ready(Some(Ok(markup))),
                Work::Node(node) => match this.expand(node) {
                    Ok(Some(markup)) => return Poll::Ready(Some(Ok(markup))),
                    Ok(None) => {}
                    Err(err) => return this.fail(err),
                },
                Work::Producer { name, mut stream } => match stream.poll_next_unpin(cx) {
                    Poll::Pending => {
                        this.stack.push(Work::Producer { name, stream });
                        return Poll::Pending;
                    }
                    Poll::Ready(None) => {}
                    Poll::Ready(Some(Err(err))) => return this.fail(err),
                    Poll::Ready(Some(Ok(frame))) => match frame {
                        Frame::Renderable(node) => {
                            this.stack.push(Work::Producer { name, stream });
                            this.stack.push(Work::Node(node));
                        }
                        Frame::Defer => match this.ctx.phase() {
                            Phase::Main => this.ctx.park(name, stream),
                            // No later pass to park for: keep pulling.
                            Phase::Deferred => this.stack.push(Work::Producer { name, stream }),
                        },
                        Frame::SetStatus(_) | Frame::SetHeaders(_) => {
                            warn!(component = name, "status or headers set after the response started");
                            return this.fail(RenderError::HeadersFinalized);
                        }
                    },
                },
                Work::Merge(mut merge) => match merge.poll_next_unpin(cx) {
                    Poll::Pending => {
                        this.stack.push(Work::Merge(merge));
                        return Poll::Pending;
                    }
                    Poll::Ready(None) => {}
                    Poll::Ready(Some(Ok(markup))) => {
                        this.stack.push(Work::Merge(merge));
                        return Poll::Ready(Some(Ok(markup)));
                    }
                    Poll::Ready(Some(Err(err))) => return this.fail(err),
                },
            }
        }
    }
}

/// Render a node tree as a stream of fragments
#[must_use]
pub fn render(ctx: RenderContext, node: impl Into<Node>) -> TreeWalk {
    TreeWalk::new(ctx, node.into())
}

/// Render a node tree into one string
pub fn render_to_string(
    ctx: RenderContext,
    node: Node,
) -> impl Future<Output = Result<String, RenderError>> + Send + 'static {
    TreeWalk::new(ctx, node).try_collect::<String>()
}
