//! Spool Core - Streaming Server-Side Rendering Runtime
//!
//! Turns a tree of declarative view descriptions into an HTTP body that is
//! streamed as it is produced. Slow regions can step aside with a `Defer`
//! frame and fill in later through inline patch instructions, without
//! holding back the rest of the page.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         HTTP edge (spool-server)                  │
//! │        route → RenderContext + root component → RenderedResponse │
//! └───────────────────────────────┬───────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼───────────────────────────────────┐
//! │                          SPOOL CORE                               │
//! │                                                                   │
//! │   Node tree ──► TreeWalk ──► fragments ──► ResponseBody ──► bytes │
//! │                   │  ▲                        │                   │
//! │        Defer      │  │ Concurrent             │ deferred pass     │
//! │                   ▼  │                        ▼                   │
//! │            RenderContext (parked producers, actions, emit-once)   │
//! │                        │                                          │
//! │                   Combinator (completion-order merge)             │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Node`]: what to render (elements, components, text, numbers)
//! - [`Frame`] / [`FrameStream`]: what a component yields
//! - [`RenderContext`]: per-request state passed to every component
//! - [`Combinator`]: merges frame sequences by completion order
//! - [`RenderedResponse`] / [`ResponseBody`]: finalized head plus the body stream
//! - [`Bookmark`]: a slot that can be rewritten after streaming started
//!
//! # Quick Start
//!
//! ```ignore
//! use spool_core::{producer, render_response, el, RenderContext, RequestInfo};
//!
//! let ctx = RenderContext::new(RequestInfo::new("GET", "/missing"));
//! let root = producer(|emit| async move {
//!     emit.status(404).await?;
//!     emit.render(el("p").child("missing")).await?;
//!     Ok(())
//! });
//! let response = render_response(ctx, root).await?;
//! assert_eq!(response.status, 404);
//! ```
//!
//! # Module Overview
//!
//! - [`node`]: virtual nodes, props, attribute values
//! - [`frame`]: component frames and the `producer` adapter
//! - [`context`]: request metadata and per-request render state
//! - [`actions`]: server and client action registry
//! - [`combinator`]: completion-order stream merge
//! - [`render`]: tree walker and bookmarks
//! - [`response`]: response driver state machine
//! - [`script`]: inline client script helpers
//! - [`style`]: scoped style blocks
//! - [`config`]: TOML + environment configuration
//!
//! # No HTTP Framework Dependencies
//!
//! This crate only produces status, headers and string fragments. Binding
//! them to a server is the job of the edge crate.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actions;
pub mod combinator;
pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod node;
pub mod render;
pub mod response;
pub mod script;
pub mod style;

pub use actions::{ActionHandle, ActionRegistry, ClientAction, ServerActions, DEFAULT_ACTION_PARAM};
pub use combinator::{combine, Combinator};
pub use context::{Phase, RenderContext, RequestInfo};
pub use error::RenderError;
pub use frame::{frames, producer, render_once, Emitter, Frame, FrameStream};
pub use node::{component, el, AttrValue, Component, ComponentFn, Element, Node, Props};
pub use render::bookmark::Bookmark;
pub use render::{render, render_to_string, TreeWalk};
pub use response::{
    render_response, render_response_with, DriverState, RenderOptions, RenderedResponse,
    ResponseBody,
};
pub use style::Styled;

// Config exports
pub use config::{
    default_config_path, load_config_from_path, ConfigError, ConfigOverrides, ConfigSource,
    SpoolConfig, SpoolToml,
};
