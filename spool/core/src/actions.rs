//! Action Registry
//!
//! Markup can only reference server or client behavior through strings, so
//! every callable an attribute points at is registered up front and referred
//! to by an opaque [`ActionHandle`]. Rendering resolves the handle to its
//! encoded form; a handle with no entry in the request's registry is a render
//! failure, never a silent fallback.
//!
//! Two encodings exist:
//!
//! - Server actions: `<path>?<param>=<key>`, dispatched back to the
//!   registered component when that URL is requested.
//! - Client actions: `(<source>)(event, ...<json args>)`, executed in the
//!   browser from an event-handler attribute.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::context::RenderContext;
use crate::error::RenderError;
use crate::frame::FrameStream;
use crate::node::{ComponentFn, Props};

/// Default query parameter that selects a server action
pub const DEFAULT_ACTION_PARAM: &str = "_action";

/// Opaque token standing in for a callable inside markup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionHandle(u64);

impl ActionHandle {
    /// Allocate a new process-unique handle
    #[must_use]
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

// ============================================================================
// Per-request registry
// ============================================================================

/// Handle to encoded-string table for one request
#[derive(Clone, Debug, Default)]
pub struct ActionRegistry {
    entries: HashMap<ActionHandle, String>,
}

impl ActionRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an encoded action under a fresh handle
    pub fn register(&mut self, encoded: impl Into<String>) -> ActionHandle {
        let handle = ActionHandle::next();
        self.entries.insert(handle, encoded.into());
        handle
    }

    /// Register an encoded action under an existing handle
    pub fn insert(&mut self, handle: ActionHandle, encoded: impl Into<String>) {
        self.entries.insert(handle, encoded.into());
    }

    /// Encoded form of a handle, if registered
    #[must_use]
    pub fn resolve(&self, handle: ActionHandle) -> Option<&str> {
        self.entries.get(&handle).map(String::as_str)
    }

    /// Number of registered actions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Server actions
// ============================================================================

struct ServerAction {
    key: String,
    handle: ActionHandle,
    invoke: ComponentFn,
}

/// Route-level table of server actions, built once at startup
#[derive(Clone, Default)]
pub struct ServerActions {
    entries: Vec<Arc<ServerAction>>,
}

impl ServerActions {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under a URL-safe key
    pub fn register<F>(&mut self, key: impl Into<String>, f: F) -> Result<ActionHandle, RenderError>
    where
        F: Fn(Props, RenderContext) -> FrameStream + Send + Sync + 'static,
    {
        let key = key.into();
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(RenderError::InvalidActionKey(key));
        }
        if self.entries.iter().any(|entry| entry.key == key) {
            return Err(RenderError::DuplicateAction(key));
        }

        let handle = ActionHandle::next();
        self.entries.push(Arc::new(ServerAction {
            key,
            handle,
            invoke: Arc::new(f),
        }));
        Ok(handle)
    }

    /// Component registered under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ComponentFn> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| Arc::clone(&entry.invoke))
    }

    /// Handle registered under `key`
    #[must_use]
    pub fn handle(&self, key: &str) -> Option<ActionHandle> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.handle)
    }

    /// All `(key, handle)` pairs in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, ActionHandle)> {
        self.entries
            .iter()
            .map(|entry| (entry.key.as_str(), entry.handle))
    }

    /// Number of registered actions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ServerActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(|(key, _)| key)).finish()
    }
}

/// URL of a server action relative to the current request
///
/// Keeps the existing query, replacing any earlier action selector.
#[must_use]
pub fn action_url(path: &str, query: Option<&str>, param: &str, key: &str) -> String {
    let mut pairs: Vec<&str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some(param))
        .collect();
    let selector = format!("{param}={key}");
    pairs.push(&selector);
    format!("{path}?{}", pairs.join("&"))
}

// ============================================================================
// Client actions
// ============================================================================

/// Script executed in the browser from an event-handler attribute
#[derive(Clone, Debug, PartialEq)]
pub struct ClientAction {
    source: String,
    args: Vec<Value>,
}

impl ClientAction {
    /// Action from a JavaScript function expression such as `(e) => e.target.form.submit()`
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument passed after the event
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Attribute-safe inline invocation
    #[must_use]
    pub fn encode(&self) -> String {
        let invocation = if self.args.is_empty() {
            format!("({})(event)", self.source)
        } else {
            format!(
                "({})(event, ...{})",
                self.source,
                Value::Array(self.args.clone())
            )
        };
        invocation.replace('"', "&quot;")
    }
}
