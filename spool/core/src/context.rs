//! Per-Request Render Context
//!
//! Exactly one [`RenderContext`] exists per inbound request. It is passed
//! explicitly to every component and holds:
//!
//! - read-only request metadata and route parameters,
//! - the emit-once registry for fragments shared by many component instances,
//! - the request's [`ActionRegistry`],
//! - producers parked by a `Defer` frame, waiting for the deferred pass,
//! - bookmark ids claimed so far and the current render [`Phase`].
//!
//! One request is driven by one task, so the inner lock is never contended;
//! it exists only so the handle can cross `Send` boundaries.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::actions::{
    action_url, ActionHandle, ActionRegistry, ClientAction, ServerActions, DEFAULT_ACTION_PARAM,
};
use crate::error::RenderError;
use crate::frame::FrameStream;
use crate::node::Node;
use crate::render::bookmark::Bookmark;

// ============================================================================
// Request metadata
// ============================================================================

/// What the route handler knows about the inbound request
#[derive(Clone, Debug, Default)]
pub struct RequestInfo {
    /// HTTP method
    pub method: String,
    /// Path without query
    pub path: String,
    /// Raw query string without `?`
    pub query: Option<String>,
    /// Request headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Route parameters
    pub params: BTreeMap<String, String>,
    /// Decoded `application/x-www-form-urlencoded` body fields
    pub form: Vec<(String, String)>,
}

impl RequestInfo {
    /// Request for `method` on `path`
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the raw query string
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    /// Add a request header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a route parameter
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Attach a urlencoded form body
    #[must_use]
    pub fn with_form_body(mut self, body: &str) -> Self {
        self.form = form_urlencoded::parse(body.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        self
    }

    /// First decoded value of a query parameter
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        form_urlencoded::parse(self.query.as_deref()?.as_bytes())
            .find_map(|(key, value)| (key == name).then(|| value.into_owned()))
    }

    /// First value of a form field
    #[must_use]
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Header value, compared case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Route parameter
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Path plus query
    #[must_use]
    pub fn url(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Which pass the renderer is in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Walking the initial tree
    Main,
    /// Resuming parked producers after the initial tree completed
    Deferred,
}

struct ParkedProducer {
    name: &'static str,
    stream: FrameStream,
}

struct ContextState {
    emitted_once: HashSet<String>,
    actions: ActionRegistry,
    parked: Vec<ParkedProducer>,
    bookmarks: HashSet<String>,
    phase: Phase,
    head_finalized: bool,
    side_headers: Vec<(String, String)>,
}

struct ContextInner {
    request_id: Uuid,
    request: RequestInfo,
    action_param: String,
    state: Mutex<ContextState>,
}

/// Shared handle to one request's render state
#[derive(Clone)]
pub struct RenderContext {
    inner: Arc<ContextInner>,
}

impl RenderContext {
    /// Context for a request, using the default action parameter
    #[must_use]
    pub fn new(request: RequestInfo) -> Self {
        Self::with_action_param(request, DEFAULT_ACTION_PARAM)
    }

    /// Context for a request with a custom action parameter name
    #[must_use]
    pub fn with_action_param(request: RequestInfo, action_param: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                request_id: Uuid::new_v4(),
                request,
                action_param: action_param.into(),
                state: Mutex::new(ContextState {
                    emitted_once: HashSet::new(),
                    actions: ActionRegistry::new(),
                    parked: Vec::new(),
                    bookmarks: HashSet::new(),
                    phase: Phase::Main,
                    head_finalized: false,
                    side_headers: Vec::new(),
                }),
            }),
        }
    }

    /// Unique id used to correlate logs
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.inner.request_id
    }

    /// Request metadata
    #[must_use]
    pub fn request(&self) -> &RequestInfo {
        &self.inner.request
    }

    /// Query parameter that selects a server action
    #[must_use]
    pub fn action_param(&self) -> &str {
        &self.inner.action_param
    }

    // ------------------------------------------------------------------------
    // Emit-once
    // ------------------------------------------------------------------------

    /// `node`, emitted only at the first rendered occurrence of `key`
    ///
    /// The key is claimed when the renderer reaches the node, not here, so a
    /// once-node that is built and then dropped leaves the key free.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn once(&self, key: impl Into<String>, node: impl Into<Node>) -> Node {
        Node::Once {
            key: key.into(),
            node: Box::new(node.into()),
        }
    }

    /// Claim an emit-once key; `true` only for the first claim
    pub(crate) fn claim_once(&self, key: &str) -> bool {
        self.inner.state.lock().emitted_once.insert(key.to_string())
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Make a route's server actions resolvable as URLs of the current request
    pub fn register_server_actions(&self, actions: &ServerActions) {
        let request = &self.inner.request;
        let mut state = self.inner.state.lock();
        for (key, handle) in actions.iter() {
            let url = action_url(
                &request.path,
                request.query.as_deref(),
                &self.inner.action_param,
                key,
            );
            state.actions.insert(handle, url);
        }
    }

    /// Register a client action and get the handle to put in an attribute
    pub fn client_action(&self, action: &ClientAction) -> ActionHandle {
        self.inner.state.lock().actions.register(action.encode())
    }

    /// Encoded form of an action handle
    #[must_use]
    pub fn resolve_action(&self, handle: ActionHandle) -> Option<String> {
        self.inner
            .state
            .lock()
            .actions
            .resolve(handle)
            .map(str::to_string)
    }

    // ------------------------------------------------------------------------
    // Bookmarks
    // ------------------------------------------------------------------------

    /// New bookmark with a generated id
    #[must_use]
    pub fn bookmark(&self) -> Bookmark {
        loop {
            let id = Bookmark::generate_id();
            if let Ok(bookmark) = self.bookmark_with_id(id) {
                return bookmark;
            }
        }
    }

    /// New bookmark with an explicit id, rejected if the id is taken
    pub fn bookmark_with_id(&self, id: impl Into<String>) -> Result<Bookmark, RenderError> {
        let id = id.into();
        if !self.inner.state.lock().bookmarks.insert(id.clone()) {
            return Err(RenderError::DuplicateBookmark(id));
        }
        Ok(Bookmark::new(self.clone(), id))
    }

    // ------------------------------------------------------------------------
    // Deferred producers
    // ------------------------------------------------------------------------

    /// Park a producer for the deferred pass
    pub fn park(&self, name: &'static str, stream: FrameStream) {
        tracing::debug!(request_id = %self.inner.request_id, component = name, "parking producer");
        self.inner
            .state
            .lock()
            .parked
            .push(ParkedProducer { name, stream });
    }

    /// Take every parked producer, in parking order
    pub fn take_parked(&self) -> Vec<(&'static str, FrameStream)> {
        std::mem::take(&mut self.inner.state.lock().parked)
            .into_iter()
            .map(|parked| (parked.name, parked.stream))
            .collect()
    }

    /// Number of parked producers
    #[must_use]
    pub fn parked_count(&self) -> usize {
        self.inner.state.lock().parked.len()
    }

    /// Drop parked producers without running them
    pub fn cancel_parked(&self) -> usize {
        let dropped = std::mem::take(&mut self.inner.state.lock().parked);
        dropped.len()
    }

    // ------------------------------------------------------------------------
    // Phase and response head
    // ------------------------------------------------------------------------

    /// Current render pass
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.inner.state.lock().phase = phase;
    }

    /// Whether status and headers are frozen
    #[must_use]
    pub fn is_head_finalized(&self) -> bool {
        self.inner.state.lock().head_finalized
    }

    /// Freeze the head and hand out the side-channel headers collected so far
    pub(crate) fn finalize_head(&self) -> Vec<(String, String)> {
        let mut state = self.inner.state.lock();
        state.head_finalized = true;
        std::mem::take(&mut state.side_headers)
    }

    /// Side-channel headers for a response that bypasses the normal head (redirects)
    pub(crate) fn take_side_headers(&self) -> Vec<(String, String)> {
        std::mem::take(&mut self.inner.state.lock().side_headers)
    }

    /// Add a header from outside the component protocol (sessions, cookies)
    pub fn append_response_header(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), RenderError> {
        let mut state = self.inner.state.lock();
        if state.head_finalized {
            return Err(RenderError::HeadersFinalized);
        }
        state.side_headers.push((name.into(), value.into()));
        Ok(())
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RenderContext")
            .field("request_id", &self.inner.request_id)
            .field("path", &self.inner.request.path)
            .field("phase", &state.phase)
            .field("parked", &state.parked.len())
            .field("actions", &state.actions.len())
            .finish()
    }
}
