//! Response Driver
//!
//! Owns the outbound byte stream of one request and moves it through a
//! fixed sequence of states:
//!
//! ```text
//!   Init ──► HeadersPending ──► Streaming ──► DeferredFlush ──► Closed
//!                 │
//!                 └──► Redirected   (redirect before the first renderable frame)
//! ```
//!
//! [`render_response`] runs the first two states: it pulls the root
//! component until the first renderable frame, applying status and header
//! frames along the way. What comes back is the finalized head plus a
//! [`ResponseBody`] that drives the remaining states as the transport pulls
//! it, one fragment per item, never batched.
//!
//! After the head is out nothing can change the status line. A failure from
//! that point on is logged, handed to the transport once as `Err` so it can
//! abort the connection, and the body ends.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, Stream};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, error, info_span, warn, Instrument, Span};

use crate::combinator::Combinator;
use crate::context::{Phase, RenderContext};
use crate::error::{RenderError, DEFAULT_REDIRECT_STATUS};
use crate::frame::{Frame, FrameStream};
use crate::render::{render_to_string, FragmentStream, TreeWalk};

/// Preamble emitted before `text/html` bodies
pub const DOCTYPE: &str = "<!DOCTYPE html>";

/// Content type used when no component sets one
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Where a response is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// Context built, root not pulled yet
    Init,
    /// Pulling the root, status and headers still mutable
    HeadersPending,
    /// Main pass output flowing
    Streaming,
    /// Parked producers being resumed
    DeferredFlush,
    /// Nothing more will be sent
    Closed,
    /// Replaced by a redirect before any byte was sent
    Redirected,
}

/// Knobs for one render
#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Emit [`DOCTYPE`] ahead of `text/html` bodies
    pub doctype: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { doctype: true }
    }
}

// ============================================================================
// Rendered response
// ============================================================================

/// Finalized head plus the streaming body
pub struct RenderedResponse {
    /// HTTP status
    pub status: u16,
    /// Headers in the order they were set
    pub headers: Vec<(String, String)>,
    /// Fragments still to be produced
    pub body: ResponseBody,
}

impl RenderedResponse {
    /// Redirect response with the default status
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: DEFAULT_REDIRECT_STATUS,
            headers: vec![("Location".to_string(), location.into())],
            body: ResponseBody::finished(DriverState::Redirected),
        }
    }

    /// Header value, compared case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether this response sends the client elsewhere
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.header("location").is_some()
    }

    /// Drain the body into one string
    pub async fn into_string(self) -> Result<String, RenderError> {
        self.body.try_collect::<String>().await
    }
}

impl fmt::Debug for RenderedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body.state())
            .finish()
    }
}

// ============================================================================
// Body
// ============================================================================

/// Stream of markup fragments that finishes the render as it is pulled
///
/// Dropping the body before it ends (client went away) drops every parked
/// producer, cancelling their bodies at whatever they were awaiting.
pub struct ResponseBody {
    ctx: Option<RenderContext>,
    state: DriverState,
    preamble: Option<String>,
    main: Option<TreeWalk>,
    deferred: Combinator<FragmentStream>,
    span: Span,
}

impl ResponseBody {
    fn finished(state: DriverState) -> Self {
        Self {
            ctx: None,
            state,
            preamble: None,
            main: None,
            deferred: Combinator::new(),
            span: Span::none(),
        }
    }

    /// Current driver state
    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state
    }

    fn start_deferred(&mut self) {
        self.state = DriverState::DeferredFlush;
        let Some(ctx) = &self.ctx else {
            return;
        };
        ctx.set_phase(Phase::Deferred);
        let parked = ctx.take_parked();
        debug!(parked = parked.len(), "main pass complete, resuming parked producers");
        for (name, stream) in parked {
            self.deferred
                .push(deferred_fragments(ctx.clone(), name, stream));
        }
    }

    fn abort(&mut self, err: RenderError) -> Poll<Option<Result<String, RenderError>>> {
        error!(error = %err, state = ?self.state, "render failed after streaming started, truncating response");
        self.state = DriverState::Closed;
        self.main = None;
        self.deferred = Combinator::new();
        if let Some(ctx) = &self.ctx {
            ctx.cancel_parked();
        }
        Poll::Ready(Some(Err(err)))
    }
}

impl Stream for ResponseBody {
    type Item = Result<String, RenderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let span = this.span.clone();
        let _enter = span.enter();

        loop {
            match this.state {
                DriverState::Streaming => {
                    if let Some(preamble) = this.preamble.take() {
                        return Poll::Ready(Some(Ok(preamble)));
                    }
                    let Some(main) = this.main.as_mut() else {
                        this.start_deferred();
                        continue;
                    };
                    match main.poll_next_unpin(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Some(Ok(fragment))) => return Poll::Ready(Some(Ok(fragment))),
                        Poll::Ready(Some(Err(err))) => return this.abort(err),
                        Poll::Ready(None) => {
                            this.main = None;
                            this.start_deferred();
                        }
                    }
                }
                DriverState::DeferredFlush => match this.deferred.poll_next_unpin(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Some(Ok(fragment))) => return Poll::Ready(Some(Ok(fragment))),
                    Poll::Ready(Some(Err(err))) => return this.abort(err),
                    Poll::Ready(None) => {
                        debug!("response complete");
                        this.state = DriverState::Closed;
                        return Poll::Ready(None);
                    }
                },
                DriverState::Init
                | DriverState::HeadersPending
                | DriverState::Closed
                | DriverState::Redirected => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        let Some(ctx) = &self.ctx else {
            return;
        };
        let cancelled = ctx.cancel_parked();
        if self.state != DriverState::Closed {
            let _enter = self.span.enter();
            debug!(state = ?self.state, cancelled, "response body dropped before completion");
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("state", &self.state)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

/// One complete fragment per renderable frame of a resumed producer
fn deferred_fragments(ctx: RenderContext, name: &'static str, stream: FrameStream) -> FragmentStream {
    debug!(component = name, "resuming parked producer");
    stream::unfold(Some(stream), move |frames| {
        let ctx = ctx.clone();
        async move {
            let mut frames = frames?;
            loop {
                match frames.next().await? {
                    Ok(Frame::Renderable(node)) => {
                        let fragment = render_to_string(ctx.clone(), node).await;
                        let rest = fragment.is_ok().then_some(frames);
                        return Some((fragment, rest));
                    }
                    Ok(Frame::Defer) => {}
                    Ok(Frame::SetStatus(_) | Frame::SetHeaders(_)) => {
                        warn!(component = name, "status or headers set during the deferred pass");
                        return Some((Err(RenderError::HeadersFinalized), None));
                    }
                    Err(err) => return Some((Err(err), None)),
                }
            }
        }
    })
    .boxed()
}

// ============================================================================
// Driver
// ============================================================================

/// Render `root` with default options
pub async fn render_response(
    ctx: RenderContext,
    root: FrameStream,
) -> Result<RenderedResponse, RenderError> {
    render_response_with(ctx, root, &RenderOptions::default()).await
}

/// Pull `root` until the head is final and hand back head plus body
///
/// Returns `Err` only for failures before any byte was produced; the caller
/// turns those into an error status. A redirect at that point is a regular
/// response.
pub async fn render_response_with(
    ctx: RenderContext,
    root: FrameStream,
    options: &RenderOptions,
) -> Result<RenderedResponse, RenderError> {
    let span = info_span!(
        "render",
        request_id = %ctx.request_id(),
        path = %ctx.request().path
    );
    let doctype = options.doctype;
    drive_head(ctx, root, doctype, span.clone())
        .instrument(span)
        .await
}

async fn drive_head(
    ctx: RenderContext,
    root: FrameStream,
    doctype: bool,
    span: Span,
) -> Result<RenderedResponse, RenderError> {
    let mut state = DriverState::Init;
    debug!(?state, method = %ctx.request().method, "rendering");

    let mut status = 200;
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut root = Some(root);
    state = DriverState::HeadersPending;
    debug!(?state, "pulling root component");

    let first = loop {
        let Some(stream) = root.as_mut() else {
            break None;
        };
        match stream.next().await {
            Some(Ok(Frame::SetStatus(code))) => {
                if !(100..=999).contains(&code) {
                    ctx.cancel_parked();
                    return Err(RenderError::Protocol(format!("invalid status code {code}")));
                }
                status = code;
            }
            Some(Ok(Frame::SetHeaders(set))) => {
                for (name, value) in set {
                    set_header(&mut headers, name, value);
                }
            }
            Some(Ok(Frame::Renderable(node))) => break Some(node),
            Some(Ok(Frame::Defer)) => {
                if let Some(stream) = root.take() {
                    ctx.park("root", stream);
                }
            }
            Some(Err(RenderError::Redirect { location, status })) => {
                state = DriverState::Redirected;
                debug!(?state, %location, status, "redirecting");
                ctx.cancel_parked();
                let mut headers = vec![("Location".to_string(), location)];
                headers.extend(ctx.take_side_headers());
                return Ok(RenderedResponse {
                    status,
                    headers,
                    body: ResponseBody::finished(state),
                });
            }
            Some(Err(err)) => {
                warn!(error = %err, "render failed before streaming started");
                ctx.cancel_parked();
                return Err(err);
            }
            None => break None,
        }
    };

    headers.extend(ctx.finalize_head());
    if !headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
    {
        headers.push(("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string()));
    }
    let is_html = headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("content-type") && value.trim() == DEFAULT_CONTENT_TYPE
    });

    let main = match (first, root) {
        (Some(node), Some(stream)) => Some(TreeWalk::resume(ctx.clone(), "root", stream, node)),
        (Some(node), None) => Some(TreeWalk::new(ctx.clone(), node)),
        (None, _) => None,
    };

    if main.is_none() && ctx.parked_count() == 0 {
        debug!(status, "root finished without a body");
        return Ok(RenderedResponse {
            status,
            headers,
            body: ResponseBody::finished(DriverState::Closed),
        });
    }

    state = DriverState::Streaming;
    debug!(?state, status, "headers finalized");
    Ok(RenderedResponse {
        status,
        headers,
        body: ResponseBody {
            ctx: Some(ctx),
            state,
            preamble: (doctype && is_html).then(|| DOCTYPE.to_string()),
            main,
            deferred: Combinator::new(),
            span,
        },
    })
}

/// Replace any earlier header with the same name
fn set_header(headers: &mut Vec<(String, String)>, name: String, value: String) {
    headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
    headers.push((name, value));
}
