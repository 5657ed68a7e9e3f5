//! Component Execution Protocol
//!
//! A component turns its props into a [`FrameStream`]: an ordered, possibly
//! slow sequence of [`Frame`]s. Most components are written with
//! [`producer`], which lets an async body emit frames one at a time:
//!
//! ```ignore
//! use spool_core::frame::{producer, FrameStream};
//! use spool_core::node::{el, Props};
//! use spool_core::RenderContext;
//!
//! fn not_found(_props: Props, _ctx: RenderContext) -> FrameStream {
//!     producer(|emit| async move {
//!         emit.status(404).await?;
//!         emit.render(el("p").child("missing")).await?;
//!         Ok(())
//!     })
//! }
//! ```
//!
//! `emit.*().await` returns only after the consumer pulled the frame, so a
//! body never runs ahead of its consumer. A parked producer (after
//! [`Emitter::defer`]) does no work until the deferred pass resumes it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{Fuse, FusedFuture};
use futures::stream::{self, BoxStream, Stream};
use futures::{FutureExt, StreamExt};
use pin_project_lite::pin_project;
use tokio::sync::mpsc;

use crate::error::RenderError;
use crate::node::Node;

/// Output of a component
pub type FrameStream = BoxStream<'static, Result<Frame, RenderError>>;

/// One unit yielded by a component
#[derive(Clone, Debug)]
pub enum Frame {
    /// Content to render
    Renderable(Node),
    /// Response status; only valid before the first renderable frame
    SetStatus(u16),
    /// Response headers; only valid before the first renderable frame
    SetHeaders(Vec<(String, String)>),
    /// Stop pulling here, resume in the deferred pass
    Defer,
}

impl Frame {
    /// Whether this frame configures the response head
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(self, Self::SetStatus(_) | Self::SetHeaders(_))
    }

    /// Renderable frame from anything convertible to a node
    pub fn render(node: impl Into<Node>) -> Self {
        Self::Renderable(node.into())
    }
}

/// A fixed sequence of frames
pub fn frames<I>(frames: I) -> FrameStream
where
    I: IntoIterator<Item = Frame>,
    I::IntoIter: Send + 'static,
{
    stream::iter(frames.into_iter().map(Ok)).boxed()
}

/// A sequence with a single renderable frame
pub fn render_once(node: impl Into<Node>) -> FrameStream {
    frames([Frame::render(node)])
}

// ============================================================================
// Generator-style producers
// ============================================================================

/// Handle through which a producer body emits frames
pub struct Emitter {
    tx: mpsc::Sender<Frame>,
}

impl Emitter {
    /// Emit a frame and wait until the consumer has taken it
    pub async fn emit(&self, frame: Frame) -> Result<(), RenderError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| RenderError::ProducerClosed)?;
        // The slot frees up only once the frame was received.
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| RenderError::ProducerClosed)?;
        drop(permit);
        Ok(())
    }

    /// Emit a renderable frame
    pub async fn render(&self, node: impl Into<Node>) -> Result<(), RenderError> {
        self.emit(Frame::Renderable(node.into())).await
    }

    /// Emit a status frame
    pub async fn status(&self, code: u16) -> Result<(), RenderError> {
        self.emit(Frame::SetStatus(code)).await
    }

    /// Emit a single header
    pub async fn header(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), RenderError> {
        self.emit(Frame::SetHeaders(vec![(name.into(), value.into())]))
            .await
    }

    /// Emit a header set
    pub async fn headers<I, K, V>(&self, headers: I) -> Result<(), RenderError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.emit(Frame::SetHeaders(headers)).await
    }

    /// Park this producer until the deferred pass
    pub async fn defer(&self) -> Result<(), RenderError> {
        self.emit(Frame::Defer).await
    }
}

pin_project! {
    /// Stream adapter that drives a producer body on demand
    pub struct Producer<F> {
        #[pin]
        body: Fuse<F>,
        rx: mpsc::Receiver<Frame>,
        failure: Option<RenderError>,
        finished: bool,
    }
}

impl<F> Stream for Producer<F>
where
    F: Future<Output = Result<(), RenderError>>,
{
    type Item = Result<Frame, RenderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }

        if let Poll::Ready(Some(frame)) = this.rx.poll_recv(cx) {
            return Poll::Ready(Some(Ok(frame)));
        }

        if !this.body.is_terminated() {
            if let Poll::Ready(Err(err)) = this.body.as_mut().poll(cx) {
                *this.failure = Some(err);
            }
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            // All senders dropped: the body returned and nothing is buffered.
            Poll::Ready(None) => {
                *this.finished = true;
                Poll::Ready(this.failure.take().map(Err))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Build a [`FrameStream`] from an async body
///
/// The body owns the [`Emitter`]; it must not move it into a spawned task,
/// since the stream ends only when the emitter is dropped. An `Err` returned
/// by the body becomes the stream's last item.
pub fn producer<B, F>(body: B) -> FrameStream
where
    B: FnOnce(Emitter) -> F,
    F: Future<Output = Result<(), RenderError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    Producer {
        body: body(Emitter { tx }).fuse(),
        rx,
        failure: None,
        finished: false,
    }
    .boxed()
}
