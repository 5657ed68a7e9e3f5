//! Sequence Combinator
//!
//! Merges any number of independent streams into one, emitting whichever
//! item becomes available first:
//!
//! 1. every stream has exactly one outstanding pull,
//! 2. the first pull to settle wins,
//! 3. a value is emitted and the same stream is pulled again,
//! 4. an exhausted stream leaves the pool for good,
//! 5. the merged stream ends when the pool is empty.
//!
//! Each stream's own order is preserved; across streams only arrival order
//! holds. There are no background threads: readiness is whatever settles
//! first on the task polling the combinator.
//!
//! ```text
//!   A: a1 ........ a2          ┐
//!   B: .... b1                 ├──► Combinator ──► a1 b1 a2
//!   C: (done)                  ┘
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{FuturesUnordered, Stream, StreamFuture};
use futures::StreamExt;

use crate::frame::FrameStream;

/// Completion-order merge of a dynamic pool of streams
pub struct Combinator<S> {
    pool: FuturesUnordered<StreamFuture<S>>,
}

impl<S> Default for Combinator<S>
where
    S: Stream + Unpin,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Combinator<S>
where
    S: Stream + Unpin,
{
    /// Empty pool
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: FuturesUnordered::new(),
        }
    }

    /// Add a stream; its first pull is issued on the next poll
    pub fn push(&mut self, stream: S) {
        self.pool.push(stream.into_future());
    }

    /// Streams still in the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Whether every stream has been exhausted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

impl<S> FromIterator<S> for Combinator<S>
where
    S: Stream + Unpin,
{
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut combinator = Self::new();
        for stream in iter {
            combinator.push(stream);
        }
        combinator
    }
}

impl<S> Stream for Combinator<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.pool.poll_next_unpin(cx) {
                Poll::Ready(Some((Some(item), rest))) => {
                    self.pool.push(rest.into_future());
                    return Poll::Ready(Some(item));
                }
                // Exhausted: dropped from the pool, never pulled again.
                Poll::Ready(Some((None, _))) => {}
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Merge component sequences by completion order
///
/// Useful inside a component that wants several independent children to
/// make progress at the same time; each frame stays whole. Frames pass
/// through uninterpreted, so a `Defer` from any member parks the whole
/// merged sequence: members that have not finished resume in the deferred
/// pass together.
pub fn combine<I>(streams: I) -> FrameStream
where
    I: IntoIterator<Item = FrameStream>,
{
    streams.into_iter().collect::<Combinator<_>>().boxed()
}
