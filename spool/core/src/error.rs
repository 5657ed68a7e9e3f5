//! Render Error Types
//!
//! Everything that can stop a render. Redirects live here too: a component
//! aborts its sequence with `Err(RenderError::Redirect { .. })` and the
//! Response Driver decides whether that can still become a real response.

use thiserror::Error;

use crate::actions::ActionHandle;

/// Default status used by [`RenderError::redirect`]
pub const DEFAULT_REDIRECT_STATUS: u16 = 302;

/// Errors raised while executing components or rendering markup
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    /// A component asked for a different response instead of its own output
    #[error("redirect to {location} ({status})")]
    Redirect {
        /// Target of the `Location` header
        location: String,
        /// 3xx status code
        status: u16,
    },

    /// An attribute referenced an action that was never registered for this request
    #[error("action {0} is not registered for this request")]
    UnresolvedAction(ActionHandle),

    /// A component produced something the renderer cannot interpret
    #[error("component protocol violation: {0}")]
    Protocol(String),

    /// Status or headers were set after the first renderable frame
    #[error("response headers are already finalized")]
    HeadersFinalized,

    /// Two bookmarks in one request share an id
    #[error("bookmark id {0:?} is already registered")]
    DuplicateBookmark(String),

    /// A bookmark received a patch write before the deferred pass started
    #[error("bookmark {0:?} can only be patched during the deferred pass")]
    BookmarkPatchInMainPass(String),

    /// A bookmark received its first write after the main pass finished
    #[error("bookmark {0:?} received its first write during the deferred pass")]
    BookmarkFirstWriteDeferred(String),

    /// Server action keys must be URL-safe
    #[error("invalid action key {0:?} (expected [A-Za-z0-9_-]+)")]
    InvalidActionKey(String),

    /// Server action keys must be unique per table
    #[error("action key {0:?} is already registered")]
    DuplicateAction(String),

    /// The consumer of a producer went away while it was still emitting
    #[error("frame consumer dropped")]
    ProducerClosed,

    /// Failure reported by a component body
    #[error("component failed: {0}")]
    Component(String),
}

impl RenderError {
    /// Redirect with the default 302 status
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            status: DEFAULT_REDIRECT_STATUS,
        }
    }

    /// Wrap an arbitrary error coming out of component code
    pub fn component(err: impl std::fmt::Display) -> Self {
        Self::Component(err.to_string())
    }

    /// Whether this is a redirect signal rather than a failure
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_defaults_to_302() {
        let err = RenderError::redirect("/login");
        assert!(err.is_redirect());
        assert_eq!(
            err,
            RenderError::Redirect {
                location: "/login".into(),
                status: 302
            }
        );
        assert_eq!(err.to_string(), "redirect to /login (302)");
    }

    #[test]
    fn test_component_wraps_display() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "db down");
        let err = RenderError::component(io);
        assert!(!err.is_redirect());
        assert_eq!(err.to_string(), "component failed: db down");
    }
}
