//! Demo pages
//!
//! - `/`: dashboard with two independent slow panels
//! - `/login`: sign-in form backed by a server action, plus a bookmark that
//!   keeps updating after the page has streamed
//! - `/counter`: a client action next to a server action that redirects back
//!
//! [`DemoStore`] keeps users, sessions and counters in memory.

mod counter;
mod home;
mod login;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use spool_core::{el, Node, RenderContext, RenderError, RequestInfo};

use crate::server::Page;

/// Cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

const DEFAULT_DELAY: Duration = Duration::from_millis(600);

/// In-memory users, sessions and counters
pub struct DemoStore {
    users: DashMap<String, String>,
    sessions: DashMap<String, String>,
    counters: DashMap<String, i64>,
    delay: Duration,
}

impl DemoStore {
    /// Store with the `demo`/`demo` account and the default artificial latency
    pub fn new() -> Self {
        Self::with_delay(DEFAULT_DELAY)
    }

    /// Store whose slow regions wait `delay`
    pub fn with_delay(delay: Duration) -> Self {
        let users = DashMap::new();
        users.insert("demo".to_string(), "demo".to_string());
        Self {
            users,
            sessions: DashMap::new(),
            counters: DashMap::new(),
            delay,
        }
    }

    /// Artificial latency of slow regions
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether `password` belongs to `username`
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|expected| *expected == password)
    }

    /// Bind `session` to `username`
    pub fn sign_in(&self, session: &str, username: &str) {
        self.sessions
            .insert(session.to_string(), username.to_string());
    }

    /// Forget the user bound to `session`
    pub fn sign_out(&self, session: &str) {
        self.sessions.remove(session);
    }

    /// User bound to `session`
    pub fn user(&self, session: &str) -> Option<String> {
        self.sessions.get(session).map(|user| user.clone())
    }

    /// Saved counter value of `session`
    pub fn count(&self, session: &str) -> i64 {
        self.counters.get(session).map_or(0, |count| *count)
    }

    /// Increment the counter of `session` and return the new value
    pub fn increment(&self, session: &str) -> i64 {
        let mut count = self.counters.entry(session.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

impl Default for DemoStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Page table served by the router
pub fn pages(store: &Arc<DemoStore>) -> Result<HashMap<String, Page>, RenderError> {
    let mut pages = HashMap::new();
    pages.insert("/".to_string(), home::page(store)?);
    pages.insert("/login".to_string(), login::page(store)?);
    pages.insert("/counter".to_string(), counter::page(store)?);
    Ok(pages)
}

/// Session id of the request
///
/// A request without a session cookie gets a fresh id, announced through a
/// `Set-Cookie` side-channel header.
pub fn session(ctx: &RenderContext) -> Result<String, RenderError> {
    if let Some(id) = cookie(ctx.request(), SESSION_COOKIE) {
        return Ok(id);
    }
    let id = ctx.request_id().simple().to_string();
    ctx.append_response_header(
        "Set-Cookie",
        format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Strict"),
    )?;
    Ok(id)
}

fn cookie(request: &RequestInfo, name: &str) -> Option<String> {
    request.header("cookie")?.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// Document chrome shared by the demo pages
pub fn layout(title: &str, body: impl Into<Node>) -> Node {
    el("html")
        .child(el("head").child(el("title").child(format!("{title} · spool"))))
        .child(el("body").child(body))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cookie_lookup() {
        let request =
            RequestInfo::new("GET", "/").with_header("Cookie", "theme=dark; session=abc123");
        assert_eq!(cookie(&request, "session"), Some("abc123".to_string()));
        assert_eq!(cookie(&request, "missing"), None);
    }

    #[test]
    fn test_store_sessions_and_counters() {
        let store = DemoStore::with_delay(Duration::ZERO);
        assert!(store.verify("demo", "demo"));
        assert!(!store.verify("demo", "nope"));
        assert!(!store.verify("ghost", "demo"));

        store.sign_in("s1", "demo");
        assert_eq!(store.user("s1"), Some("demo".to_string()));
        store.sign_out("s1");
        assert_eq!(store.user("s1"), None);

        assert_eq!(store.count("s1"), 0);
        assert_eq!(store.increment("s1"), 1);
        assert_eq!(store.increment("s1"), 2);
        assert_eq!(store.count("s2"), 0);
    }

    #[test]
    fn test_session_reuses_cookie_or_announces_new_one() {
        let known = RenderContext::new(
            RequestInfo::new("GET", "/").with_header("Cookie", "session=abc"),
        );
        assert_eq!(session(&known).unwrap(), "abc");

        let fresh = RenderContext::new(RequestInfo::new("GET", "/"));
        let id = session(&fresh).unwrap();
        assert_eq!(id.len(), 32);
    }
}
