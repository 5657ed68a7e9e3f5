//! HTTP Edge
//!
//! Binds the rendering runtime to axum. Every path goes through one fallback
//! handler:
//!
//! ```text
//!   request ──► trailing slash? ──► 302 without it
//!                   │
//!                   ▼
//!              page for path? ── no ──► static file? ── no ──► 404
//!                   │ yes                    │ yes
//!                   ▼                        ▼
//!          action param present?         ServeDir
//!          ├─ yes: ServerActions entry (404 when unknown)
//!          └─ no:  page component
//!                   │
//!                   ▼
//!          render_response_with ──► status + headers + streamed body
//! ```
//!
//! A render error before the first byte becomes a 500. Once the body is
//! streaming, a late error aborts the connection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::{self, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use spool_core::{
    render_response_with, ComponentFn, FrameStream, Props, RenderContext, RenderOptions,
    RenderedResponse, RequestInfo, ServerActions, SpoolConfig,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Largest request body read for a page or action
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// A routable page: its root component plus the server actions it exposes
#[derive(Clone)]
pub struct Page {
    component: ComponentFn,
    actions: ServerActions,
}

impl Page {
    /// Page rendered by `component`
    pub fn new<F>(component: F) -> Self
    where
        F: Fn(Props, RenderContext) -> FrameStream + Send + Sync + 'static,
    {
        Self {
            component: Arc::new(component),
            actions: ServerActions::new(),
        }
    }

    /// Attach the page's server actions
    #[must_use]
    pub fn with_actions(mut self, actions: ServerActions) -> Self {
        self.actions = actions;
        self
    }

    /// Server actions exposed by this page
    pub fn actions(&self) -> &ServerActions {
        &self.actions
    }

    /// Root frame stream of the page component
    pub fn render(&self, ctx: RenderContext) -> FrameStream {
        (self.component)(Props::new(), ctx)
    }
}

/// Shared state of the router
pub struct AppState {
    pages: HashMap<String, Page>,
    static_dir: PathBuf,
    action_param: String,
    render_options: RenderOptions,
}

impl AppState {
    /// State serving `pages` under `config`
    pub fn new(config: SpoolConfig, pages: HashMap<String, Page>) -> Self {
        Self {
            pages,
            render_options: config.render_options(),
            static_dir: config.static_dir,
            action_param: config.action_param,
        }
    }
}

/// Router with the page fallback installed
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(handle)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn handle(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let uri = request.uri().clone();
    let path = uri.path();

    if path != "/" && path.ends_with('/') {
        let trimmed = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        let location = match uri.query() {
            Some(query) => format!("{trimmed}?{query}"),
            None => trimmed.to_string(),
        };
        return redirect(&location);
    }

    let Some(page) = state.pages.get(path) else {
        return serve_static(&state.static_dir, request).await;
    };

    let (parts, body) = request.into_parts();
    let body = match body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!(path, error = %e, "unreadable request body");
            return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
        }
    };
    let request = request_info(&parts.method, &uri, &parts.headers, &body);
    let ctx = RenderContext::with_action_param(request, state.action_param.as_str());
    ctx.register_server_actions(page.actions());

    let root = match ctx.request().query_param(&state.action_param) {
        Some(key) => match page.actions().get(&key) {
            Some(action) => {
                debug!(path, action = %key, "dispatching server action");
                action(Props::new(), ctx.clone())
            }
            None => {
                warn!(path, action = %key, "unknown server action");
                return not_found();
            }
        },
        None => page.render(ctx.clone()),
    };

    match render_response_with(ctx, root, &state.render_options).await {
        Ok(rendered) => into_http(rendered),
        Err(e) => {
            error!(path, error = %e, "render failed before streaming");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

fn request_info(method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> RequestInfo {
    let mut request = RequestInfo::new(method.as_str(), uri.path());
    if let Some(query) = uri.query() {
        request = request.with_query(query);
    }
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(FORM_CONTENT_TYPE));
    if is_form {
        request = request.with_form_body(&String::from_utf8_lossy(body));
    }
    request
}

fn into_http(rendered: RenderedResponse) -> Response {
    let status = StatusCode::from_u16(rendered.status).unwrap_or_else(|_| {
        warn!(status = rendered.status, "status not representable, sending 500");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut response = Response::new(Body::from_stream(rendered.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in rendered.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    response
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => not_found(),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

// ============================================================================
// Static files
// ============================================================================

/// Serve a file under `root`; anything ServeDir cannot find is our 404
///
/// ServeDir redirects a directory to its slash form, which the trailing-slash
/// rule would bounce straight back, so directories are 404 as well.
async fn serve_static(root: &Path, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let response = match ServeDir::new(root).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let status = response.status();
    if status == StatusCode::NOT_FOUND || status.is_redirection() {
        return not_found();
    }
    debug!(path, %status, "serving static file");
    response.into_response()
}
