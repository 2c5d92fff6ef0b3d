//! Request tagging and failure logging for the feed API.

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::domain::types::Viewer;

use super::viewer::viewer_from_headers;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_FORWARDED_ID_LEN: usize = 64;

/// Who is asking, as far as the forwarded header says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerTag {
    Anonymous,
    Account(i64),
    Malformed,
}

impl ViewerTag {
    fn from_headers(headers: &HeaderMap) -> Self {
        match viewer_from_headers(headers) {
            Some(Viewer::Account(id)) => Self::Account(id),
            Some(Viewer::Anonymous) => Self::Anonymous,
            None => Self::Malformed,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Account(_) => "account",
            Self::Malformed => "malformed",
        }
    }

    pub fn account_id(&self) -> Option<i64> {
        match self {
            Self::Account(id) => Some(*id),
            _ => None,
        }
    }
}

/// Which part of the API a path belongs to.
fn surface(path: &str) -> &'static str {
    if path.starts_with("/feed/") {
        "feed"
    } else if path.starts_with("/videos") {
        "video"
    } else if path.starts_with("/_health") {
        "health"
    } else {
        "other"
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub viewer: ViewerTag,
}

/// Reuses an upstream `x-request-id` when it is short printable ASCII,
/// otherwise mints one. The id is echoed on the response.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_FORWARDED_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let ctx = RequestContext {
        request_id,
        viewer: ViewerTag::from_headers(request.headers()),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let surface = surface(uri.path());
    let start = Instant::now();
    let ctx = request.extensions().get::<RequestContext>().cloned();
    let (request_id, viewer) = match ctx {
        Some(ctx) => (ctx.request_id, ctx.viewer),
        None => (String::new(), ViewerTag::from_headers(request.headers())),
    };

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if !(status.is_client_error() || status.is_server_error()) {
        debug!(
            target: "vidfeed::http::response",
            status = status.as_u16(),
            method = %method,
            surface,
            elapsed_ms,
            viewer_kind = viewer.kind(),
            request_id = %request_id,
            "request served"
        );
        return response;
    }

    let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unrouted", Vec::new()),
    };
    let detail = messages.first().map(String::as_str).unwrap_or("no diagnostic");

    if status.is_server_error() {
        error!(
            target: "vidfeed::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            surface,
            elapsed_ms,
            source,
            detail,
            chain = ?messages,
            viewer_kind = viewer.kind(),
            viewer_id = ?viewer.account_id(),
            request_id = %request_id,
            "request failed"
        );
    } else {
        warn!(
            target: "vidfeed::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            surface,
            source,
            detail,
            viewer_kind = viewer.kind(),
            viewer_id = ?viewer.account_id(),
            request_id = %request_id,
            "rejected request"
        );
    }

    response
}
