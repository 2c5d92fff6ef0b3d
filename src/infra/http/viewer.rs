//! Viewer identity forwarded by the upstream authenticator.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::domain::types::Viewer;

use super::error::ApiError;

pub const VIEWER_HEADER: &str = "x-viewer-id";

/// Soft identity: a missing header or `0` reads as anonymous.
#[derive(Debug, Clone, Copy)]
pub struct MaybeViewer(pub Viewer);

/// Hard identity for routes that act on behalf of an account.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedViewer(pub i64);

/// `None` when the header is present but not an integer.
pub(crate) fn viewer_from_headers(headers: &HeaderMap) -> Option<Viewer> {
    let Some(value) = headers.get(VIEWER_HEADER) else {
        return Some(Viewer::Anonymous);
    };
    let raw = value.to_str().ok()?.trim().parse::<i64>().ok()?;
    Some(Viewer::from_raw(Some(raw)))
}

fn viewer_from_parts(parts: &Parts) -> Result<Viewer, ApiError> {
    viewer_from_headers(&parts.headers).ok_or_else(|| {
        ApiError::bad_request(
            "Invalid viewer header",
            Some(format!("{VIEWER_HEADER} must be an integer account id")),
        )
    })
}

impl<S> FromRequestParts<S> for MaybeViewer
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        viewer_from_parts(parts).map(Self)
    }
}

impl<S> FromRequestParts<S> for AuthenticatedViewer
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        viewer_from_parts(parts)?
            .account_id()
            .map(Self)
            .ok_or_else(ApiError::unauthorized)
    }
}
