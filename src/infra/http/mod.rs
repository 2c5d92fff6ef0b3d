pub mod error;
mod handlers;
mod middleware;
pub mod viewer;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::application::feed::FeedService;
use crate::application::videos::VideoService;
use crate::infra::db::PostgresRepositories;

pub use error::ApiError;
pub use middleware::{REQUEST_ID_HEADER, RequestContext, ViewerTag};
pub use viewer::VIEWER_HEADER;

/// Liveness check for the primary store.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> Result<(), SqlxError>;
}

#[async_trait]
impl HealthCheck for PostgresRepositories {
    async fn check(&self) -> Result<(), SqlxError> {
        self.health_check().await
    }
}

#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedService>,
    pub videos: Arc<VideoService>,
    pub health: Arc<dyn HealthCheck>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/feed/latest", get(handlers::latest_feed))
        .route("/feed/popular", get(handlers::popular_feed))
        .route("/feed/following", get(handlers::following_feed))
        .route("/videos", post(handlers::publish_video))
        .route(
            "/videos/{id}",
            get(handlers::video_detail).delete(handlers::delete_video),
        )
        .route(
            "/videos/{id}/like",
            post(handlers::like_video).delete(handlers::unlike_video),
        )
        .route("/_health/db", get(db_health))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn db_health(State(state): State<AppState>) -> Response {
    db_health_response(state.health.check().await)
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
