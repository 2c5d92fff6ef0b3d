use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Deserializer};

use crate::application::videos::PublishVideoCommand;

use super::AppState;
use super::error::ApiError;
use super::viewer::{AuthenticatedViewer, MaybeViewer};

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    #[serde(default, deserialize_with = "deserialize_limit")]
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

/// Anything that is not a positive integer in range reads as unset, so the
/// feed falls back to its default page size instead of rejecting the request.
fn deserialize_limit<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|limit| u32::try_from(limit).ok())
        .filter(|limit| *limit > 0))
}

#[derive(Debug, Deserialize)]
pub struct PublishVideoRequest {
    pub title: String,
    pub description: Option<String>,
    pub play_url: String,
    pub cover_url: String,
}

pub async fn latest_feed(
    State(state): State<AppState>,
    MaybeViewer(viewer): MaybeViewer,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .feed
        .latest_from_token(query.limit, query.cursor.as_deref(), viewer)
        .await?;
    Ok(Json(page))
}

pub async fn popular_feed(
    State(state): State<AppState>,
    MaybeViewer(viewer): MaybeViewer,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .feed
        .popular_from_token(query.limit, query.cursor.as_deref(), viewer)
        .await?;
    Ok(Json(page))
}

pub async fn following_feed(
    State(state): State<AppState>,
    MaybeViewer(viewer): MaybeViewer,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .feed
        .following_from_token(query.limit, query.cursor.as_deref(), viewer)
        .await?;
    Ok(Json(page))
}

pub async fn video_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let video = state.videos.detail(id).await?;
    Ok(Json(video))
}

pub async fn publish_video(
    State(state): State<AppState>,
    AuthenticatedViewer(author_id): AuthenticatedViewer,
    Json(payload): Json<PublishVideoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = PublishVideoCommand {
        title: payload.title,
        description: payload.description,
        play_url: payload.play_url,
        cover_url: payload.cover_url,
    };
    let video = state.videos.publish(author_id, command).await?;
    Ok((StatusCode::CREATED, Json(video)))
}

pub async fn delete_video(
    State(state): State<AppState>,
    AuthenticatedViewer(requester_id): AuthenticatedViewer,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.videos.delete(id, requester_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn like_video(
    State(state): State<AppState>,
    AuthenticatedViewer(account_id): AuthenticatedViewer,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.videos.like(id, account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unlike_video(
    State(state): State<AppState>,
    AuthenticatedViewer(account_id): AuthenticatedViewer,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.videos.unlike(id, account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
