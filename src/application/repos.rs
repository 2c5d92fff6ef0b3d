//! Repository traits describing persistence adapters.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::{LatestCursor, PageRequest, PopularityCursor};
use crate::domain::entities::{NewVideo, VideoRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[async_trait]
pub trait VideosRepo: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<VideoRecord>, RepoError>;
}

#[async_trait]
pub trait VideosWriteRepo: Send + Sync {
    async fn create_video(&self, video: NewVideo) -> Result<VideoRecord, RepoError>;

    /// Deletes the video row; its likes go with it.
    async fn delete_video(&self, id: i64) -> Result<(), RepoError>;
}

/// Ordered, limited range scans backing the feeds.
///
/// Every scan returns at most `page.limit` rows strictly after the cursor
/// under the scan's sort order.
#[async_trait]
pub trait FeedRepo: Send + Sync {
    /// `created_at DESC, id DESC`.
    async fn list_latest(
        &self,
        page: PageRequest<LatestCursor>,
    ) -> Result<Vec<VideoRecord>, RepoError>;

    /// `likes_count DESC, id DESC`.
    async fn list_by_popularity(
        &self,
        page: PageRequest<PopularityCursor>,
    ) -> Result<Vec<VideoRecord>, RepoError>;

    /// Chronological scan restricted to authors followed by `follower_id`.
    async fn list_by_following(
        &self,
        follower_id: i64,
        page: PageRequest<LatestCursor>,
    ) -> Result<Vec<VideoRecord>, RepoError>;
}

#[async_trait]
pub trait LikesRepo: Send + Sync {
    /// The subset of `video_ids` liked by `account_id`, resolved in one query.
    async fn liked_among(
        &self,
        account_id: i64,
        video_ids: &[i64],
    ) -> Result<HashSet<i64>, RepoError>;
}

#[async_trait]
pub trait LikesWriteRepo: Send + Sync {
    /// Inserts the like and bumps `likes_count` in one transaction.
    ///
    /// Fails with [`RepoError::Duplicate`] when the like already exists and
    /// [`RepoError::NotFound`] when the video does not.
    async fn like(&self, video_id: i64, account_id: i64) -> Result<(), RepoError>;

    /// Removes the like and decrements `likes_count` (floored at zero).
    ///
    /// Fails with [`RepoError::NotFound`] when no such like exists.
    async fn unlike(&self, video_id: i64, account_id: i64) -> Result<(), RepoError>;
}
