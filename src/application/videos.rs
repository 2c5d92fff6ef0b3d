//! Single-video reads and the mutations that invalidate them.

use std::sync::Arc;

use thiserror::Error;

use crate::application::repos::{LikesWriteRepo, RepoError, VideosRepo, VideosWriteRepo};
use crate::cache::{CacheGateway, CacheInvalidator, CacheKey, ResolvePolicy};
use crate::domain::entities::VideoRecord;
use crate::domain::error::DomainError;
use crate::domain::videos::validate_new_video;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video not found")]
    NotFound,
    #[error("video belongs to another account")]
    Forbidden,
    #[error("video already liked")]
    AlreadyLiked,
    #[error("video not liked")]
    NotLiked,
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for VideoError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NotFound,
            other => Self::Repo(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishVideoCommand {
    pub title: String,
    pub description: Option<String>,
    pub play_url: String,
    pub cover_url: String,
}

#[derive(Clone)]
pub struct VideoService {
    reader: Arc<dyn VideosRepo>,
    writer: Arc<dyn VideosWriteRepo>,
    likes: Arc<dyn LikesWriteRepo>,
    gateway: CacheGateway,
    invalidator: CacheInvalidator,
    policy: ResolvePolicy,
}

impl VideoService {
    pub fn new(
        reader: Arc<dyn VideosRepo>,
        writer: Arc<dyn VideosWriteRepo>,
        likes: Arc<dyn LikesWriteRepo>,
        gateway: CacheGateway,
        policy: ResolvePolicy,
    ) -> Self {
        let invalidator = CacheInvalidator::new(&gateway);
        Self {
            reader,
            writer,
            likes,
            gateway,
            invalidator,
            policy,
        }
    }

    /// Cached point read. Absent videos are not cached.
    pub async fn detail(&self, id: i64) -> Result<VideoRecord, VideoError> {
        let key = CacheKey::video_detail(id);
        self.gateway
            .resolve(&key, self.policy, || async move {
                match self.reader.find_by_id(id).await {
                    Ok(Some(video)) => Ok(video),
                    Ok(None) => Err(VideoError::NotFound),
                    Err(err) => Err(VideoError::from(err)),
                }
            })
            .await
    }

    pub async fn publish(
        &self,
        author_id: i64,
        command: PublishVideoCommand,
    ) -> Result<VideoRecord, VideoError> {
        let video = validate_new_video(
            author_id,
            &command.title,
            command.description.as_deref(),
            &command.play_url,
            &command.cover_url,
        )?;
        let record = self.writer.create_video(video).await?;
        tracing::info!(
            target: "vidfeed::application::videos",
            video_id = record.id,
            author_id,
            "video published"
        );
        Ok(record)
    }

    /// Only the author may delete a video.
    pub async fn delete(&self, id: i64, requester_id: i64) -> Result<(), VideoError> {
        let video = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(VideoError::NotFound)?;
        if video.author_id != requester_id {
            return Err(VideoError::Forbidden);
        }
        self.writer.delete_video(id).await?;
        self.invalidator.video_changed(id).await;
        Ok(())
    }

    pub async fn like(&self, id: i64, account_id: i64) -> Result<(), VideoError> {
        self.likes
            .like(id, account_id)
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => VideoError::AlreadyLiked,
                other => other.into(),
            })?;
        self.invalidator.video_changed(id).await;
        Ok(())
    }

    pub async fn unlike(&self, id: i64, account_id: i64) -> Result<(), VideoError> {
        self.likes
            .unlike(id, account_id)
            .await
            .map_err(|err| match err {
                RepoError::NotFound => VideoError::NotLiked,
                other => other.into(),
            })?;
        self.invalidator.video_changed(id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::application::test_support::{StubStore, video};
    use crate::cache::{CacheConfig, MemoryCache};

    fn service(store: Arc<StubStore>) -> (VideoService, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let config = CacheConfig::default();
        let gateway = CacheGateway::new(cache.clone(), &config);
        let service = VideoService::new(
            store.clone(),
            store.clone(),
            store,
            gateway,
            config.detail_policy(),
        );
        (service, cache)
    }

    fn store() -> Arc<StubStore> {
        Arc::new(StubStore::with_videos(vec![
            video(1, 10, datetime!(2024-01-01 00:00:00 UTC), 2),
            video(2, 20, datetime!(2024-01-02 00:00:00 UTC), 0),
        ]))
    }

    #[tokio::test]
    async fn detail_is_served_from_cache_after_first_read() {
        let store = store();
        let (service, _) = service(store.clone());

        let first = service.detail(1).await.expect("detail");
        let second = service.detail(1).await.expect("detail");

        assert_eq!(first, second);
        assert_eq!(store.detail_calls(), 1);
    }

    #[tokio::test]
    async fn missing_video_is_not_found_and_not_cached() {
        let store = store();
        let (service, cache) = service(store.clone());

        assert!(matches!(service.detail(99).await, Err(VideoError::NotFound)));
        assert!(matches!(service.detail(99).await, Err(VideoError::NotFound)));
        assert_eq!(store.detail_calls(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn like_evicts_so_next_detail_is_fresh() {
        let store = store();
        let (service, cache) = service(store.clone());

        assert_eq!(service.detail(1).await.expect("detail").likes_count, 2);
        service.like(1, 30).await.expect("like");
        assert!(!cache.contains_key("video:detail:id=1"));
        assert_eq!(service.detail(1).await.expect("detail").likes_count, 3);

        service.unlike(1, 30).await.expect("unlike");
        assert_eq!(service.detail(1).await.expect("detail").likes_count, 2);
    }

    #[tokio::test]
    async fn eviction_replaces_stale_fields_wholesale() {
        let store = store();
        let (service, _) = service(store.clone());

        assert_eq!(service.detail(2).await.expect("detail").title, "video 2");
        store.rename(2, "renamed");
        assert_eq!(service.detail(2).await.expect("detail").title, "video 2");

        service.like(2, 5).await.expect("like");
        let fresh = service.detail(2).await.expect("detail");
        assert_eq!(fresh.title, "renamed");
        assert_eq!(fresh.likes_count, 1);
    }

    #[tokio::test]
    async fn duplicate_like_and_missing_unlike_are_reported() {
        let (service, _) = service(store());

        service.like(1, 30).await.expect("first like");
        assert!(matches!(
            service.like(1, 30).await,
            Err(VideoError::AlreadyLiked)
        ));
        assert!(matches!(
            service.unlike(2, 30).await,
            Err(VideoError::NotLiked)
        ));
        assert!(matches!(
            service.like(404, 30).await,
            Err(VideoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn only_the_author_can_delete() {
        let store = store();
        let (service, cache) = service(store.clone());
        service.detail(1).await.expect("warm");

        assert!(matches!(
            service.delete(1, 20).await,
            Err(VideoError::Forbidden)
        ));
        service.delete(1, 10).await.expect("delete");
        assert!(!cache.contains_key("video:detail:id=1"));
        assert!(matches!(service.detail(1).await, Err(VideoError::NotFound)));
        assert!(matches!(
            service.delete(1, 10).await,
            Err(VideoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn publish_validates_and_inserts() {
        let store = store();
        let (service, _) = service(store.clone());

        let err = service
            .publish(
                10,
                PublishVideoCommand {
                    title: "  ".into(),
                    description: None,
                    play_url: "https://cdn/v.mp4".into(),
                    cover_url: "https://cdn/c.jpg".into(),
                },
            )
            .await
            .expect_err("blank title");
        assert!(matches!(err, VideoError::Validation(_)));

        let record = service
            .publish(
                10,
                PublishVideoCommand {
                    title: " New clip ".into(),
                    description: Some("desc".into()),
                    play_url: "https://cdn/v.mp4".into(),
                    cover_url: "https://cdn/c.jpg".into(),
                },
            )
            .await
            .expect("published");
        assert_eq!(record.title, "New clip");
        assert_eq!(record.id, 3);
        assert_eq!(service.detail(3).await.expect("detail"), record);
    }
}
