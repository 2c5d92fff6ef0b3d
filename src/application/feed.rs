use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::application::pagination::{
    FeedLimits, LatestCursor, Page, PageRequest, PaginationError, PopularityCursor,
};
use crate::application::repos::{FeedRepo, LikesRepo, RepoError};
use crate::cache::{CacheGateway, CacheKey, ResolvePolicy};
use crate::domain::entities::{FeedVideoItem, VideoRecord};
use crate::domain::types::Viewer;

type LatestPage = Page<VideoRecord, LatestCursor>;
type PopularPage = Page<VideoRecord, PopularityCursor>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(#[source] PaginationError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// One feed page enriched for the requesting viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedResponse {
    pub videos: Vec<FeedVideoItem>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Builds the chronological, popularity and following feeds.
///
/// Only the selection page of records goes through the cache. Like state is
/// joined per request with a single batched lookup, so a shared page never
/// carries one viewer's flags to another.
#[derive(Clone)]
pub struct FeedService {
    feeds: Arc<dyn FeedRepo>,
    likes: Arc<dyn LikesRepo>,
    gateway: CacheGateway,
    policy: ResolvePolicy,
    limits: FeedLimits,
}

impl FeedService {
    pub fn new(
        feeds: Arc<dyn FeedRepo>,
        likes: Arc<dyn LikesRepo>,
        gateway: CacheGateway,
        policy: ResolvePolicy,
        limits: FeedLimits,
    ) -> Self {
        Self {
            feeds,
            likes,
            gateway,
            policy,
            limits,
        }
    }

    /// Newest first. Cached only for anonymous viewers.
    pub async fn latest(
        &self,
        limit: Option<u32>,
        cursor: Option<LatestCursor>,
        viewer: Viewer,
    ) -> Result<FeedResponse, FeedError> {
        let request = PageRequest::new(self.limits.clamp(limit), cursor);
        let page = if viewer.is_anonymous() {
            let key = CacheKey::latest_feed(request.limit, cursor.as_ref());
            self.gateway
                .resolve(&key, self.policy, || self.select_latest(request))
                .await?
        } else {
            self.select_latest(request).await?
        };
        self.enrich(page, viewer, LatestCursor::encode).await
    }

    /// Most liked first, ties broken by newer id. Always cached.
    pub async fn popular(
        &self,
        limit: Option<u32>,
        cursor: Option<PopularityCursor>,
        viewer: Viewer,
    ) -> Result<FeedResponse, FeedError> {
        let request = PageRequest::new(self.limits.clamp(limit), cursor);
        let key = CacheKey::popular_feed(request.limit, cursor.as_ref());
        let page: PopularPage = self
            .gateway
            .resolve(&key, self.policy, || async move {
                let rows = self.feeds.list_by_popularity(request).await?;
                Ok::<_, RepoError>(Page::from_rows(rows, request.limit, |row| {
                    PopularityCursor::after_row(row.likes_count, row.id)
                }))
            })
            .await?;
        self.enrich(page, viewer, PopularityCursor::encode).await
    }

    /// Videos by authors the viewer follows, newest first.
    ///
    /// An anonymous viewer has no follow graph and gets the unfiltered
    /// chronological feed, uncached.
    pub async fn following(
        &self,
        limit: Option<u32>,
        cursor: Option<LatestCursor>,
        viewer: Viewer,
    ) -> Result<FeedResponse, FeedError> {
        let request = PageRequest::new(self.limits.clamp(limit), cursor);
        let page = match viewer.account_id() {
            None => self.select_latest(request).await?,
            Some(follower_id) => {
                let key = CacheKey::following_feed(follower_id, request.limit, cursor.as_ref());
                self.gateway
                    .resolve(&key, self.policy, || async move {
                        let rows = self.feeds.list_by_following(follower_id, request).await?;
                        Ok::<_, RepoError>(latest_page(rows, request.limit))
                    })
                    .await?
            }
        };
        self.enrich(page, viewer, LatestCursor::encode).await
    }

    pub async fn latest_from_token(
        &self,
        limit: Option<u32>,
        cursor: Option<&str>,
        viewer: Viewer,
    ) -> Result<FeedResponse, FeedError> {
        let cursor = decode_token(cursor, LatestCursor::decode)?;
        self.latest(limit, cursor, viewer).await
    }

    pub async fn popular_from_token(
        &self,
        limit: Option<u32>,
        cursor: Option<&str>,
        viewer: Viewer,
    ) -> Result<FeedResponse, FeedError> {
        let cursor = decode_token(cursor, PopularityCursor::decode)?;
        self.popular(limit, cursor, viewer).await
    }

    pub async fn following_from_token(
        &self,
        limit: Option<u32>,
        cursor: Option<&str>,
        viewer: Viewer,
    ) -> Result<FeedResponse, FeedError> {
        let cursor = decode_token(cursor, LatestCursor::decode)?;
        self.following(limit, cursor, viewer).await
    }

    async fn select_latest(
        &self,
        request: PageRequest<LatestCursor>,
    ) -> Result<LatestPage, RepoError> {
        let rows = self.feeds.list_latest(request).await?;
        Ok(latest_page(rows, request.limit))
    }

    async fn enrich<C>(
        &self,
        page: Page<VideoRecord, C>,
        viewer: Viewer,
        encode: impl Fn(&C) -> String,
    ) -> Result<FeedResponse, FeedError> {
        let liked = match viewer.account_id() {
            Some(account_id) if !page.items.is_empty() => {
                let ids: Vec<i64> = page.items.iter().map(|video| video.id).collect();
                self.likes.liked_among(account_id, &ids).await?
            }
            _ => HashSet::new(),
        };

        let videos = page
            .items
            .iter()
            .map(|record| FeedVideoItem::from_record(record, liked.contains(&record.id)))
            .collect();

        Ok(FeedResponse {
            videos,
            next_cursor: page.next_cursor.as_ref().map(encode),
            has_more: page.has_more,
        })
    }
}

fn latest_page(rows: Vec<VideoRecord>, limit: u32) -> LatestPage {
    Page::from_rows(rows, limit, |row| {
        LatestCursor::after_row(row.created_at, row.id)
    })
}

/// Blank tokens mean "from the start".
fn decode_token<C>(
    token: Option<&str>,
    decode: impl FnOnce(&str) -> Result<Option<C>, PaginationError>,
) -> Result<Option<C>, FeedError> {
    match token.map(str::trim).filter(|token| !token.is_empty()) {
        None => Ok(None),
        Some(token) => decode(token).map_err(FeedError::InvalidCursor),
    }
}
