use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::application::pagination::{LatestCursor, PageRequest, PopularityCursor};
use crate::application::repos::{FeedRepo, RepoError};
use crate::domain::entities::VideoRecord;

use super::{PostgresRepositories, VIDEO_COLUMNS, VideoRow, map_sqlx_error};

fn select_videos() -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(VIDEO_COLUMNS);
    qb.push(" FROM videos v WHERE 1=1 ");
    qb
}

fn push_latest_cursor(qb: &mut QueryBuilder<'_, Postgres>, cursor: Option<LatestCursor>) {
    let Some(cursor) = cursor else {
        return;
    };
    match cursor.id() {
        Some(id) => {
            qb.push(" AND (v.created_at, v.id) < (");
            qb.push_bind(cursor.before());
            qb.push(", ");
            qb.push_bind(id);
            qb.push(")");
        }
        None => {
            qb.push(" AND v.created_at < ");
            qb.push_bind(cursor.before());
        }
    }
}

fn push_limit(qb: &mut QueryBuilder<'_, Postgres>, limit: u32) {
    qb.push(" LIMIT ");
    qb.push_bind(i64::from(limit));
}

impl PostgresRepositories {
    async fn fetch_videos(
        &self,
        mut qb: QueryBuilder<'_, Postgres>,
    ) -> Result<Vec<VideoRecord>, RepoError> {
        let rows = qb
            .build_query_as::<VideoRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(VideoRecord::from).collect())
    }
}

#[async_trait]
impl FeedRepo for PostgresRepositories {
    async fn list_latest(
        &self,
        page: PageRequest<LatestCursor>,
    ) -> Result<Vec<VideoRecord>, RepoError> {
        let mut qb = select_videos();
        push_latest_cursor(&mut qb, page.cursor);
        qb.push(" ORDER BY v.created_at DESC, v.id DESC");
        push_limit(&mut qb, page.limit);

        self.fetch_videos(qb).await
    }

    async fn list_by_popularity(
        &self,
        page: PageRequest<PopularityCursor>,
    ) -> Result<Vec<VideoRecord>, RepoError> {
        let mut qb = select_videos();
        if let Some(cursor) = page.cursor {
            qb.push(" AND (v.likes_count, v.id) < (");
            qb.push_bind(cursor.likes_count());
            qb.push(", ");
            qb.push_bind(cursor.id());
            qb.push(")");
        }
        qb.push(" ORDER BY v.likes_count DESC, v.id DESC");
        push_limit(&mut qb, page.limit);

        self.fetch_videos(qb).await
    }

    async fn list_by_following(
        &self,
        follower_id: i64,
        page: PageRequest<LatestCursor>,
    ) -> Result<Vec<VideoRecord>, RepoError> {
        let mut qb = select_videos();
        qb.push(" AND v.author_id IN (SELECT f.vlogger_id FROM follows f WHERE f.follower_id = ");
        qb.push_bind(follower_id);
        qb.push(")");
        push_latest_cursor(&mut qb, page.cursor);
        qb.push(" ORDER BY v.created_at DESC, v.id DESC");
        push_limit(&mut qb, page.limit);

        self.fetch_videos(qb).await
    }
}
