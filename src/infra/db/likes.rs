use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{query, query_scalar};

use crate::application::repos::{LikesRepo, LikesWriteRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl LikesRepo for PostgresRepositories {
    async fn liked_among(
        &self,
        account_id: i64,
        video_ids: &[i64],
    ) -> Result<HashSet<i64>, RepoError> {
        if video_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let liked: Vec<i64> = query_scalar(
            "SELECT video_id FROM likes WHERE account_id = $1 AND video_id = ANY($2)",
        )
        .bind(account_id)
        .bind(video_ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(liked.into_iter().collect())
    }
}

#[async_trait]
impl LikesWriteRepo for PostgresRepositories {
    async fn like(&self, video_id: i64, account_id: i64) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let exists: Option<i64> =
            query_scalar("SELECT id FROM videos WHERE id = $1 FOR UPDATE")
                .bind(video_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        if exists.is_none() {
            return Err(RepoError::NotFound);
        }

        query("INSERT INTO likes (video_id, account_id) VALUES ($1, $2)")
            .bind(video_id)
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        query(
            "UPDATE videos SET likes_count = likes_count + 1, popularity = popularity + 1 \
             WHERE id = $1",
        )
        .bind(video_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn unlike(&self, video_id: i64, account_id: i64) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let removed = query("DELETE FROM likes WHERE video_id = $1 AND account_id = $2")
            .bind(video_id)
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if removed.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        query(
            "UPDATE videos SET likes_count = GREATEST(likes_count - 1, 0), \
             popularity = GREATEST(popularity - 1, 0) WHERE id = $1",
        )
        .bind(video_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)
    }
}
