use async_trait::async_trait;
use sqlx::query_as;

use crate::application::repos::{RepoError, VideosRepo, VideosWriteRepo};
use crate::domain::entities::{NewVideo, VideoRecord};

use super::{PostgresRepositories, VIDEO_COLUMNS, VideoRow, map_sqlx_error};

#[async_trait]
impl VideosRepo for PostgresRepositories {
    async fn find_by_id(&self, id: i64) -> Result<Option<VideoRecord>, RepoError> {
        let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos v WHERE v.id = $1");
        let row = query_as::<_, VideoRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(VideoRecord::from))
    }
}

#[async_trait]
impl VideosWriteRepo for PostgresRepositories {
    async fn create_video(&self, video: NewVideo) -> Result<VideoRecord, RepoError> {
        let NewVideo {
            author_id,
            title,
            description,
            play_url,
            cover_url,
        } = video;

        // The author's username is denormalized onto the row at publish time.
        let sql = format!(
            "INSERT INTO videos AS v (author_id, username, title, description, play_url, cover_url) \
             SELECT a.id, a.username, $2, $3, $4, $5 FROM accounts a WHERE a.id = $1 \
             RETURNING {VIDEO_COLUMNS}"
        );
        let row = query_as::<_, VideoRow>(&sql)
            .bind(author_id)
            .bind(title)
            .bind(description)
            .bind(play_url)
            .bind(cover_url)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(VideoRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_video(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM videos WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
