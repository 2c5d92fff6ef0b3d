//! Postgres-backed repository implementations.

mod feed;
mod likes;
mod util;
mod videos;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, Transaction,
    postgres::{PgPool, PgPoolOptions},
    query,
};
use time::OffsetDateTime;

use crate::domain::entities::VideoRecord;

/// Column list shared by every query returning [`VideoRow`].
const VIDEO_COLUMNS: &str = "v.id, v.author_id, v.username, v.title, v.description, \
     v.play_url, v.cover_url, v.likes_count, v.popularity, v.created_at";

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VideoRow {
    id: i64,
    author_id: i64,
    username: String,
    title: String,
    description: Option<String>,
    play_url: String,
    cover_url: String,
    likes_count: i64,
    popularity: i64,
    created_at: OffsetDateTime,
}

impl From<VideoRow> for VideoRecord {
    fn from(row: VideoRow) -> Self {
        Self {
            id: row.id,
            author_id: row.author_id,
            username: row.username,
            title: row.title,
            description: row.description,
            play_url: row.play_url,
            cover_url: row.cover_url,
            likes_count: row.likes_count,
            popularity: row.popularity,
            created_at: row.created_at,
        }
    }
}
