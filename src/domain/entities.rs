//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A published video as stored in the system of record.
///
/// Records are what the cache holds; per-viewer state such as "liked" never
/// lives on this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: i64,
    pub author_id: i64,
    pub username: String,
    pub title: String,
    pub description: Option<String>,
    pub play_url: String,
    pub cover_url: String,
    pub likes_count: i64,
    pub popularity: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedAuthor {
    pub id: i64,
    pub username: String,
}

/// A video as presented in a feed page, enriched for one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedVideoItem {
    pub id: i64,
    pub author: FeedAuthor,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub play_url: String,
    pub cover_url: String,
    /// Creation time as unix seconds.
    pub create_time: i64,
    pub likes_count: i64,
    pub is_liked: bool,
}

impl FeedVideoItem {
    pub fn from_record(record: &VideoRecord, is_liked: bool) -> Self {
        Self {
            id: record.id,
            author: FeedAuthor {
                id: record.author_id,
                username: record.username.clone(),
            },
            title: record.title.clone(),
            description: record.description.clone(),
            play_url: record.play_url.clone(),
            cover_url: record.cover_url.clone(),
            create_time: record.created_at.unix_timestamp(),
            likes_count: record.likes_count,
            is_liked,
        }
    }
}

/// Fields required to insert a new video.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub author_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub play_url: String,
    pub cover_url: String,
}
