//! Cursor pagination: opaque cursor tokens, limit clamping and page assembly.
//!
//! Cursors travel as URL-safe base64 JSON. Decoding validates the cursor
//! structure so a malformed cursor is rejected before it can reach a store.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use time::OffsetDateTime;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 50;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("cursor sort value and identifier must be provided together")]
    MissingPair,
    #[error("cursor sort value must not be negative")]
    NegativeSortValue,
    #[error("cursor identifier must be positive unless the sort value is zero")]
    ZeroIdentifier,
    #[error("cursor identifier must not be negative")]
    NegativeIdentifier,
}

/// Server-side bounds for requested page sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub default: u32,
    pub max: u32,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            default: DEFAULT_PAGE_LIMIT,
            max: MAX_PAGE_LIMIT,
        }
    }
}

impl FeedLimits {
    /// Unset, zero or oversized requests fall back to the default limit.
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(limit) if (1..=self.max).contains(&limit) => limit,
            _ => self.default,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LatestCursorPayload {
    /// Unix microseconds, the resolution of the store's timestamps.
    before_us: i64,
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PopularityCursorPayload {
    #[serde(default)]
    likes_count: Option<i64>,
    #[serde(default)]
    id: Option<i64>,
}

/// Position in a chronological (newest first) feed.
///
/// Rows strictly after the cursor satisfy
/// `created_at < before OR (created_at = before AND id < id)`; a cursor
/// without an identifier degrades to `created_at < before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LatestCursor {
    #[serde(with = "time::serde::rfc3339")]
    before: OffsetDateTime,
    id: Option<i64>,
}

/// Position in the popularity feed, ordered by `likes_count DESC, id DESC`.
///
/// Rows strictly after the cursor satisfy
/// `likes_count < count OR (likes_count = count AND id < id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopularityCursor {
    likes_count: i64,
    id: i64,
}

impl LatestCursor {
    pub fn new(before: OffsetDateTime, id: Option<i64>) -> Self {
        Self { before, id }
    }

    /// Cursor pointing just past the given row.
    pub fn after_row(created_at: OffsetDateTime, id: i64) -> Self {
        Self::new(created_at, Some(id))
    }

    pub fn before(&self) -> OffsetDateTime {
        self.before
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn before_micros(&self) -> i64 {
        let micros = self.before.unix_timestamp_nanos() / 1_000;
        i64::try_from(micros).unwrap_or(if micros < 0 { i64::MIN } else { i64::MAX })
    }

    pub fn encode(&self) -> String {
        encode_payload(&LatestCursorPayload {
            before_us: self.before_micros(),
            id: self.id,
        })
    }

    /// Decode a token; the epoch sentinel (`before = 0` without a row
    /// identifier) means "start of the feed" and yields `None`.
    ///
    /// A cursor carrying a real row identifier always names a position, even
    /// when that row sits at or before the epoch.
    pub fn decode(cursor: &str) -> Result<Option<Self>, PaginationError> {
        let payload: LatestCursorPayload = decode_payload(cursor)?;
        match (payload.before_us, payload.id) {
            (_, Some(id)) if id < 0 => return Err(PaginationError::NegativeIdentifier),
            (0, None | Some(0)) => return Ok(None),
            (_, Some(0)) => return Err(PaginationError::ZeroIdentifier),
            (before_us, None) if before_us < 0 => {
                return Err(PaginationError::NegativeSortValue);
            }
            _ => {}
        }

        let before =
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(payload.before_us) * 1_000)
                .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Some(Self::new(before, payload.id)))
    }
}

impl PopularityCursor {
    /// Validate a (likes_count, id) pair.
    ///
    /// Both halves absent, or the `(0, 0)` start sentinel, produce `None`.
    /// An identifier of zero paired with any other count is malformed.
    pub fn from_parts(
        likes_count: Option<i64>,
        id: Option<i64>,
    ) -> Result<Option<Self>, PaginationError> {
        let (likes_count, id) = match (likes_count, id) {
            (None, None) => return Ok(None),
            (Some(likes_count), Some(id)) => (likes_count, id),
            _ => return Err(PaginationError::MissingPair),
        };

        if likes_count < 0 {
            return Err(PaginationError::NegativeSortValue);
        }
        if id < 0 {
            return Err(PaginationError::NegativeIdentifier);
        }
        if id == 0 {
            return if likes_count == 0 {
                Ok(None)
            } else {
                Err(PaginationError::ZeroIdentifier)
            };
        }

        Ok(Some(Self { likes_count, id }))
    }

    /// Cursor pointing just past the given row.
    pub fn after_row(likes_count: i64, id: i64) -> Self {
        Self { likes_count, id }
    }

    pub fn likes_count(&self) -> i64 {
        self.likes_count
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn encode(&self) -> String {
        encode_payload(&PopularityCursorPayload {
            likes_count: Some(self.likes_count),
            id: Some(self.id),
        })
    }

    pub fn decode(cursor: &str) -> Result<Option<Self>, PaginationError> {
        let payload: PopularityCursorPayload = decode_payload(cursor)?;
        Self::from_parts(payload.likes_count, payload.id)
    }
}

fn encode_payload<P: Serialize>(payload: &P) -> String {
    let serialized =
        serde_json::to_vec(payload).expect("serializing an integer cursor payload should succeed");
    URL_SAFE_NO_PAD.encode(serialized)
}

fn decode_payload<P: DeserializeOwned>(cursor: &str) -> Result<P, PaginationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.trim())
        .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| PaginationError::InvalidCursor(err.to_string()))
}

/// Cursor-aware pagination request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<C> {
    pub limit: u32,
    pub cursor: Option<C>,
}

impl<C> PageRequest<C> {
    pub fn new(limit: u32, cursor: Option<C>) -> Self {
        Self { limit, cursor }
    }
}

/// One page of a cursor-paginated scan.
///
/// `has_more` is true exactly when the page came back full; the store is
/// asked for `limit` rows, never `limit + 1`, so a full page means "maybe more".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_cursor: Option<C>,
}

impl<T, C> Page<T, C> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            next_cursor: None,
        }
    }

    pub fn from_rows(rows: Vec<T>, limit: u32, cursor_of: impl Fn(&T) -> C) -> Self {
        if rows.is_empty() {
            return Self::empty();
        }
        let has_more = rows.len() == limit as usize;
        let next_cursor = rows.last().map(cursor_of);
        Self {
            items: rows,
            has_more,
            next_cursor,
        }
    }
}
