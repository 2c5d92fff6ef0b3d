//! Cache key derivation.
//!
//! Keys are rendered from decoded cursors, so two tokens naming the same
//! position share one entry. Viewer identity only appears in keys of
//! viewer-scoped queries.

use std::fmt;

use crate::application::pagination::{LatestCursor, PopularityCursor};

const START: &str = "start";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn video_detail(id: i64) -> Self {
        Self(format!("video:detail:id={id}"))
    }

    pub fn latest_feed(limit: u32, cursor: Option<&LatestCursor>) -> Self {
        Self(format!(
            "feed:latest:limit={limit}:before={}",
            render_latest(cursor)
        ))
    }

    pub fn popular_feed(limit: u32, cursor: Option<&PopularityCursor>) -> Self {
        let after = cursor.map_or_else(
            || START.to_string(),
            |cursor| format!("{}.{}", cursor.likes_count(), cursor.id()),
        );
        Self(format!("feed:popular:limit={limit}:after={after}"))
    }

    pub fn following_feed(viewer_id: i64, limit: u32, cursor: Option<&LatestCursor>) -> Self {
        Self(format!(
            "feed:following:viewer={viewer_id}:limit={limit}:before={}",
            render_latest(cursor)
        ))
    }

    /// Key of the lock guarding backfill of this entry.
    pub fn lock_key(&self) -> String {
        format!("lock:{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn render_latest(cursor: Option<&LatestCursor>) -> String {
    match cursor {
        None => START.to_string(),
        Some(cursor) => match cursor.id() {
            Some(id) => format!("{}.{id}", cursor.before_micros()),
            None => cursor.before_micros().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn detail_and_lock_keys() {
        let key = CacheKey::video_detail(42);
        assert_eq!(key.as_str(), "video:detail:id=42");
        assert_eq!(key.lock_key(), "lock:video:detail:id=42");
    }

    #[test]
    fn feed_keys_render_decoded_cursor() {
        let cursor = LatestCursor::after_row(datetime!(1970-01-01 00:00:01 UTC), 7);
        assert_eq!(
            CacheKey::latest_feed(10, Some(&cursor)).as_str(),
            "feed:latest:limit=10:before=1000000.7"
        );
        assert_eq!(
            CacheKey::latest_feed(10, None).as_str(),
            "feed:latest:limit=10:before=start"
        );

        let popular = PopularityCursor::after_row(12, 9);
        assert_eq!(
            CacheKey::popular_feed(5, Some(&popular)).as_str(),
            "feed:popular:limit=5:after=12.9"
        );
    }

    #[test]
    fn only_following_keys_carry_the_viewer() {
        let key = CacheKey::following_feed(3, 10, None);
        assert_eq!(key.as_str(), "feed:following:viewer=3:limit=10:before=start");
        assert!(!CacheKey::latest_feed(10, None).as_str().contains("viewer"));
        assert!(!CacheKey::popular_feed(10, None).as_str().contains("viewer"));
    }

    #[test]
    fn equivalent_tokens_share_a_key() {
        let cursor = PopularityCursor::after_row(4, 2);
        let token = cursor.encode();
        let padded = format!("  {token} ");
        let decoded = PopularityCursor::decode(&padded)
            .expect("decodes")
            .expect("cursor");
        assert_eq!(
            CacheKey::popular_feed(10, Some(&cursor)),
            CacheKey::popular_feed(10, Some(&decoded))
        );
    }
}
