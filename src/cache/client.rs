//! The narrow key/value interface the gateway consumes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache operation `{op}` timed out")]
    Timeout { op: &'static str },
    #[error("cache payload codec error: {0}")]
    Codec(String),
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Key/value store with TTLs and the two atomic primitives used for locking.
///
/// A miss is `Ok(None)`, never an error.
#[async_trait]
pub trait CacheClient: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Stores `token` only if `key` is absent. Returns whether it was stored.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration)
    -> Result<bool, CacheError>;

    /// Deletes `key` only while it still holds `token`. Returns whether it was deleted.
    async fn delete_if_equals(&self, key: &str, token: &str) -> Result<bool, CacheError>;
}

/// Null object used when caching is switched off or the backend is unreachable.
///
/// Locks are always granted, so callers go straight to the store instead of
/// polling for a backfill that can never land.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

#[async_trait]
impl CacheClient for DisabledCache {
    fn backend_name(&self) -> &'static str {
        "disabled"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _token: &str,
        _ttl: Duration,
    ) -> Result<bool, CacheError> {
        Ok(true)
    }

    async fn delete_if_equals(&self, _key: &str, _token: &str) -> Result<bool, CacheError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = DisabledCache;
        cache
            .set("k", b"v", Duration::from_secs(1))
            .await
            .expect("set is a no-op");
        assert!(cache.get("k").await.expect("get").is_none());
        assert!(
            cache
                .set_if_absent("lock:k", "t", Duration::from_secs(1))
                .await
                .expect("set_if_absent")
        );
        assert!(
            cache
                .set_if_absent("lock:k", "u", Duration::from_secs(1))
                .await
                .expect("set_if_absent")
        );
    }
}
