//! In-process TTL store for tests and single-node deployments.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::client::{CacheClient, CacheError};

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

impl StoredValue {
    fn new(bytes: &[u8], ttl: Duration) -> Self {
        Self {
            bytes: bytes.to_vec(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Expired entries read as misses and are purged on access.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, StoredValue>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| entry.value().is_live(now))
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.value().is_live(now) => return Ok(Some(entry.bytes.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        // The read guard is gone by now; purging under it would deadlock the shard.
        self.entries.remove_if(key, |_, value| !value.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let stored = StoredValue::new(token.as_bytes(), ttl);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(stored);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                Ok(true)
            }
        }
    }

    async fn delete_if_equals(&self, key: &str, token: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let removed = self.entries.remove_if(key, |_, value| {
            value.is_live(now) && value.bytes == token.as_bytes()
        });
        Ok(removed.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("video:detail:id=1", b"payload", Duration::from_secs(5))
            .await
            .expect("set");
        assert_eq!(
            cache.get("video:detail:id=1").await.expect("get"),
            Some(b"payload".to_vec())
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("video:detail:id=1").await.expect("get"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_respects_live_holder_and_reclaims_expired() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_millis(500);
        assert!(cache.set_if_absent("lock:k", "a", ttl).await.expect("first"));
        assert!(!cache.set_if_absent("lock:k", "b", ttl).await.expect("second"));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(cache.set_if_absent("lock:k", "b", ttl).await.expect("after expiry"));
    }

    #[tokio::test]
    async fn delete_if_equals_only_removes_matching_token() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(1);
        cache.set_if_absent("lock:k", "mine", ttl).await.expect("acquire");

        assert!(!cache.delete_if_equals("lock:k", "theirs").await.expect("cad"));
        assert!(cache.contains_key("lock:k"));
        assert!(cache.delete_if_equals("lock:k", "mine").await.expect("cad"));
        assert!(!cache.contains_key("lock:k"));
    }
}
