//! Distributed read-path cache.
//!
//! - **client**: the key/value interface plus the disabled null object
//! - **gateway**: stampede-safe cache-aside resolution used by every read path
//! - **invalidation**: eviction hooks for mutation paths
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! redis_url = "redis://127.0.0.1:6379"
//! op_timeout_ms = 50
//! list_ttl_secs = 5
//! detail_ttl_secs = 300
//! # ... see config.rs for all options
//! ```

mod client;
mod config;
mod gateway;
mod invalidation;
mod keys;
mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

pub use client::{CacheClient, CacheError, DisabledCache};
pub use config::CacheConfig;
pub use gateway::{CacheGateway, ResolvePolicy};
pub use invalidation::CacheInvalidator;
pub use keys::CacheKey;
pub use memory::MemoryCache;
pub use self::redis::RedisCache;

pub(crate) const METRIC_CACHE_HIT: &str = "vidfeed_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "vidfeed_cache_miss_total";
pub(crate) const METRIC_CACHE_LOCK_ACQUIRED: &str = "vidfeed_cache_lock_acquired_total";
pub(crate) const METRIC_CACHE_LOCK_CONTENDED: &str = "vidfeed_cache_lock_contended_total";
pub(crate) const METRIC_CACHE_FALLBACK: &str = "vidfeed_cache_fallback_total";
pub(crate) const METRIC_CACHE_ERROR: &str = "vidfeed_cache_error_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "vidfeed_cache_evict_total";
pub(crate) const METRIC_STORE_COMPUTE_MS: &str = "vidfeed_store_compute_ms";

const CONNECT_BUDGET: Duration = Duration::from_millis(300);

/// Pick the cache backend for this process.
///
/// The cache is optional: an unreachable Redis degrades to [`DisabledCache`]
/// instead of failing startup.
pub async fn connect(config: &CacheConfig) -> Arc<dyn CacheClient> {
    if !config.enabled {
        info!(target: "vidfeed::cache", backend = "disabled", "Read-path cache disabled by configuration");
        return Arc::new(DisabledCache);
    }

    let Some(url) = config.redis_url.as_deref() else {
        info!(target: "vidfeed::cache", backend = "memory", "No redis_url configured; using in-process cache");
        return Arc::new(MemoryCache::new());
    };

    match RedisCache::connect(url, CONNECT_BUDGET).await {
        Ok(cache) => Arc::new(cache),
        Err(err) => {
            warn!(
                target: "vidfeed::cache",
                backend = "redis",
                error = %err,
                "Redis unavailable at startup; continuing without read-path cache"
            );
            Arc::new(DisabledCache)
        }
    }
}
