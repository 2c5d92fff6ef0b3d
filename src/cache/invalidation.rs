//! Eviction hooks called by mutation paths.
//!
//! Only single-item entries are evicted. Feed pages span too many
//! filter/cursor combinations to target and simply age out by their TTL.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};

use super::client::CacheClient;
use super::gateway::CacheGateway;
use super::keys::CacheKey;
use super::{METRIC_CACHE_ERROR, METRIC_CACHE_EVICT};

const SOURCE: &str = "vidfeed::cache::invalidation";

#[derive(Clone)]
pub struct CacheInvalidator {
    client: Arc<dyn CacheClient>,
    op_timeout: Duration,
}

impl CacheInvalidator {
    pub fn new(gateway: &CacheGateway) -> Self {
        Self {
            client: Arc::clone(gateway.client()),
            op_timeout: gateway.op_timeout(),
        }
    }

    /// Best-effort delete; failures are logged and counted, never returned.
    pub async fn evict(&self, key: &CacheKey) {
        match tokio::time::timeout(self.op_timeout, self.client.delete(key.as_str())).await {
            Ok(Ok(())) => {
                counter!(METRIC_CACHE_EVICT).increment(1);
                debug!(target: SOURCE, cache_key = %key, "evicted cache entry");
            }
            Ok(Err(err)) => {
                counter!(METRIC_CACHE_ERROR).increment(1);
                warn!(
                    target: SOURCE,
                    cache_key = %key,
                    backend = self.client.backend_name(),
                    error = %err,
                    "cache eviction failed"
                );
            }
            Err(_) => {
                counter!(METRIC_CACHE_ERROR).increment(1);
                warn!(
                    target: SOURCE,
                    cache_key = %key,
                    backend = self.client.backend_name(),
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "cache eviction timed out"
                );
            }
        }
    }

    pub async fn video_changed(&self, video_id: i64) {
        self.evict(&CacheKey::video_detail(video_id)).await;
    }
}
