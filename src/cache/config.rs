//! Cache configuration.
//!
//! Timeout budgets, lock polling and the per-query TTLs used by the gateway.

use std::time::Duration;

use serde::Deserialize;

use super::gateway::ResolvePolicy;

const DEFAULT_OP_TIMEOUT_MS: u64 = 50;
const DEFAULT_POLL_ATTEMPTS: u32 = 5;
const DEFAULT_POLL_INTERVAL_MS: u64 = 20;
const DEFAULT_LIST_TTL_SECS: u64 = 5;
const DEFAULT_LIST_LOCK_TTL_MS: u64 = 500;
const DEFAULT_DETAIL_TTL_SECS: u64 = 300;
const DEFAULT_DETAIL_LOCK_TTL_MS: u64 = 2_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the distributed cache at all; disabled means every read misses.
    pub enabled: bool,
    pub redis_url: Option<String>,
    /// Budget for a single cache operation.
    pub op_timeout_ms: u64,
    /// Polls made by a caller that lost the lock race.
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub list_ttl_secs: u64,
    pub list_lock_ttl_ms: u64,
    pub detail_ttl_secs: u64,
    pub detail_lock_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: None,
            op_timeout_ms: DEFAULT_OP_TIMEOUT_MS,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            list_ttl_secs: DEFAULT_LIST_TTL_SECS,
            list_lock_ttl_ms: DEFAULT_LIST_LOCK_TTL_MS,
            detail_ttl_secs: DEFAULT_DETAIL_TTL_SECS,
            detail_lock_ttl_ms: DEFAULT_DETAIL_LOCK_TTL_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            redis_url: settings.redis_url.clone(),
            op_timeout_ms: settings.op_timeout_ms,
            poll_attempts: settings.poll_attempts,
            poll_interval_ms: settings.poll_interval_ms,
            list_ttl_secs: settings.list_ttl_secs,
            list_lock_ttl_ms: settings.list_lock_ttl_ms,
            detail_ttl_secs: settings.detail_ttl_secs,
            detail_lock_ttl_ms: settings.detail_lock_ttl_ms,
        }
    }
}

impl CacheConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Feed pages: short TTL, they are never evicted explicitly.
    pub fn list_policy(&self) -> ResolvePolicy {
        ResolvePolicy {
            ttl: Duration::from_secs(self.list_ttl_secs),
            lock_ttl: Duration::from_millis(self.list_lock_ttl_ms),
        }
    }

    /// Single videos: long TTL, evicted on every mutation.
    pub fn detail_policy(&self) -> ResolvePolicy {
        ResolvePolicy {
            ttl: Duration::from_secs(self.detail_ttl_secs),
            lock_ttl: Duration::from_millis(self.detail_lock_ttl_ms),
        }
    }
}
