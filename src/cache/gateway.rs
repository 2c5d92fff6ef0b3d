//! Stampede-safe cache-aside resolution.
//!
//! `resolve` answers from the cache when it can. On a miss, one caller per key
//! takes a short-lived lock, rechecks, computes and backfills. Callers that
//! lose the lock race poll for the backfill a few times, then compute
//! directly rather than wait any longer. Cache faults degrade to misses.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use uuid::Uuid;

use super::client::{CacheClient, CacheError, DisabledCache};
use super::config::CacheConfig;
use super::keys::CacheKey;
use super::{
    METRIC_CACHE_ERROR, METRIC_CACHE_FALLBACK, METRIC_CACHE_HIT, METRIC_CACHE_LOCK_ACQUIRED,
    METRIC_CACHE_LOCK_CONTENDED, METRIC_CACHE_MISS, METRIC_STORE_COMPUTE_MS,
};

const SOURCE: &str = "vidfeed::cache::gateway";

/// Per-query-kind lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// Lifetime of the backfilled entry.
    pub ttl: Duration,
    /// Lifetime of the backfill lock; sized to the expected compute cost.
    pub lock_ttl: Duration,
}

#[derive(Clone)]
pub struct CacheGateway {
    client: Arc<dyn CacheClient>,
    op_timeout: Duration,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl std::fmt::Debug for CacheGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheGateway")
            .field("backend", &self.client.backend_name())
            .field("op_timeout", &self.op_timeout)
            .field("poll_attempts", &self.poll_attempts)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

enum LockAttempt {
    Acquired(LockGuard),
    Contended,
    Unavailable,
}

impl CacheGateway {
    pub fn new(client: Arc<dyn CacheClient>, config: &CacheConfig) -> Self {
        Self {
            client,
            op_timeout: config.op_timeout(),
            poll_attempts: config.poll_attempts,
            poll_interval: config.poll_interval(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledCache), &CacheConfig::default())
    }

    pub fn backend_name(&self) -> &'static str {
        self.client.backend_name()
    }

    pub(crate) fn client(&self) -> &Arc<dyn CacheClient> {
        &self.client
    }

    pub(crate) fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    /// Return the cached value for `key`, or compute and backfill it.
    ///
    /// `compute` runs at most once. Its error is returned unchanged; cache
    /// faults never are.
    pub async fn resolve<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        policy: ResolvePolicy,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.read::<T>(key).await {
            counter!(METRIC_CACHE_HIT).increment(1);
            debug!(target: SOURCE, cache_key = %key, result = "hit", "cache lookup");
            return Ok(value);
        }
        counter!(METRIC_CACHE_MISS).increment(1);
        debug!(target: SOURCE, cache_key = %key, result = "miss", "cache lookup");

        match self.try_lock(key, policy.lock_ttl).await {
            LockAttempt::Acquired(guard) => {
                counter!(METRIC_CACHE_LOCK_ACQUIRED).increment(1);

                if let Some(value) = self.read::<T>(key).await {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    debug!(target: SOURCE, cache_key = %key, result = "hit_after_lock", "cache lookup");
                    guard.release().await;
                    return Ok(value);
                }

                let outcome = timed_compute(compute).await;
                if let Ok(value) = &outcome {
                    self.write(key, value, policy.ttl).await;
                }
                guard.release().await;
                outcome
            }
            LockAttempt::Contended => {
                counter!(METRIC_CACHE_LOCK_CONTENDED).increment(1);
                for attempt in 1..=self.poll_attempts {
                    tokio::time::sleep(self.poll_interval).await;
                    if let Some(value) = self.read::<T>(key).await {
                        counter!(METRIC_CACHE_HIT).increment(1);
                        debug!(
                            target: SOURCE,
                            cache_key = %key,
                            attempt,
                            result = "hit_after_poll",
                            "cache lookup"
                        );
                        return Ok(value);
                    }
                }

                counter!(METRIC_CACHE_FALLBACK).increment(1);
                debug!(
                    target: SOURCE,
                    cache_key = %key,
                    attempts = self.poll_attempts,
                    "lock holder did not backfill in time; computing directly"
                );
                let outcome = timed_compute(compute).await;
                if let Ok(value) = &outcome {
                    self.write(key, value, policy.ttl).await;
                }
                outcome
            }
            LockAttempt::Unavailable => {
                // Polling a failing backend only adds latency.
                counter!(METRIC_CACHE_FALLBACK).increment(1);
                timed_compute(compute).await
            }
        }
    }

    async fn guarded<R>(
        &self,
        op: &'static str,
        operation: impl Future<Output = Result<R, CacheError>>,
    ) -> Result<R, CacheError> {
        guarded(self.op_timeout, op, operation).await
    }

    async fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.guarded("get", self.client.get(key.as_str())).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(err) => {
                    note_fault(key, "decode", &CacheError::Codec(err.to_string()));
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                note_fault(key, "get", &err);
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                note_fault(key, "encode", &CacheError::Codec(err.to_string()));
                return;
            }
        };
        if let Err(err) = self
            .guarded("set", self.client.set(key.as_str(), &bytes, ttl))
            .await
        {
            counter!(METRIC_CACHE_ERROR).increment(1);
            warn!(
                target: SOURCE,
                cache_key = %key,
                backend = self.client.backend_name(),
                op = "set",
                error = %err,
                "cache backfill failed"
            );
        }
    }

    async fn try_lock(&self, key: &CacheKey, lock_ttl: Duration) -> LockAttempt {
        let lock_key = key.lock_key();
        let token = Uuid::new_v4().simple().to_string();
        match self
            .guarded(
                "set_if_absent",
                self.client.set_if_absent(&lock_key, &token, lock_ttl),
            )
            .await
        {
            Ok(true) => LockAttempt::Acquired(LockGuard {
                client: Arc::clone(&self.client),
                key: lock_key,
                token,
                op_timeout: self.op_timeout,
                released: false,
            }),
            Ok(false) => LockAttempt::Contended,
            Err(err) => {
                note_fault(key, "set_if_absent", &err);
                LockAttempt::Unavailable
            }
        }
    }
}

async fn guarded<R>(
    op_timeout: Duration,
    op: &'static str,
    operation: impl Future<Output = Result<R, CacheError>>,
) -> Result<R, CacheError> {
    match tokio::time::timeout(op_timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout { op }),
    }
}

async fn timed_compute<T, E, F, Fut>(compute: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let outcome = compute().await;
    histogram!(METRIC_STORE_COMPUTE_MS).record(started.elapsed().as_secs_f64() * 1000.0);
    outcome
}

fn note_fault(key: &CacheKey, op: &'static str, err: &CacheError) {
    counter!(METRIC_CACHE_ERROR).increment(1);
    debug!(
        target: SOURCE,
        cache_key = %key,
        op,
        error = %err,
        "cache operation failed; treating as miss"
    );
}

/// Owns a held backfill lock.
///
/// Dropping an unreleased guard (the resolving future was cancelled) spawns
/// the release onto the current runtime; the lock TTL covers the rest.
struct LockGuard {
    client: Arc<dyn CacheClient>,
    key: String,
    token: String,
    op_timeout: Duration,
    released: bool,
}

impl LockGuard {
    async fn release(mut self) {
        self.released = true;
        release_lock(
            self.client.as_ref(),
            &self.key,
            &self.token,
            self.op_timeout,
        )
        .await;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = Arc::clone(&self.client);
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        let op_timeout = self.op_timeout;
        runtime.spawn(async move {
            release_lock(client.as_ref(), &key, &token, op_timeout).await;
        });
    }
}

async fn release_lock(client: &dyn CacheClient, key: &str, token: &str, op_timeout: Duration) {
    match guarded(
        op_timeout,
        "delete_if_equals",
        client.delete_if_equals(key, token),
    )
    .await
    {
        Ok(true) => {}
        Ok(false) => {
            debug!(target: SOURCE, lock_key = key, "lock expired or changed hands before release");
        }
        Err(err) => {
            counter!(METRIC_CACHE_ERROR).increment(1);
            warn!(
                target: SOURCE,
                lock_key = key,
                backend = client.backend_name(),
                error = %err,
                "lock release failed; it will expire by TTL"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use tokio::sync::Notify;

    use super::*;
    use crate::cache::memory::MemoryCache;

    fn policy() -> ResolvePolicy {
        ResolvePolicy {
            ttl: Duration::from_secs(5),
            lock_ttl: Duration::from_millis(500),
        }
    }

    fn gateway_over(client: Arc<dyn CacheClient>) -> CacheGateway {
        CacheGateway::new(client, &CacheConfig::default())
    }

    /// Every operation fails; the gateway must behave as if nothing was cached.
    struct FailingCache;

    #[async_trait]
    impl CacheClient for FailingCache {
        fn backend_name(&self) -> &'static str {
            "failing"
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::backend("connection refused"))
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::backend("connection refused"))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::backend("connection refused"))
        }

        async fn set_if_absent(
            &self,
            _key: &str,
            _token: &str,
            _ttl: Duration,
        ) -> Result<bool, CacheError> {
            Err(CacheError::backend("connection refused"))
        }

        async fn delete_if_equals(&self, _key: &str, _token: &str) -> Result<bool, CacheError> {
            Err(CacheError::backend("connection refused"))
        }
    }

    /// Never answers within any budget.
    struct StalledCache;

    #[async_trait]
    impl CacheClient for StalledCache {
        fn backend_name(&self) -> &'static str {
            "stalled"
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            futures::future::pending().await
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
            futures::future::pending().await
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            futures::future::pending().await
        }

        async fn set_if_absent(
            &self,
            _key: &str,
            _token: &str,
            _ttl: Duration,
        ) -> Result<bool, CacheError> {
            futures::future::pending().await
        }

        async fn delete_if_equals(&self, _key: &str, _token: &str) -> Result<bool, CacheError> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn miss_computes_and_backfills_then_hits() {
        let cache = Arc::new(MemoryCache::new());
        let gateway = gateway_over(cache.clone());
        let key = CacheKey::video_detail(1);
        let calls = &AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<String, ()> = gateway
                .resolve(&key, policy(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("fresh".to_string())
                })
                .await;
            assert_eq!(value, Ok("fresh".to_string()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains_key("video:detail:id=1"));
        assert!(!cache.contains_key("lock:video:detail:id=1"));
    }

    #[tokio::test]
    async fn compute_errors_propagate_and_are_not_cached() {
        let cache = Arc::new(MemoryCache::new());
        let gateway = gateway_over(cache.clone());
        let key = CacheKey::video_detail(2);

        let outcome: Result<String, &str> = gateway
            .resolve(&key, policy(), || async { Err("store down") })
            .await;

        assert_eq!(outcome, Err("store down"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set("video:detail:id=3", b"not json", Duration::from_secs(5))
            .await
            .expect("seed");
        let gateway = gateway_over(cache.clone());

        let value: Result<u32, ()> = gateway
            .resolve(&CacheKey::video_detail(3), policy(), || async { Ok(7) })
            .await;

        assert_eq!(value, Ok(7));
        assert_eq!(
            cache.get("video:detail:id=3").await.expect("get"),
            Some(b"7".to_vec())
        );
    }

    #[tokio::test]
    async fn failing_backend_degrades_to_direct_compute() {
        let gateway = gateway_over(Arc::new(FailingCache));
        let calls = &AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<u32, ()> = gateway
                .resolve(&CacheKey::video_detail(4), policy(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(11)
                })
                .await;
            assert_eq!(value, Ok(11));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_is_bounded_by_op_timeout() {
        let gateway = gateway_over(Arc::new(StalledCache));
        let started = tokio::time::Instant::now();

        let value: Result<u32, ()> = gateway
            .resolve(&CacheKey::video_detail(5), policy(), || async { Ok(1) })
            .await;

        assert_eq!(value, Ok(1));
        // One timed-out read, one timed-out lock attempt, then straight to the store.
        assert!(started.elapsed() <= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn disabled_cache_computes_every_time_without_polling() {
        let gateway = CacheGateway::disabled();
        let calls = &AtomicUsize::new(0);
        let started = Instant::now();

        for _ in 0..3 {
            let value: Result<u32, ()> = gateway
                .resolve(&CacheKey::video_detail(6), policy(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(3)
                })
                .await;
            assert_eq!(value, Ok(3));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cold_callers_share_one_value() {
        const CALLERS: usize = 16;
        let cache = Arc::new(MemoryCache::new());
        let gateway = gateway_over(cache.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(CALLERS);
        for _ in 0..CALLERS {
            let gateway = gateway.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                gateway
                    .resolve(&CacheKey::video_detail(7), policy(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, ()>(vec![1_i64, 2, 3])
                    })
                    .await
            }));
        }

        for handle in handles {
            let value = handle.await.expect("task joined");
            assert_eq!(value, Ok(vec![1, 2, 3]));
        }
        let computed = calls.load(Ordering::SeqCst);
        assert!((1..=CALLERS).contains(&computed), "computed {computed} times");
    }

    #[tokio::test(start_paused = true)]
    async fn contended_caller_falls_back_after_polls() {
        let cache = Arc::new(MemoryCache::new());
        let key = CacheKey::video_detail(8);
        // Someone else holds the lock and never backfills.
        cache
            .set_if_absent(&key.lock_key(), "other", Duration::from_secs(2))
            .await
            .expect("seed lock");
        let gateway = gateway_over(cache.clone());
        let started = tokio::time::Instant::now();

        let value: Result<u32, ()> = gateway.resolve(&key, policy(), || async { Ok(9) }).await;

        assert_eq!(value, Ok(9));
        assert!(started.elapsed() >= Duration::from_millis(100));
        // The fallback backfills but leaves the foreign lock alone.
        assert!(cache.contains_key(key.as_str()));
        assert!(cache.contains_key(&key.lock_key()));

        let calls = &AtomicUsize::new(0);
        let again: Result<u32, ()> = gateway
            .resolve(&key, policy(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .await;
        assert_eq!(again, Ok(9));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn contended_caller_picks_up_backfill_while_polling() {
        let cache = Arc::new(MemoryCache::new());
        let key = CacheKey::video_detail(9);
        cache
            .set_if_absent(&key.lock_key(), "other", Duration::from_secs(2))
            .await
            .expect("seed lock");

        let writer = Arc::clone(&cache);
        let backfill_key = key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer
                .set(backfill_key.as_str(), b"42", Duration::from_secs(5))
                .await
                .expect("backfill");
        });

        let gateway = gateway_over(cache.clone());
        let calls = &AtomicUsize::new(0);
        let value: Result<u32, ()> = gateway
            .resolve(&key, policy(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .await;

        assert_eq!(value, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_resolve_releases_its_lock() {
        let cache = Arc::new(MemoryCache::new());
        let gateway = gateway_over(cache.clone());
        let key = CacheKey::video_detail(10);
        let entered = Arc::new(Notify::new());

        let task = {
            let gateway = gateway.clone();
            let key = key.clone();
            let entered = Arc::clone(&entered);
            tokio::spawn(async move {
                let _: Result<u32, ()> = gateway
                    .resolve(&key, policy(), || async move {
                        entered.notify_one();
                        futures::future::pending().await
                    })
                    .await;
            })
        };

        entered.notified().await;
        assert!(cache.contains_key(&key.lock_key()));
        task.abort();
        let _ = task.await;

        for _ in 0..50 {
            if !cache.contains_key(&key.lock_key()) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!cache.contains_key(&key.lock_key()));
    }

    #[test]
    fn records_hit_and_miss_metrics() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let cache = Arc::new(MemoryCache::new());
        let gateway = gateway_over(cache);
        let key = CacheKey::video_detail(11);

        metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .expect("runtime");
            runtime.block_on(async {
                for _ in 0..2 {
                    let _: Result<u32, ()> =
                        gateway.resolve(&key, policy(), || async { Ok(1) }).await;
                }
            });
        });

        let mut hits = 0;
        let mut misses = 0;
        let mut acquired = 0;
        for (composite, _, _, value) in snapshotter.snapshot().into_vec() {
            if let DebugValue::Counter(count) = value {
                match composite.key().name() {
                    METRIC_CACHE_HIT => hits += count,
                    METRIC_CACHE_MISS => misses += count,
                    METRIC_CACHE_LOCK_ACQUIRED => acquired += count,
                    _ => {}
                }
            }
        }
        assert_eq!((hits, misses, acquired), (1, 1, 1));
    }
}
