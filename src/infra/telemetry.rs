use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for the read-path metrics with whatever recorder
/// the host installed.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "vidfeed_cache_hit_total",
            Unit::Count,
            "Cache lookups answered from the cache, including hits found while polling."
        );
        describe_counter!(
            "vidfeed_cache_miss_total",
            Unit::Count,
            "Cache lookups that found no usable entry."
        );
        describe_counter!(
            "vidfeed_cache_lock_acquired_total",
            Unit::Count,
            "Backfill locks acquired after a miss."
        );
        describe_counter!(
            "vidfeed_cache_lock_contended_total",
            Unit::Count,
            "Misses that found another caller already holding the backfill lock."
        );
        describe_counter!(
            "vidfeed_cache_fallback_total",
            Unit::Count,
            "Store reads made without the lock after polling ran out or the backend failed."
        );
        describe_counter!(
            "vidfeed_cache_error_total",
            Unit::Count,
            "Cache operations that failed, timed out or held undecodable payloads."
        );
        describe_counter!(
            "vidfeed_cache_evict_total",
            Unit::Count,
            "Entries evicted by mutation hooks."
        );
        describe_histogram!(
            "vidfeed_store_compute_ms",
            Unit::Milliseconds,
            "Latency of store reads made on behalf of the cache gateway."
        );
    });
}
