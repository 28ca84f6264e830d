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

pub const CACHE_HIT_TOTAL: &str = "cachegate_cache_hit_total";
pub const CACHE_MISS_TOTAL: &str = "cachegate_cache_miss_total";
pub const CACHE_STORE_ERROR_TOTAL: &str = "cachegate_cache_store_error_total";
pub const CACHE_WRITE_ERROR_TOTAL: &str = "cachegate_cache_write_error_total";
pub const CACHE_CODEC_ERROR_TOTAL: &str = "cachegate_cache_codec_error_total";
pub const UPSTREAM_FETCH_MS: &str = "cachegate_upstream_fetch_ms";

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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            CACHE_HIT_TOTAL,
            Unit::Count,
            "Total number of requests served from the store."
        );
        describe_counter!(
            CACHE_MISS_TOTAL,
            Unit::Count,
            "Total number of lookups that fell through to the upstream."
        );
        describe_counter!(
            CACHE_STORE_ERROR_TOTAL,
            Unit::Count,
            "Total number of store reads that failed and were treated as misses."
        );
        describe_counter!(
            CACHE_WRITE_ERROR_TOTAL,
            Unit::Count,
            "Total number of cache writes that failed after a successful upstream fetch."
        );
        describe_counter!(
            CACHE_CODEC_ERROR_TOTAL,
            Unit::Count,
            "Total number of cached values discarded because they could not be decoded."
        );
        describe_histogram!(
            UPSTREAM_FETCH_MS,
            Unit::Milliseconds,
            "Upstream fetch latency in milliseconds."
        );
    });
}
