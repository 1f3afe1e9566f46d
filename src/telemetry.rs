use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::app::AppError;
use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Log lines go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), AppError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| AppError::telemetry(format!("failed to install tracing subscriber: {err}")))
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "turnover_cache_hit_total",
            Unit::Count,
            "Total number of fresh response-cache reads."
        );
        describe_counter!(
            "turnover_cache_miss_total",
            Unit::Count,
            "Total number of response-cache reads that found nothing usable."
        );
        describe_counter!(
            "turnover_cache_stale_hit_total",
            Unit::Count,
            "Total number of stale entries served while a refresh runs."
        );
        describe_counter!(
            "turnover_cache_invalidate_total",
            Unit::Count,
            "Total number of cache entries removed by invalidation."
        );
        describe_counter!(
            "turnover_cache_sweep_evict_total",
            Unit::Count,
            "Total number of expired cache entries removed by the sweeper."
        );
        describe_counter!(
            "turnover_session_refresh_total",
            Unit::Count,
            "Total number of successful access-token refreshes."
        );
        describe_counter!(
            "turnover_session_refresh_failed_total",
            Unit::Count,
            "Total number of failed access-token refreshes."
        );
    });
}
