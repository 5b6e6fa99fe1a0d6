use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "static_export_cache_hit_total",
            Unit::Count,
            "Total number of export cache hits, labelled by cache."
        );
        describe_counter!(
            "static_export_cache_miss_total",
            Unit::Count,
            "Total number of export cache misses, labelled by cache."
        );
        describe_counter!(
            "static_export_files_written_total",
            Unit::Count,
            "Total number of files written into export folders."
        );
        describe_counter!(
            "static_export_files_purged_total",
            Unit::Count,
            "Total number of exported files removed by scrubbing."
        );
        describe_counter!(
            "static_export_publish_abandoned_total",
            Unit::Count,
            "Publish-triggered exports abandoned while another export was running."
        );
        describe_gauge!(
            "static_export_busy",
            Unit::Count,
            "1 while a scrub or export holds the busy flag."
        );
        describe_histogram!(
            "static_export_scrub_ms",
            Unit::Milliseconds,
            "Scrub latency per publish in milliseconds."
        );
        describe_histogram!(
            "static_export_export_ms",
            Unit::Milliseconds,
            "Export latency per batch in milliseconds."
        );
    });
}
