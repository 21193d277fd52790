//! Logging setup built on `tracing-subscriber`.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Crates whose events are enabled by the default filter.
const MAPPING_CRATES: [&str; 2] = ["ngsi_core", "ngsi_observability"];

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level applied to the mapping crates when `RUST_LOG` is not set.
    pub level: Level,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json_format: bool,
    /// Log span open/close, which shows the per-level relationship fetches.
    pub include_spans: bool,
    pub include_location: bool,
    pub include_thread_ids: bool,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_spans: false,
            include_location: false,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Verbose output: every skipped attribute and batch fetch is visible.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            json_format: false,
            include_spans: true,
            include_location: true,
            include_thread_ids: true,
            include_target: true,
        }
    }

    /// JSON output for log aggregation.
    pub fn production() -> Self {
        Self {
            level: Level::WARN,
            json_format: true,
            include_spans: false,
            include_location: false,
            include_thread_ids: false,
            include_target: true,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    fn default_directives(&self) -> String {
        MAPPING_CRATES
            .iter()
            .map(|krate| format!("{krate}={}", self.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Installs the global subscriber with the default configuration.
pub fn init_logging() -> Result<(), TryInitError> {
    init_logging_with_config(LoggingConfig::default())
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init_logging_with_config(config: LoggingConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directives()));

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_target(config.include_target);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_target(config.include_target);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    }
}

/// Creates a span for mapping one entity into a domain type.
#[macro_export]
macro_rules! mapping_span {
    ($target:expr, $entity_id:expr) => {
        tracing::info_span!("ngsi_mapping", target = %$target, entity_id = %$entity_id)
    };
}

/// Creates a span for one batched relationship fetch.
#[macro_export]
macro_rules! fetch_span {
    ($batch_size:expr) => {
        tracing::debug_span!("relationship_fetch", batch_size = $batch_size)
    };
}
