//! Observability infrastructure for logging and call metrics
//!
//! - [`init_tracing`] installs the process-wide `tracing` subscriber
//! - [`call_log`] holds the call-log sinks fed once per dispatch attempt
//!
//! Response-time samples use a `VecDeque` capped at 1000 entries for O(1)
//! eviction.

pub mod call_log;

use pacegate_domain::{LoggingConfig, PaceGateError};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub use call_log::{CallMetricsSink, CallStatsSnapshot, FanoutCallLogSink, TracingCallLogSink};

/// Metrics error type
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Empty data set - cannot calculate aggregate metric
    #[error("Empty data: cannot calculate {metric}")]
    EmptyData {
        /// Metric name that failed (e.g., "P95", "P50")
        metric: &'static str,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), PaceGateError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|err| PaceGateError::Config(format!("invalid log filter: {err}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|err| PaceGateError::Internal(format!("tracing already initialised: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_filter() {
        // Only reached when RUST_LOG is unset or itself invalid
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig { level: "pacegate=loudest".to_string(), json: false };
        assert!(matches!(init_tracing(&config), Err(PaceGateError::Config(_))));
    }

    #[test]
    fn second_initialisation_fails() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
