//! Call-log sinks
//!
//! The governor emits one [`CallLogEntry`] per dispatch attempt. These sinks
//! turn the stream into structured log events and rolling metrics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pacegate_core::CallLogSink;
use pacegate_domain::CallLogEntry;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::observability::{MetricsError, MetricsResult};

/// Ring buffer capacity for response-time samples
const MAX_SAMPLES: usize = 1000;

/* -------------------------------------------------------------------------- */
/* Tracing sink */
/* -------------------------------------------------------------------------- */

/// Writes every entry as a structured `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCallLogSink;

impl CallLogSink for TracingCallLogSink {
    fn emit(&self, entry: CallLogEntry) {
        let status = entry.status_code.map(i64::from).unwrap_or(-1);
        match &entry.error {
            None => info!(
                target: "pacegate::calls",
                api = %entry.api,
                endpoint = %entry.endpoint,
                method = %entry.method,
                status,
                response_time_ms = entry.response_time_ms,
                owner_id = %entry.owner_id,
                "provider call"
            ),
            Some(error) => warn!(
                target: "pacegate::calls",
                api = %entry.api,
                endpoint = %entry.endpoint,
                method = %entry.method,
                status,
                response_time_ms = entry.response_time_ms,
                owner_id = %entry.owner_id,
                error = %error,
                "provider call failed"
            ),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Metrics sink */
/* -------------------------------------------------------------------------- */

/// Aggregated counters for diagnostics endpoints
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CallStatsSnapshot {
    pub total_calls: usize,
    pub error_calls: usize,
    pub rate_limited_calls: usize,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

/// Counts calls and keeps the last 1000 response times for percentiles
#[derive(Debug)]
pub struct CallMetricsSink {
    total_calls: AtomicUsize,
    error_calls: AtomicUsize,
    rate_limited_calls: AtomicUsize,
    response_times: Mutex<VecDeque<u64>>,
}

impl Default for CallMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CallMetricsSink {
    pub fn new() -> Self {
        Self {
            total_calls: AtomicUsize::new(0),
            error_calls: AtomicUsize::new(0),
            rate_limited_calls: AtomicUsize::new(0),
            response_times: Mutex::new(VecDeque::with_capacity(MAX_SAMPLES)),
        }
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Get P50 (median) response time in milliseconds
    ///
    /// Returns `MetricsError::EmptyData` if no samples recorded.
    pub fn p50_ms(&self) -> MetricsResult<u64> {
        self.percentile(0.50, "P50")
    }

    pub fn p95_ms(&self) -> MetricsResult<u64> {
        self.percentile(0.95, "P95")
    }

    pub fn p99_ms(&self) -> MetricsResult<u64> {
        self.percentile(0.99, "P99")
    }

    pub fn snapshot(&self) -> CallStatsSnapshot {
        CallStatsSnapshot {
            total_calls: self.total_calls(),
            error_calls: self.error_calls.load(Ordering::SeqCst),
            rate_limited_calls: self.rate_limited_calls.load(Ordering::SeqCst),
            p50_ms: self.p50_ms().ok(),
            p95_ms: self.p95_ms().ok(),
            p99_ms: self.p99_ms().ok(),
        }
    }

    /// Nearest-rank percentile over a sorted copy of the samples
    fn percentile(&self, percentile: f64, metric: &'static str) -> MetricsResult<u64> {
        let mut sorted: Vec<u64> = self.response_times.lock().iter().copied().collect();
        if sorted.is_empty() {
            return Err(MetricsError::EmptyData { metric });
        }
        sorted.sort_unstable();
        let rank = ((sorted.len() as f64) * percentile).ceil() as usize;
        let index = rank.saturating_sub(1).min(sorted.len() - 1);
        Ok(sorted[index])
    }
}

impl CallLogSink for CallMetricsSink {
    fn emit(&self, entry: CallLogEntry) {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if entry.is_error() {
            self.error_calls.fetch_add(1, Ordering::SeqCst);
        }
        if entry.status_code == Some(429) {
            self.rate_limited_calls.fetch_add(1, Ordering::SeqCst);
        }

        let mut samples = self.response_times.lock();
        samples.push_back(entry.response_time_ms);
        if samples.len() > MAX_SAMPLES {
            samples.pop_front();
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Fan-out */
/* -------------------------------------------------------------------------- */

/// Forwards each entry to every inner sink
#[derive(Default, Clone)]
pub struct FanoutCallLogSink {
    sinks: Vec<Arc<dyn CallLogSink>>,
}

impl FanoutCallLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn CallLogSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl CallLogSink for FanoutCallLogSink {
    fn emit(&self, entry: CallLogEntry) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(entry.clone());
            }
            last.emit(entry);
        }
    }
}
