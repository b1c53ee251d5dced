//! Observability metrics for run orchestration.
//!
//! Exposed via the `metrics` crate facade; a host installs whatever recorder
//! it wants (Prometheus, statsd, none).
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `capsa_run_runs_created_total` | Counter | - | Runs created after successful validation |
//! | `capsa_run_validation_failures_total` | Counter | `kind` | Rejected run requests by failure kind |
//! | `capsa_run_dispatches_total` | Counter | `result` | Runner enqueue outcomes |
//! | `capsa_run_input_bytes_total` | Counter | - | Input file bytes staged to storage |
//! | `capsa_run_create_duration_seconds` | Histogram | - | Run creation latency (validation through commit) |

use std::time::Duration;

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: runs created after successful validation.
    pub const RUNS_CREATED_TOTAL: &str = "capsa_run_runs_created_total";
    /// Counter: rejected run requests by failure kind.
    pub const VALIDATION_FAILURES_TOTAL: &str = "capsa_run_validation_failures_total";
    /// Counter: runner enqueue outcomes.
    pub const DISPATCHES_TOTAL: &str = "capsa_run_dispatches_total";
    /// Counter: input file bytes staged to storage.
    pub const INPUT_BYTES_TOTAL: &str = "capsa_run_input_bytes_total";
    /// Histogram: run creation latency in seconds.
    pub const CREATE_DURATION_SECONDS: &str = "capsa_run_create_duration_seconds";
}

/// Label keys used across metrics.
pub mod labels {
    /// Validation failure kind (`unknown_parameter`, `missing_parameter`,
    /// `unknown_input_file`, `invalid_port`).
    pub const KIND: &str = "kind";
    /// Dispatch result (`enqueued`, `deduplicated`, `failed`).
    pub const RESULT: &str = "result";
}

/// High-level interface for recording orchestration metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    _private: (),
}

impl RunMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a run created after successful validation.
    pub fn record_run_created(&self) {
        counter!(names::RUNS_CREATED_TOTAL).increment(1);
    }

    /// Records a rejected run request.
    pub fn record_validation_failure(&self, kind: &str) {
        counter!(
            names::VALIDATION_FAILURES_TOTAL,
            labels::KIND => kind.to_string(),
        )
        .increment(1);
    }

    /// Records a runner enqueue outcome.
    pub fn record_dispatch(&self, result: &str) {
        counter!(
            names::DISPATCHES_TOTAL,
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }

    /// Records input bytes staged to storage.
    pub fn record_input_bytes(&self, bytes: u64) {
        counter!(names::INPUT_BYTES_TOTAL).increment(bytes);
    }

    /// Records run creation latency.
    pub fn observe_create_duration(&self, duration: Duration) {
        histogram!(names::CREATE_DURATION_SECONDS).record(duration.as_secs_f64());
    }
}
