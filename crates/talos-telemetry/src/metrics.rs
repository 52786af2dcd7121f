//! Prometheus metrics for Talos.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `talos_invocations_total` | Counter | `operation`, `outcome` | Completed invocations |
//! | `talos_invocation_duration_seconds` | Histogram | `operation` | Invocation latency |
//! | `talos_in_flight_invocations` | Gauge | - | Invocations currently running |
//! | `talos_faults_total` | Counter | `kind` | Faults seen by the supervisor |
//! | `talos_scheduled_runs_total` | Counter | `job` | Cron-triggered job runs |
//!
//! Recording functions are no-ops until [`init_metrics`] installs a recorder.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Completed invocations.
    pub const INVOCATIONS_TOTAL: &str = "talos_invocations_total";
    /// Invocation latency.
    pub const INVOCATION_DURATION: &str = "talos_invocation_duration_seconds";
    /// Invocations currently running.
    pub const IN_FLIGHT: &str = "talos_in_flight_invocations";
    /// Faults seen by the supervisor.
    pub const FAULTS_TOTAL: &str = "talos_faults_total";
    /// Cron-triggered job runs.
    pub const SCHEDULED_RUNS_TOTAL: &str = "talos_scheduled_runs_total";
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Histogram buckets for invocation duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ],
        }
    }
}

impl MetricsConfig {
    /// A configuration that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// Disabled configs are a no-op. Metrics are exposed through
/// [`render_metrics`]; no listener is started.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }
    if config.duration_buckets.is_empty() {
        return Err(TelemetryError::InvalidConfig(
            "duration_buckets must not be empty".to_string(),
        ));
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::INVOCATION_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(
        names::INVOCATIONS_TOTAL,
        "Total number of completed operation invocations"
    );
    describe_histogram!(
        names::INVOCATION_DURATION,
        "Operation invocation duration in seconds"
    );
    describe_gauge!(
        names::IN_FLIGHT,
        "Number of invocations currently inside a pipeline"
    );
    describe_counter!(
        names::FAULTS_TOTAL,
        "Total faults reported to the supervisor, by kind"
    );
    describe_counter!(
        names::SCHEDULED_RUNS_TOTAL,
        "Total cron-triggered job runs"
    );
}

/// Records a completed invocation.
pub fn record_invocation(operation: &str, outcome: &'static str, duration: Duration) {
    counter!(
        names::INVOCATIONS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        names::INVOCATION_DURATION,
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Counts one fault of the given kind.
pub fn record_fault(kind: &'static str) {
    counter!(names::FAULTS_TOTAL, "kind" => kind).increment(1);
}

/// Counts one scheduled run of `job`.
pub fn record_scheduled_run(job: &str) {
    counter!(names::SCHEDULED_RUNS_TOTAL, "job" => job.to_string()).increment(1);
}

/// Keeps `talos_in_flight_invocations` raised while alive.
///
/// The gauge is lowered on drop, including during unwinding.
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Raises the gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(names::IN_FLIGHT).decrement(1.0);
    }
}
