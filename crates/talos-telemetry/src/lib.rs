//! Observability for Talos.
//!
//! - **Logging**: structured JSON or pretty output via `tracing-subscriber`
//! - **Metrics**: Prometheus-format metrics via the `metrics` crate
//!
//! # Example
//!
//! ```rust,ignore
//! use talos_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .service_name("billing")
//!     .environment("production")
//!     .build();
//!
//! init_telemetry(&config)?;
//! ```
//!
//! # Metrics Output
//!
//! ```text
//! # HELP talos_invocations_total Total number of completed operation invocations
//! # TYPE talos_invocations_total counter
//! talos_invocations_total{operation="GET /orders",outcome="success"} 1234
//! talos_invocations_total{operation="GET /orders",outcome="timeout"} 3
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, render_metrics, InFlightGuard, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        metrics = config.metrics.enabled,
        "telemetry initialized"
    );
    Ok(())
}
