//! Typed configuration for Talos applications.
//!
//! Configuration is layered: built-in defaults, then an optional TOML or
//! JSON file, then `TALOS__SECTION__KEY` environment variables. Unknown
//! fields in files are rejected.
//!
//! # Example
//!
//! ```no_run
//! use talos_config::ConfigLoader;
//!
//! # fn main() -> Result<(), talos_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("talos.toml")?
//!     .with_default_env()
//!     .load()?;
//!
//! println!("running in {}", config.application.environment);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [application]
//! environment = "production"
//!
//! [operations]
//! default_deadline_ms = 30000
//!
//! [logging]
//! enabled = true
//! level = "info"
//! format = "json"
//!
//! [metrics]
//! enabled = true
//!
//! [scheduler]
//! enabled = true
//! tick_interval_ms = 1000
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TALOS__APPLICATION__ENVIRONMENT` | `application.environment` |
//! | `TALOS__OPERATIONS__DEFAULT_DEADLINE_MS` | `operations.default_deadline_ms` |
//! | `TALOS__LOGGING__ENABLED` | `logging.enabled` |
//! | `TALOS__LOGGING__LEVEL` | `logging.level` |
//! | `TALOS__LOGGING__FORMAT` | `logging.format` |
//! | `TALOS__LOGGING__SPAN_EVENTS` | `logging.span_events` |
//! | `TALOS__LOGGING__INCLUDE_LOCATION` | `logging.include_location` |
//! | `TALOS__METRICS__ENABLED` | `metrics.enabled` |
//! | `TALOS__SCHEDULER__ENABLED` | `scheduler.enabled` |
//! | `TALOS__SCHEDULER__TICK_INTERVAL_MS` | `scheduler.tick_interval_ms` |
//!
//! Booleans accept `true/false`, `1/0`, `yes/no` and `on/off`.

mod config;
mod error;
mod loader;
mod schema;

pub use config::{TalosConfig, TalosConfigBuilder};
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    ApplicationConfig, LogFormat, LoggingConfig, MetricsConfig, OperationsConfig, SchedulerConfig,
};
