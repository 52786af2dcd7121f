//! Main configuration types.
//!
//! This module provides the top-level [`TalosConfig`] struct and its builder.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use talos_core::OperationDefaults;
use talos_telemetry::{LogConfig, MetricsConfig as TelemetryMetricsConfig, TelemetryConfig};

use crate::{
    ApplicationConfig, ConfigError, LogFormat, LoggingConfig, MetricsConfig, OperationsConfig,
    SchedulerConfig,
};

fn environment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("valid regex"))
}

/// Complete Talos application configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use talos_config::TalosConfig;
///
/// let config = TalosConfig::default();
/// assert_eq!(config.application.environment, "development");
/// assert_eq!(config.operations.default_deadline_ms, 30_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TalosConfig {
    /// Application settings.
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Defaults for operations.
    #[serde(default)]
    pub operations: OperationsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl TalosConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> TalosConfigBuilder {
        TalosConfigBuilder::new()
    }

    /// Trims and lowercases the environment name.
    pub fn normalize(&mut self) {
        self.application.environment = self.application.environment.trim().to_lowercase();
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if:
    /// - the environment is empty or not alphanumeric
    /// - the default deadline is zero
    /// - the scheduler tick interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !environment_pattern().is_match(&self.application.environment) {
            return Err(ConfigError::invalid_value(
                "application.environment",
                format!(
                    "'{}' must be non-empty and alphanumeric",
                    self.application.environment
                ),
            ));
        }

        if self.operations.default_deadline_ms == 0 {
            return Err(ConfigError::invalid_value(
                "operations.default_deadline_ms",
                "must be greater than zero",
            ));
        }

        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "scheduler.tick_interval_ms",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Defaults handed to endpoint and aux builders.
    #[must_use]
    pub fn operation_defaults(&self) -> OperationDefaults {
        OperationDefaults {
            deadline: Duration::from_millis(self.operations.default_deadline_ms),
        }
    }

    /// Scheduler tick interval.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_interval_ms)
    }

    /// Logging section as a subscriber configuration.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            json_format: self.logging.format == LogFormat::Json,
            span_events: self.logging.span_events,
            file_line_info: self.logging.include_location,
            include_target: true,
        }
    }

    /// Telemetry configuration for the named application.
    #[must_use]
    pub fn telemetry_config(&self, service_name: &str) -> TelemetryConfig {
        let metrics = if self.metrics.enabled {
            TelemetryMetricsConfig::default()
        } else {
            TelemetryMetricsConfig::disabled()
        };

        TelemetryConfig::builder()
            .service_name(service_name)
            .environment(&self.application.environment)
            .logging(self.log_config())
            .metrics(metrics)
            .build()
    }

    /// Preset for local development: pretty debug logs, metrics off.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                span_events: true,
                include_location: true,
                ..Default::default()
            },
            metrics: MetricsConfig { enabled: false },
            ..Default::default()
        }
    }

    /// Preset for production: JSON logs at info.
    #[must_use]
    pub fn production() -> Self {
        Self {
            application: ApplicationConfig {
                environment: "production".to_string(),
            },
            ..Default::default()
        }
    }
}

/// Builder for [`TalosConfig`].
#[derive(Debug, Default)]
pub struct TalosConfigBuilder {
    config: TalosConfig,
}

impl TalosConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the environment.
    #[must_use]
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.config.application.environment = environment.into();
        self
    }

    /// Set the default operation deadline.
    #[must_use]
    pub fn default_deadline(mut self, deadline: Duration) -> Self {
        self.config.operations.default_deadline_ms = deadline.as_millis() as u64;
        self
    }

    /// Set the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Set the metrics section.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsConfig) -> Self {
        self.config.metrics = metrics;
        self
    }

    /// Set the scheduler section.
    #[must_use]
    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.config.scheduler = scheduler;
        self
    }

    /// Build the configuration without validation.
    #[must_use]
    pub fn build(mut self) -> TalosConfig {
        self.config.normalize();
        self.config
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build_validated(self) -> Result<TalosConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
