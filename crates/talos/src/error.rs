//! Application-level errors.

use talos_config::ConfigError;
use talos_core::AssemblyError;
use talos_tasks::TaskError;
use talos_telemetry::TelemetryError;
use thiserror::Error;

use crate::app::AppState;

/// Errors from assembling or running an [`App`](crate::App).
#[derive(Debug, Error)]
pub enum AppError {
    /// The application slug is empty or has characters other than
    /// letters, digits, `-` or `_`.
    #[error("invalid application slug '{0}'")]
    InvalidSlug(String),

    /// The application version is not a semantic version.
    #[error("invalid application version '{version}'")]
    InvalidVersion {
        /// The rejected version string.
        version: String,
        /// Why it did not parse.
        #[source]
        source: semver::Error,
    },

    /// A service or operation was declared incorrectly.
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    /// The configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A schedule was rejected or the scheduler failed to start.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Logging or metrics could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// No service has this slug.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// The service has no auxiliary operation with this slug.
    #[error("service '{service}' has no auxiliary operation '{aux}'")]
    UnknownAux {
        /// The service slug.
        service: String,
        /// The missing aux slug.
        aux: String,
    },

    /// A provider's setup hook failed.
    #[error("provider '{provider}' failed to set up")]
    Provider {
        /// The provider description.
        provider: String,
        /// What the hook returned.
        #[source]
        source: anyhow::Error,
    },

    /// A lifecycle transition was requested from the wrong state.
    #[error("cannot {action}: application is {state}")]
    Lifecycle {
        /// The requested transition.
        action: &'static str,
        /// The state the application was in.
        state: AppState,
    },
}

impl AppError {
    /// Create an unknown aux error.
    pub fn unknown_aux(service: impl Into<String>, aux: impl Into<String>) -> Self {
        Self::UnknownAux {
            service: service.into(),
            aux: aux.into(),
        }
    }

    /// Create an invalid version error.
    pub fn invalid_version(version: impl Into<String>, source: semver::Error) -> Self {
        Self::InvalidVersion {
            version: version.into(),
            source,
        }
    }

    /// Create a provider setup error.
    pub fn provider(provider: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Provider {
            provider: provider.into(),
            source,
        }
    }
}
