//! Error types for scheduling.

use std::fmt;
use thiserror::Error;

/// Result type for scheduler operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors that can occur while registering or running jobs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron {
        /// The rejected expression.
        expression: String,
        /// What the parser reported.
        reason: String,
    },

    /// No job is registered under the given ID.
    #[error("job not found: {0}")]
    NotFound(String),

    /// `start` was called on a running scheduler.
    #[error("scheduler already running")]
    AlreadyRunning,

    /// Invalid scheduler configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TaskError {
    /// Create an invalid cron error.
    pub fn invalid_cron(expression: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::InvalidCron {
            expression: expression.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a not found error.
    pub fn not_found(id: impl fmt::Display) -> Self {
        Self::NotFound(id.to_string())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TaskError::invalid_cron("* * *", "too few fields");
        assert_eq!(
            err.to_string(),
            "invalid cron expression '* * *': too few fields"
        );
        assert_eq!(TaskError::not_found("job-1").to_string(), "job not found: job-1");
        assert_eq!(TaskError::AlreadyRunning.to_string(), "scheduler already running");
    }

    #[test]
    fn test_invalid_config() {
        assert_eq!(
            TaskError::invalid_config("tick interval must be non-zero"),
            TaskError::InvalidConfig("tick interval must be non-zero".into())
        );
    }
}
