//! The five ways an invocation can end.

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result of running one operation through the bounded invoker.
#[derive(Debug)]
pub enum Outcome {
    /// Business logic completed normally.
    Success,
    /// The operation is not offered in the context's environment. Logic never ran.
    Unavailable,
    /// The deadline elapsed first. The logic may still be running, detached.
    Timeout {
        /// The deadline that was exceeded.
        deadline: Duration,
    },
    /// Business logic reported a structured error.
    BusinessError(ServiceError),
    /// Something unanticipated escaped business logic.
    UnexpectedFault(ServiceError),
}

impl Outcome {
    /// Returns the payload-free discriminant.
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success => OutcomeKind::Success,
            Self::Unavailable => OutcomeKind::Unavailable,
            Self::Timeout { .. } => OutcomeKind::Timeout,
            Self::BusinessError(_) => OutcomeKind::BusinessError,
            Self::UnexpectedFault(_) => OutcomeKind::UnexpectedFault,
        }
    }

    /// Returns `true` for [`Outcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// The error carried by a business error or an unexpected fault.
    #[must_use]
    pub const fn error(&self) -> Option<&ServiceError> {
        match self {
            Self::BusinessError(error) | Self::UnexpectedFault(error) => Some(error),
            _ => None,
        }
    }
}

/// The discriminant of an [`Outcome`], cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// See [`Outcome::Success`].
    Success,
    /// See [`Outcome::Unavailable`].
    Unavailable,
    /// See [`Outcome::Timeout`].
    Timeout,
    /// See [`Outcome::BusinessError`].
    BusinessError,
    /// See [`Outcome::UnexpectedFault`].
    UnexpectedFault,
}

impl OutcomeKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::BusinessError => "business_error",
            Self::UnexpectedFault => "unexpected_fault",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
