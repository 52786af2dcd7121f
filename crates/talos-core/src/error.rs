//! Error types for Talos.
//!
//! [`ServiceError`] is the structured fault business logic raises. It knows its
//! [`ErrorCategory`], the HTTP status that category maps to, and how to render
//! itself as an [`ErrorEnvelope`] for network callers.
//!
//! [`AssemblyError`] covers mistakes made while declaring services and
//! operations. Those are reported before anything runs.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`ServiceError`].
pub type ServiceResult<T> = Result<T, ServiceError>;

/// What a piece of business logic returns.
pub type OperationResult = ServiceResult<()>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid input.
    Validation,
    /// Invalid or missing credentials.
    Authentication,
    /// Permission denied.
    Authorization,
    /// Resource not found.
    NotFound,
    /// The request could not be routed with the method it used.
    MethodNotAllowed,
    /// Conflict (e.g., concurrent modification).
    Conflict,
    /// The operation is not offered in the current environment.
    Unavailable,
    /// The operation exceeded its deadline.
    Timeout,
    /// Internal errors reported by business logic.
    Internal,
    /// Downstream service failures.
    External,
    /// Unanticipated faults such as panics inside business logic.
    Fault,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal | Self::Fault => StatusCode::INTERNAL_SERVER_ERROR,
            Self::External => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable code used in error envelopes.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Authorization => "AUTHORIZATION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::Conflict => "CONFLICT",
            Self::Unavailable => "UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
            Self::External => "EXTERNAL_SERVICE_ERROR",
            Self::Fault => "UNEXPECTED_FAULT",
        }
    }
}

/// Standard error type for Talos business logic.
///
/// # Example
///
/// ```
/// use talos_core::{ServiceError, ErrorCategory};
///
/// fn check_quantity(quantity: u32) -> Result<(), ServiceError> {
///     if quantity == 0 {
///         return Err(ServiceError::validation("quantity must be positive"));
///     }
///     Ok(())
/// }
///
/// let err = check_quantity(0).unwrap_err();
/// assert_eq!(err.category(), ErrorCategory::Validation);
/// ```
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
        /// The offending field, when known.
        field: Option<String>,
    },

    /// Authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Authorization denied.
    #[error("Authorization denied: {message}")]
    Authorization {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
        /// The type of resource that was not found.
        resource_type: Option<String>,
        /// The identifier of the resource.
        resource_id: Option<String>,
    },

    /// Conflict error (e.g., concurrent modification).
    #[error("Conflict: {message}")]
    Conflict {
        /// Human-readable error message.
        message: String,
    },

    /// A dependency the operation needs is not currently available.
    #[error("Unavailable: {message}")]
    Unavailable {
        /// Human-readable error message.
        message: String,
    },

    /// Work timed out.
    #[error("Timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// External service error.
    #[error("External service error: {message}")]
    External {
        /// Human-readable error message.
        message: String,
        /// The name of the external service.
        service: Option<String>,
    },

    /// An unanticipated fault, such as a panic, escaped business logic.
    #[error("Unexpected fault: {description}")]
    Fault {
        /// Description of what went wrong.
        description: String,
    },
}

impl ServiceError {
    /// Creates a validation error with a message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Creates a validation error pointing at a specific field.
    #[must_use]
    pub fn validation_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            resource_type: None,
            resource_id: None,
        }
    }

    /// Creates a not found error with resource context.
    #[must_use]
    pub fn not_found_resource(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        Self::NotFound {
            message: format!("{resource_type} with ID '{resource_id}' not found"),
            resource_type: Some(resource_type),
            resource_id: Some(resource_id),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an external service error.
    #[must_use]
    pub fn external(message: impl Into<String>, service: Option<impl Into<String>>) -> Self {
        Self::External {
            message: message.into(),
            service: service.map(Into::into),
        }
    }

    /// Creates an unexpected fault.
    #[must_use]
    pub fn fault(description: impl Into<String>) -> Self {
        Self::Fault {
            description: description.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization { .. } => ErrorCategory::Authorization,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Unavailable { .. } => ErrorCategory::Unavailable,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::External { .. } => ErrorCategory::External,
            Self::Fault { .. } => ErrorCategory::Fault,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, context_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.category().code().to_string(),
                message: self.to_string(),
                category: self.category(),
                details: self.error_details(),
            },
            context_id: context_id.map(ToString::to_string),
        }
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            Self::NotFound {
                resource_type: Some(rt),
                resource_id: Some(rid),
                ..
            } => Some(serde_json::json!({
                "resource_type": rt,
                "resource_id": rid
            })),
            Self::External {
                service: Some(svc), ..
            } => Some(serde_json::json!({ "service": svc })),
            _ => None,
        }
    }
}

/// Serializable error envelope for network responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The context ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl ErrorEnvelope {
    /// Builds an envelope that is not backed by a [`ServiceError`].
    #[must_use]
    pub fn new(
        category: ErrorCategory,
        message: impl Into<String>,
        context_id: Option<&str>,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: category.code().to_string(),
                message: message.into(),
                category,
                details: None,
            },
            context_id: context_id.map(ToString::to_string),
        }
    }
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Mistakes in how services and operations were declared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// A slug contains characters other than letters, digits, `-` or `_`.
    #[error("invalid slug '{0}': only letters, digits, '-' and '_' are allowed")]
    InvalidSlug(String),

    /// A service was declared without a mount prefix.
    #[error("service '{0}' has no mount prefix")]
    MissingPrefix(String),

    /// An operation was declared without business logic.
    #[error("operation '{0}' has no business logic")]
    MissingLogic(String),

    /// An endpoint was declared without any HTTP method.
    #[error("endpoint '{0}' declares no HTTP methods")]
    MissingMethods(String),

    /// Two endpoints claim the same method and path.
    #[error("route {method} {path} is mounted twice")]
    DuplicateRoute {
        /// The HTTP method.
        method: String,
        /// The full mounted path.
        path: String,
    },

    /// Two services share a slug.
    #[error("service '{0}' is declared twice")]
    DuplicateService(String),

    /// Two auxiliary operations in one service share a slug.
    #[error("auxiliary operation '{aux}' is declared twice in service '{service}'")]
    DuplicateAux {
        /// The owning service.
        service: String,
        /// The duplicated auxiliary slug.
        aux: String,
    },

    /// A deadline of zero was configured.
    #[error("operation '{0}' has a zero deadline")]
    ZeroDeadline(String),
}

/// Returns `true` when `slug` is a non-empty run of letters, digits, `-` or `_`.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let error = ServiceError::validation("quantity must be positive");
        assert_eq!(error.category(), ErrorCategory::Validation);
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert!(error.to_string().contains("quantity must be positive"));
    }

    #[test]
    fn test_validation_field_details() {
        let error = ServiceError::validation_field("email", "not an address");
        let envelope = error.to_envelope(Some("ctx-1"));
        let details = envelope.error.details.expect("field details");
        assert_eq!(details["field"], "email");
    }

    #[test]
    fn test_not_found_resource() {
        let error = ServiceError::not_found_resource("Order", "order-9");
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert!(error.to_string().contains("order-9"));
    }

    #[test]
    fn test_internal_error_keeps_source() {
        let io = std::io::Error::other("disk full");
        let error = ServiceError::internal_with_source("write failed", io);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_fault_category() {
        let error = ServiceError::fault("panic: boom");
        assert_eq!(error.category(), ErrorCategory::Fault);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.to_string().contains("boom"));
    }

    #[test]
    fn test_error_envelope_serialization() {
        let error = ServiceError::not_found("no such order");
        let envelope = error.to_envelope(Some("ctx-456"));

        let json = serde_json::to_string(&envelope).expect("serialization should work");
        assert!(json.contains("\"code\":\"NOT_FOUND\""));
        assert!(json.contains("\"context_id\":\"ctx-456\""));
        assert!(json.contains("\"category\":\"not_found\""));
    }

    #[test]
    fn test_plain_envelope_skips_details() {
        let envelope = ErrorEnvelope::new(ErrorCategory::MethodNotAllowed, "use POST", None);
        let json = serde_json::to_string(&envelope).expect("serialization should work");
        assert!(json.contains("METHOD_NOT_ALLOWED"));
        assert!(!json.contains("details"));
        assert!(!json.contains("context_id"));
    }

    #[test]
    fn test_all_error_categories_have_status_codes() {
        let categories = [
            ErrorCategory::Validation,
            ErrorCategory::Authentication,
            ErrorCategory::Authorization,
            ErrorCategory::NotFound,
            ErrorCategory::MethodNotAllowed,
            ErrorCategory::Conflict,
            ErrorCategory::Unavailable,
            ErrorCategory::Timeout,
            ErrorCategory::Internal,
            ErrorCategory::External,
            ErrorCategory::Fault,
        ];

        for category in categories {
            let status = category.default_status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "Category {:?} should map to error status code, got {}",
                category,
                status
            );
        }
    }

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("orders"));
        assert!(is_valid_slug("order-service_2"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("orders service"));
        assert!(!is_valid_slug("orders/list"));
    }
}
