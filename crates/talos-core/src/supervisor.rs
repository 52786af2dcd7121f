//! Fault dispatch.
//!
//! Every non-success outcome, plus the two routing failures that happen
//! before any operation is chosen, is reported to a [`Supervisor`]. The
//! default supervisor is [`Watchdog`].

use crate::context::Context;
use crate::error::{ErrorCategory, ErrorEnvelope, ServiceError};
use crate::operation::Operation;
use crate::outcome::Outcome;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use std::sync::Arc;
use talos_telemetry::metrics::record_fault;

/// Fault kind labels, as used in logs and metrics.
pub mod kinds {
    /// No route matched the request path.
    pub const ROUTE_NOT_FOUND: &str = "route_not_found";
    /// A route matched but not with the request method.
    pub const METHOD_NOT_ALLOWED: &str = "method_not_allowed";
    /// The operation is not offered in the current environment.
    pub const UNAVAILABLE: &str = "unavailable";
    /// The operation exceeded its deadline.
    pub const TIMEOUT: &str = "timeout";
    /// The operation raised a business error or an unexpected fault.
    pub const FAULT: &str = "fault";
}

/// Receives every fault the runtime observes.
///
/// Implementations must be cheap and must not block. They run on the
/// invoking task, after the business logic has finished or been abandoned.
pub trait Supervisor: Send + Sync + 'static {
    /// No route matched the request path.
    fn route_not_found(&self, ctx: &Context);

    /// The path matched but the method did not.
    fn method_not_allowed(&self, ctx: &Context);

    /// The operation is not offered in the context's environment.
    fn operation_unavailable(&self, ctx: &Context, operation: &dyn Operation);

    /// The operation's deadline elapsed before the logic finished.
    fn operation_timed_out(&self, ctx: &Context, operation: &dyn Operation);

    /// The logic raised an error or faulted unexpectedly.
    fn operation_faulted(&self, ctx: &Context, operation: &dyn Operation, error: &ServiceError);
}

/// Shared, type-erased supervisor.
pub type SharedSupervisor = Arc<dyn Supervisor>;

/// Routes an outcome to the matching supervisor method. Success is ignored.
pub fn dispatch(
    supervisor: &dyn Supervisor,
    ctx: &Context,
    operation: &dyn Operation,
    outcome: &Outcome,
) {
    match outcome {
        Outcome::Success => {}
        Outcome::Unavailable => supervisor.operation_unavailable(ctx, operation),
        Outcome::Timeout { .. } => supervisor.operation_timed_out(ctx, operation),
        Outcome::BusinessError(error) | Outcome::UnexpectedFault(error) => {
            supervisor.operation_faulted(ctx, operation, error);
        }
    }
}

/// The default supervisor.
///
/// Logs each fault, counts it in `talos_faults_total`, and for network
/// contexts writes a JSON [`ErrorEnvelope`] unless a response is already
/// present.
#[derive(Debug, Clone, Default)]
pub struct Watchdog {
    _private: (),
}

impl Watchdog {
    /// Creates the default supervisor.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    fn respond(ctx: &Context, status: StatusCode, envelope: &ErrorEnvelope) {
        if !ctx.is_network() || ctx.has_response() {
            return;
        }
        let body = match serde_json::to_vec(envelope) {
            Ok(body) => body,
            Err(error) => {
                tracing::error!(parent: ctx.span(), %error, "failed to encode error envelope");
                Vec::new()
            }
        };
        let mut response = http::Response::new(Bytes::from(body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        ctx.respond(response);
    }

    fn describe_request(ctx: &Context) -> String {
        ctx.request().map_or_else(
            || String::from("internal invocation"),
            |request| format!("{} {}", request.method(), request.uri().path()),
        )
    }
}

impl Supervisor for Watchdog {
    fn route_not_found(&self, ctx: &Context) {
        let target = Self::describe_request(ctx);
        tracing::info!(parent: ctx.span(), request = %target, "no route matched");
        record_fault(kinds::ROUTE_NOT_FOUND);

        let id = ctx.id().to_string();
        let envelope = ServiceError::not_found(format!("no route for {target}")).to_envelope(Some(&id));
        Self::respond(ctx, StatusCode::NOT_FOUND, &envelope);
    }

    fn method_not_allowed(&self, ctx: &Context) {
        let target = Self::describe_request(ctx);
        tracing::info!(parent: ctx.span(), request = %target, "method not allowed");
        record_fault(kinds::METHOD_NOT_ALLOWED);

        let id = ctx.id().to_string();
        let envelope = ErrorEnvelope::new(
            ErrorCategory::MethodNotAllowed,
            format!("method not allowed for {target}"),
            Some(&id),
        );
        Self::respond(ctx, StatusCode::METHOD_NOT_ALLOWED, &envelope);
    }

    fn operation_unavailable(&self, ctx: &Context, operation: &dyn Operation) {
        tracing::info!(
            parent: ctx.span(),
            operation = operation.identify(),
            environment = ctx.environment(),
            "operation unavailable in this environment"
        );
        record_fault(kinds::UNAVAILABLE);

        let id = ctx.id().to_string();
        let envelope = ErrorEnvelope::new(
            ErrorCategory::Unavailable,
            format!("{} is not available", operation.identify()),
            Some(&id),
        );
        Self::respond(ctx, StatusCode::SERVICE_UNAVAILABLE, &envelope);
    }

    fn operation_timed_out(&self, ctx: &Context, operation: &dyn Operation) {
        let deadline_ms = operation.deadline().as_millis() as u64;
        tracing::warn!(
            parent: ctx.span(),
            operation = operation.identify(),
            deadline_ms,
            "operation timed out"
        );
        record_fault(kinds::TIMEOUT);

        let id = ctx.id().to_string();
        let envelope = ErrorEnvelope::new(
            ErrorCategory::Timeout,
            format!("{} exceeded its {deadline_ms}ms deadline", operation.identify()),
            Some(&id),
        );
        Self::respond(ctx, StatusCode::GATEWAY_TIMEOUT, &envelope);
    }

    fn operation_faulted(&self, ctx: &Context, operation: &dyn Operation, error: &ServiceError) {
        tracing::error!(
            parent: ctx.span(),
            operation = operation.identify(),
            category = ?error.category(),
            error = %error,
            "operation faulted"
        );
        record_fault(kinds::FAULT);

        let id = ctx.id().to_string();
        Self::respond(ctx, error.status_code(), &error.to_envelope(Some(&id)));
    }
}
