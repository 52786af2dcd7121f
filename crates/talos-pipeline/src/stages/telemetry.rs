//! Telemetry middleware.
//!
//! Wraps the rest of the chain with an in-flight gauge and emits one
//! structured event when the chain finishes.
//!
//! # Metrics Emitted
//!
//! - `talos_in_flight_invocations` - raised for the duration of the chain
//!
//! Per-outcome counters and latency histograms are recorded by the terminal
//! layer, so they are present even without this middleware.
//!
//! # Log Format
//!
//! The event is emitted inside the invocation span and carries:
//! - `operation` and `service` - from the span
//! - `outcome` - the outcome label, or `short_circuited`
//! - `duration_ms` - time since the context was created

use std::sync::Arc;
use talos_core::{BoxFuture, Context, Middleware, Next};
use talos_telemetry::logging::fields;
use talos_telemetry::metrics::InFlightGuard;

/// Label used when a middleware stopped the chain.
pub const SHORT_CIRCUITED: &str = "short_circuited";

/// Telemetry middleware that emits a completion event for every invocation.
#[derive(Debug, Clone, Default)]
pub struct TelemetryMiddleware {
    verbose: bool,
}

impl TelemetryMiddleware {
    /// Creates the middleware. Completion events are logged at `debug`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs completion events at `info` instead of `debug`.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether completion events are logged at `info`.
    #[must_use]
    pub const fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// The label reported for a finished chain.
fn outcome_label(ctx: &Context) -> &'static str {
    ctx.outcome().map_or(SHORT_CIRCUITED, |kind| kind.as_str())
}

impl Middleware for TelemetryMiddleware {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn process<'a>(&'a self, ctx: Arc<Context>, next: Next) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let _in_flight = InFlightGuard::new();
            next.run(Arc::clone(&ctx)).await;

            let outcome = outcome_label(&ctx);
            let duration_ms = ctx.elapsed().as_millis() as u64;
            if self.verbose {
                tracing::info!(
                    { fields::OUTCOME } = outcome,
                    { fields::DURATION_MS } = duration_ms,
                    { fields::ENVIRONMENT } = ctx.environment(),
                    "invocation finished"
                );
            } else {
                tracing::debug!(
                    { fields::OUTCOME } = outcome,
                    { fields::DURATION_MS } = duration_ms,
                    "invocation finished"
                );
            }
        })
    }
}
