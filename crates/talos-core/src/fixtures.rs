//! Test fixtures for Talos development and testing.
//!
//! Ready-made business logic, a supervisor that records what it was told,
//! and a middleware trail for asserting execution order.
//!
//! # Example
//!
//! ```
//! use talos_core::fixtures::{self, Trail};
//! use talos_core::Endpoint;
//!
//! let trail = Trail::new();
//! let endpoint = Endpoint::builder("/ping")
//!     .method(http::Method::GET)
//!     .layer(trail.marker("outer"))
//!     .with_logic(fixtures::succeed())
//!     .build()
//!     .unwrap();
//! # let _ = endpoint;
//! ```

use crate::context::Context;
use crate::error::{OperationResult, ServiceError};
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::operation::{logic, Logic, Operation};
use crate::supervisor::Supervisor;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Logic that succeeds immediately.
#[must_use]
pub fn succeed() -> Logic {
    logic(|_ctx| async { Ok(()) })
}

/// Logic that returns the error built by `make`.
pub fn fail_with<F>(make: F) -> Logic
where
    F: Fn() -> ServiceError + Send + Sync + 'static,
{
    let make = Arc::new(make);
    logic(move |_ctx| {
        let error = make();
        async move { Err(error) }
    })
}

/// Logic that raises the error built by `make` as a panic payload.
pub fn raise<F>(make: F) -> Logic
where
    F: Fn() -> ServiceError + Send + Sync + 'static,
{
    let make = Arc::new(make);
    logic(move |_ctx| {
        let error = make();
        async move { raise_now(error) }
    })
}

fn raise_now(error: ServiceError) -> OperationResult {
    std::panic::panic_any(error)
}

/// Logic that panics with a string message.
#[must_use]
pub fn panic_with(message: &'static str) -> Logic {
    logic(move |_ctx| async move { panic_now(message) })
}

fn panic_now(message: &'static str) -> OperationResult {
    std::panic::panic_any(message)
}

/// Logic that sleeps, then stores `value` in the context under `key`.
#[must_use]
pub fn sleep_then_store(delay: Duration, key: &'static str, value: &'static str) -> Logic {
    logic(move |ctx: Arc<Context>| async move {
        tokio::time::sleep(delay).await;
        ctx.storage().insert(key, value);
        Ok(())
    })
}

/// One call observed by a [`RecordingSupervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCall {
    /// `route_not_found`.
    RouteNotFound,
    /// `method_not_allowed`.
    MethodNotAllowed,
    /// `operation_unavailable`, with the operation identity.
    Unavailable(String),
    /// `operation_timed_out`, with the operation identity.
    TimedOut(String),
    /// `operation_faulted`, with the operation identity and error message.
    Faulted {
        /// The operation identity.
        operation: String,
        /// The error's display text.
        error: String,
    },
}

/// A supervisor that only records calls.
#[derive(Debug, Default)]
pub struct RecordingSupervisor {
    calls: Mutex<Vec<SupervisorCall>>,
}

impl RecordingSupervisor {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared recorder.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Calls seen so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<SupervisorCall> {
        self.calls.lock().clone()
    }

    fn push(&self, call: SupervisorCall) {
        self.calls.lock().push(call);
    }
}

impl Supervisor for RecordingSupervisor {
    fn route_not_found(&self, _ctx: &Context) {
        self.push(SupervisorCall::RouteNotFound);
    }

    fn method_not_allowed(&self, _ctx: &Context) {
        self.push(SupervisorCall::MethodNotAllowed);
    }

    fn operation_unavailable(&self, _ctx: &Context, operation: &dyn Operation) {
        self.push(SupervisorCall::Unavailable(operation.identify().to_string()));
    }

    fn operation_timed_out(&self, _ctx: &Context, operation: &dyn Operation) {
        self.push(SupervisorCall::TimedOut(operation.identify().to_string()));
    }

    fn operation_faulted(&self, _ctx: &Context, operation: &dyn Operation, error: &ServiceError) {
        self.push(SupervisorCall::Faulted {
            operation: operation.identify().to_string(),
            error: error.to_string(),
        });
    }
}

/// Shared, ordered record of which middleware ran.
#[derive(Debug, Clone, Default)]
pub struct Trail {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Trail {
    /// Creates an empty trail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A middleware that appends `name` to the trail, then continues.
    #[must_use]
    pub fn marker(&self, name: &'static str) -> BoxedMiddleware {
        Arc::new(Marker {
            name,
            trail: self.clone(),
            proceed: true,
        })
    }

    /// A middleware that appends `name` to the trail and stops the chain.
    #[must_use]
    pub fn gate(&self, name: &'static str) -> BoxedMiddleware {
        Arc::new(Marker {
            name,
            trail: self.clone(),
            proceed: false,
        })
    }

    /// Logic that appends `name` to the trail.
    #[must_use]
    pub fn logic(&self, name: &'static str) -> Logic {
        let trail = self.clone();
        logic(move |_ctx| {
            trail.push(name);
            async { Ok(()) }
        })
    }

    /// Appends an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Entries so far, in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

struct Marker {
    name: &'static str,
    trail: Trail,
    proceed: bool,
}

impl Middleware for Marker {
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(&'a self, ctx: Arc<Context>, next: Next) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.trail.push(self.name);
            if self.proceed {
                next.run(ctx).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trail_marker_order() {
        let trail = Trail::new();
        let inner = trail.marker("inner");
        let terminal = trail.logic("logic");
        let ctx = Context::builder().build();

        let layer: crate::Layer = Arc::new(move |ctx: Arc<Context>| -> BoxFuture<'static, ()> {
            let terminal = Arc::clone(&terminal);
            Box::pin(async move {
                let _ = terminal(ctx).await;
            })
        });
        inner.process(ctx, Next::new(layer)).await;

        assert_eq!(trail.entries(), vec!["inner", "logic"]);
    }

    #[tokio::test]
    async fn test_gate_stops() {
        let trail = Trail::new();
        let gate = trail.gate("gate");
        let seen = trail.clone();
        let layer: crate::Layer = Arc::new(move |_ctx: Arc<Context>| -> BoxFuture<'static, ()> {
            seen.push("unreachable");
            Box::pin(async {})
        });
        gate.process(Context::builder().build(), Next::new(layer)).await;
        assert_eq!(trail.entries(), vec!["gate"]);
    }

    #[test]
    fn test_recording_supervisor() {
        let supervisor = RecordingSupervisor::new();
        let ctx = Context::builder().build();
        supervisor.route_not_found(&ctx);
        supervisor.method_not_allowed(&ctx);
        assert_eq!(
            supervisor.calls(),
            vec![SupervisorCall::RouteNotFound, SupervisorCall::MethodNotAllowed]
        );
    }
}
