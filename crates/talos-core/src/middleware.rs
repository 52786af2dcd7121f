//! Core middleware trait and types.
//!
//! A [`Middleware`] wraps everything that runs after it. It receives the
//! shared [`Context`] and a [`Next`] handle for the rest of the chain, and
//! decides whether and when to continue.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use talos_core::{BoxFuture, Context, Middleware, Next};
//!
//! struct Audit;
//!
//! impl Middleware for Audit {
//!     fn name(&self) -> &'static str {
//!         "audit"
//!     }
//!
//!     fn process<'a>(&'a self, ctx: Arc<Context>, next: Next) -> BoxFuture<'a, ()> {
//!         Box::pin(async move {
//!             tracing::info!(context_id = %ctx.id(), "entering");
//!             next.run(ctx).await;
//!         })
//!     }
//! }
//! ```

use crate::context::Context;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One compiled layer of a chain: takes the context and runs to completion.
pub type Layer = Arc<dyn Fn(Arc<Context>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The core middleware trait.
///
/// # Invariants
///
/// - Calling `next.run()` at most once continues the chain
/// - Not calling it short-circuits every layer below, including the operation
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this middleware, used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Process the invocation through this middleware.
    fn process<'a>(&'a self, ctx: Arc<Context>, next: Next) -> BoxFuture<'a, ()>;
}

/// Handle to the remainder of the chain.
///
/// Consumed by [`Next::run`], so it can only be continued once.
pub struct Next {
    inner: Layer,
}

impl Next {
    /// Wraps the layer that runs after the current middleware.
    pub fn new(inner: Layer) -> Self {
        Self { inner }
    }

    /// Runs the rest of the chain.
    pub async fn run(self, ctx: Arc<Context>) {
        (self.inner)(ctx).await;
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// A middleware built from an async closure.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use talos_core::{Context, FnMiddleware, Middleware, Next};
///
/// let timing = FnMiddleware::new("timing", |ctx: Arc<Context>, next: Next| async move {
///     let started = std::time::Instant::now();
///     next.run(ctx).await;
///     tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "done");
/// })
/// .boxed();
///
/// assert_eq!(timing.name(), "timing");
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Creates a new function-based middleware.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }

    /// Boxes the middleware for storage in a chain.
    pub fn boxed(self) -> BoxedMiddleware
    where
        Self: Middleware,
    {
        Arc::new(self)
    }
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Arc<Context>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(&'a self, ctx: Arc<Context>, next: Next) -> BoxFuture<'a, ()> {
        Box::pin((self.func)(ctx, next))
    }
}
