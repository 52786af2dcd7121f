//! Pipelines: one compiled middleware chain per operation.
//!
//! A pipeline starts as a [`PipelineBuilder`], which knows its operation and
//! the service that owns it. [`PipelineBuilder::compile`] consumes the
//! builder and produces a [`Pipeline`], which is immutable and may be run
//! concurrently from any number of tasks.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use http::Method;
//! use talos_core::{Context, Endpoint, Operation, OutcomeKind, Service, Watchdog};
//! use talos_pipeline::Pipeline;
//!
//! # tokio_test::block_on(async {
//! let service = Arc::new(
//!     Service::builder("orders", "/orders")
//!         .endpoint(
//!             Endpoint::builder("/")
//!                 .method(Method::GET)
//!                 .logic(|_ctx| async { Ok(()) }),
//!         )
//!         .build()
//!         .unwrap(),
//! );
//! let endpoint: Arc<dyn Operation> = service.endpoints()[0].clone();
//!
//! let pipeline = Pipeline::builder(Arc::clone(&service), endpoint)
//!     .compile(Arc::new(Watchdog::new()));
//!
//! let outcome = pipeline.run(Context::builder().build()).await;
//! assert_eq!(outcome, Some(OutcomeKind::Success));
//! # });
//! ```

use crate::chain::{collect_middleware, compile_chain, Chain};
use std::fmt;
use std::sync::Arc;
use talos_core::{Context, Operation, OutcomeKind, Service, SharedSupervisor};
use tracing::Instrument;

/// An operation waiting to have its chain compiled.
pub struct PipelineBuilder {
    service: Arc<Service>,
    operation: Arc<dyn Operation>,
}

impl PipelineBuilder {
    /// Pairs `operation` with the service it is mounted in.
    pub fn new(service: Arc<Service>, operation: Arc<dyn Operation>) -> Self {
        Self { service, operation }
    }

    /// The operation this pipeline will run.
    pub fn operation(&self) -> &Arc<dyn Operation> {
        &self.operation
    }

    /// Names of the middleware that will wrap the operation, outermost first.
    pub fn layer_names(&self) -> Vec<&'static str> {
        collect_middleware(self.operation.as_ref(), &self.service)
            .iter()
            .map(|m| m.name())
            .collect()
    }

    /// Compiles the chain. Faults are reported to `supervisor`.
    pub fn compile(self, supervisor: SharedSupervisor) -> Pipeline {
        let layer_names = self.layer_names();
        let chain = compile_chain(
            Arc::clone(&self.operation),
            &self.service,
            Arc::clone(&supervisor),
        );
        tracing::debug!(
            operation = self.operation.identify(),
            service = self.service.slug(),
            layers = layer_names.len(),
            "pipeline compiled"
        );
        Pipeline {
            chain,
            operation: self.operation,
            service: self.service,
            supervisor,
            layer_names,
        }
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("operation", &self.operation.identify())
            .field("service", &self.service.slug())
            .finish()
    }
}

/// A compiled pipeline.
pub struct Pipeline {
    chain: Chain,
    operation: Arc<dyn Operation>,
    service: Arc<Service>,
    supervisor: SharedSupervisor,
    layer_names: Vec<&'static str>,
}

impl Pipeline {
    /// Starts a pipeline for `operation` mounted in `service`.
    pub fn builder(service: Arc<Service>, operation: Arc<dyn Operation>) -> PipelineBuilder {
        PipelineBuilder::new(service, operation)
    }

    /// Runs the chain once for `ctx`.
    ///
    /// Returns the recorded outcome, or `None` when a middleware stopped the
    /// chain before the operation was applied.
    pub async fn run(&self, ctx: Arc<Context>) -> Option<OutcomeKind> {
        ctx.bind_service(&self.service);
        let span = ctx.span().clone();
        span.record("operation", self.operation.identify());
        span.record("service", self.service.slug());

        (self.chain)(Arc::clone(&ctx)).instrument(span).await;
        ctx.outcome()
    }

    /// The operation this pipeline runs.
    pub fn operation(&self) -> &Arc<dyn Operation> {
        &self.operation
    }

    /// The owning service.
    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// The supervisor faults are reported to.
    pub fn supervisor(&self) -> &SharedSupervisor {
        &self.supervisor
    }

    /// Middleware names in execution order.
    pub fn layer_names(&self) -> &[&'static str] {
        &self.layer_names
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("operation", &self.operation.identify())
            .field("service", &self.service.slug())
            .field("layers", &self.layer_names)
            .finish_non_exhaustive()
    }
}
