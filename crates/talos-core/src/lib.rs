//! # Talos Core
//!
//! Core types and traits for the Talos service runtime.
//!
//! - [`Context`] - Per-invocation state: environment, span, storage, exchange
//! - [`Operation`] - Object-safe unit of business logic, with [`Endpoint`] and [`Aux`]
//! - [`Middleware`] - Layers that wrap operations
//! - [`invoke`](invoke::invoke) - Deadline-bounded, fault-isolated execution
//! - [`Supervisor`] - Receives every fault, with [`Watchdog`] as the default
//! - [`Service`] - Groups operations under a prefix and shared middleware
//! - [`ServiceError`] - Standard error type

#![doc(html_root_url = "https://docs.rs/talos-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
pub mod fixtures;
pub mod invoke;
mod middleware;
mod operation;
mod outcome;
mod service;
mod storage;
pub mod supervisor;

pub use context::{Context, ContextBuilder, ContextId, DEFAULT_ENVIRONMENT};
pub use error::{
    is_valid_slug, AssemblyError, ErrorCategory, ErrorDetail, ErrorEnvelope, OperationResult,
    ServiceError, ServiceResult,
};
pub use middleware::{BoxFuture, BoxedMiddleware, FnMiddleware, Layer, Middleware, Next};
pub use operation::{
    logic, report_fault, Availability, Aux, AuxBuilder, Endpoint, EndpointBuilder, FaultHook,
    Logic, Operation, OperationDefaults, DEFAULT_DEADLINE,
};
pub use outcome::{Outcome, OutcomeKind};
pub use service::{Service, ServiceBuilder};
pub use storage::StorageMap;
pub use supervisor::{SharedSupervisor, Supervisor, Watchdog};
