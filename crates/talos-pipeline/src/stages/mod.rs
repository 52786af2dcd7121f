//! Stock middleware.
//!
//! - [`context_id`] - Stamps network responses with the context ID
//! - [`telemetry`] - In-flight gauge and completion events
//!
//! Neither is installed automatically. Add them to a service or operation
//! like any other middleware.

pub mod context_id;
pub mod telemetry;

pub use context_id::{ContextIdMiddleware, CONTEXT_ID_HEADER};
pub use telemetry::TelemetryMiddleware;
