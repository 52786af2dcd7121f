//! # Talos Pipeline
//!
//! Middleware chain compilation and compiled pipelines for Talos.
//!
//! Each operation gets one [`Pipeline`]. Its chain is compiled once, during
//! assembly, from the owning service's middleware (when the operation
//! inherits it) followed by the operation's own middleware:
//!
//! ```text
//! service mw → operation mw → terminal(apply → supervisor → on_fault)
//! ```
//!
//! The first middleware declared is the outermost. A middleware that does
//! not call `next` stops everything inside it, including the operation.
//!
//! ## Modules
//!
//! - [`chain`] - The chain compiler and its terminal layer
//! - [`pipeline`] - [`PipelineBuilder`] and the compiled [`Pipeline`]
//! - [`stages`] - Stock middleware

#![doc(html_root_url = "https://docs.rs/talos-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod pipeline;
pub mod stages;

pub use chain::{compile_chain, Chain};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use stages::{ContextIdMiddleware, TelemetryMiddleware};
