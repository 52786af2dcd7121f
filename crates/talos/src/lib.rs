//! # Talos
//!
//! **A supervised runtime for service operations.**
//!
//! Talos runs units of business logic, called operations, behind a
//! compiled middleware chain. Every invocation is bounded by a deadline
//! and isolated from faults, and every non-success outcome is reported
//! to a supervisor.
//!
//! - **Endpoints** answer HTTP exchanges, routed by method and path
//! - **Auxes** run at startup, at shutdown, on a cron schedule or on demand
//! - **Services** group operations under a prefix with shared middleware
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use talos::prelude::*;
//! use http::Method;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AppError> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("talos.toml")?
//!         .with_default_env()
//!         .load()?;
//!
//!     let app = App::builder("shop", env!("CARGO_PKG_VERSION"))
//!         .config(config)
//!         .service(
//!             Service::builder("orders", "/orders")
//!                 .middleware(ContextIdMiddleware::new())
//!                 .middleware(TelemetryMiddleware::new())
//!                 .endpoint(
//!                     Endpoint::builder("/")
//!                         .method(Method::GET)
//!                         .logic(|_ctx| async { Ok(()) }),
//!                 )
//!                 .aux(
//!                     Aux::builder("expire-carts")
//!                         .schedule("0 */5 * * * *")
//!                         .logic(|_ctx| async { Ok(()) }),
//!                 ),
//!         )
//!         .build()?;
//!
//!     app.install_telemetry()?;
//!     app.start().await?;
//!     // ... hand requests to `app.dispatch` ...
//!     app.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Invocation
//!
//! ```text
//! dispatch → MountTable → Pipeline::run
//!                            ↓
//!   service middleware → operation middleware → invoke (deadline race)
//!                                                   ↓
//!                       supervisor ← on_fault ← Outcome
//! ```

#![doc(html_root_url = "https://docs.rs/talos/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
mod error;
mod mount;
mod provider;

pub use app::{App, AppBuilder, AppState, AuxRun, LifecycleReport};
pub use error::AppError;
pub use mount::{join_path, MountTable, Resolution};
pub use provider::{Provider, ProviderHook};

pub use talos_config as config;
pub use talos_core as core;
pub use talos_pipeline as pipeline;
pub use talos_tasks as tasks;
pub use talos_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust
/// use talos::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{App, AppError, AppState, LifecycleReport, Provider, Resolution};

    pub use talos_config::{ConfigLoader, TalosConfig};
    pub use talos_core::{
        Availability, Aux, Context, Endpoint, Middleware, Next, Operation, OperationResult,
        Outcome, OutcomeKind, Service, ServiceError, ServiceResult, Supervisor, Watchdog,
    };
    pub use talos_pipeline::{ContextIdMiddleware, Pipeline, TelemetryMiddleware};
}
