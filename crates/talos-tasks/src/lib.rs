//! # Talos Tasks
//!
//! Recurring job scheduling for Talos.
//!
//! The [`Scheduler`] keeps a table of named jobs, each with a cron
//! expression, and checks it on a fixed tick. Due jobs are started on
//! detached tokio tasks. The application uses it to fire auxiliary
//! operations that declare a schedule, but any async closure can be
//! registered.
//!
//! ```rust,no_run
//! use talos_tasks::{Scheduler, SchedulerConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scheduler = Scheduler::with_config(
//!         SchedulerConfig::new().with_tick_interval(Duration::from_millis(250)),
//!     );
//!
//!     // Run at midnight
//!     scheduler.register("daily-report", "0 0 0 * * *", || async {
//!         tracing::info!("generating daily report");
//!     }).unwrap();
//!
//!     scheduler.start().unwrap();
//!
//!     // ... run your application ...
//!
//!     scheduler.stop().await;
//! }
//! ```
//!
//! ## Cron Expression Format
//!
//! The cron format follows standard 6-field syntax:
//!
//! ```text
//! ┌───────────── second (0 - 59)
//! │ ┌───────────── minute (0 - 59)
//! │ │ ┌───────────── hour (0 - 23)
//! │ │ │ ┌───────────── day of month (1 - 31)
//! │ │ │ │ ┌───────────── month (1 - 12)
//! │ │ │ │ │ ┌───────────── day of week (0 - 6)
//! │ │ │ │ │ │
//! * * * * * *
//! ```
//!
//! Examples:
//! - `0 * * * * *` - Every minute
//! - `0 0 * * * *` - Every hour
//! - `0 0 0 * * *` - Every day at midnight
//! - `0 30 9 * * 1-5` - 9:30 AM on weekdays

#![warn(missing_docs)]

mod error;
mod scheduler;

pub use error::{TaskError, TaskResult};
pub use scheduler::{parse_cron, JobFn, JobId, JobInfo, Scheduler, SchedulerConfig};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{TaskError, TaskResult};
    pub use crate::scheduler::{JobId, JobInfo, Scheduler, SchedulerConfig};
}
