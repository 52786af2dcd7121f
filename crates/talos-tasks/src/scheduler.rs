//! Cron-based job scheduler.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use talos_telemetry::metrics::record_scheduled_run;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};

/// Type alias for async job functions.
pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Parses a 6-field cron expression (seconds first).
pub fn parse_cron(expression: &str) -> TaskResult<Schedule> {
    expression
        .parse()
        .map_err(|e: cron::error::Error| TaskError::invalid_cron(expression, e))
}

/// Unique identifier for a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a new unique job ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Information about a scheduled job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    /// Job ID.
    pub id: JobId,
    /// Job name.
    pub name: String,
    /// Cron expression.
    pub cron: String,
    /// Whether the job is enabled.
    pub enabled: bool,
    /// When the most recent run started.
    pub last_run: Option<DateTime<Utc>>,
    /// Next scheduled run time.
    pub next_run: Option<DateTime<Utc>>,
    /// Number of finished runs, failed ones included.
    pub run_count: u64,
    /// Number of runs that panicked.
    pub fail_count: u64,
}

struct JobEntry {
    info: RwLock<JobInfo>,
    schedule: Schedule,
    func: JobFn,
}

type JobTable = Arc<DashMap<JobId, Arc<JobEntry>>>;

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the loop checks for due jobs.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// Cron-based job scheduler.
///
/// Jobs run on their own detached tasks. A job that is still running when its
/// next tick comes due is started again alongside the first.
///
/// ```rust,no_run
/// use talos_tasks::Scheduler;
///
/// # async fn demo() -> talos_tasks::TaskResult<()> {
/// let scheduler = Scheduler::new();
/// scheduler.register("compact", "0 */5 * * * *", || async {
///     tracing::info!("compacting");
/// })?;
///
/// scheduler.start()?;
/// // ...
/// scheduler.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    jobs: JobTable,
    running: AtomicBool,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    total_executed: Arc<AtomicU64>,
}

impl Scheduler {
    /// Create a new scheduler with default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a new scheduler with custom configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            jobs: Arc::new(DashMap::new()),
            running: AtomicBool::new(false),
            shutdown_tx: Mutex::new(None),
            loop_handle: Mutex::new(None),
            total_executed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Check if the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get the number of registered jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Get the number of runs started so far.
    pub fn total_executed(&self) -> u64 {
        self.total_executed.load(Ordering::Relaxed)
    }

    /// Register a new scheduled job.
    ///
    /// # Arguments
    ///
    /// * `name` - Human-readable job name
    /// * `cron_expr` - Cron expression (e.g., "0 0 * * * *" for every hour)
    /// * `func` - Async function to execute
    pub fn register<F, Fut>(
        &self,
        name: impl Into<String>,
        cron_expr: &str,
        func: F,
    ) -> TaskResult<JobId>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let func: JobFn = Arc::new(move || func().boxed());
        self.register_boxed(name, cron_expr, func)
    }

    /// Register a job whose function is already boxed.
    pub fn register_boxed(
        &self,
        name: impl Into<String>,
        cron_expr: &str,
        func: JobFn,
    ) -> TaskResult<JobId> {
        let name = name.into();
        let schedule = parse_cron(cron_expr)?;

        let id = JobId::new();
        let info = JobInfo {
            id,
            name: name.clone(),
            cron: cron_expr.to_string(),
            enabled: true,
            last_run: None,
            next_run: schedule.upcoming(Utc).next(),
            run_count: 0,
            fail_count: 0,
        };

        self.jobs.insert(
            id,
            Arc::new(JobEntry {
                info: RwLock::new(info),
                schedule,
                func,
            }),
        );
        info!(job_id = %id, job_name = %name, cron = %cron_expr, "registered scheduled job");

        Ok(id)
    }

    /// Unregister a job.
    pub fn unregister(&self, id: JobId) -> TaskResult<()> {
        self.jobs
            .remove(&id)
            .ok_or_else(|| TaskError::not_found(id))?;
        info!(job_id = %id, "unregistered scheduled job");
        Ok(())
    }

    /// Enable a job. Its next run is computed from now.
    pub fn enable(&self, id: JobId) -> TaskResult<()> {
        let entry = self.entry(id)?;
        let mut info = entry.info.write();
        info.enabled = true;
        info.next_run = entry.schedule.upcoming(Utc).next();
        Ok(())
    }

    /// Disable a job.
    pub fn disable(&self, id: JobId) -> TaskResult<()> {
        self.entry(id)?.info.write().enabled = false;
        Ok(())
    }

    /// Get job info.
    pub fn get_job(&self, id: JobId) -> Option<JobInfo> {
        self.jobs.get(&id).map(|e| e.info.read().clone())
    }

    /// Find a job by name.
    pub fn find_job(&self, name: &str) -> Option<JobInfo> {
        self.jobs
            .iter()
            .map(|e| e.value().info.read().clone())
            .find(|info| info.name == name)
    }

    /// List all jobs.
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        self.jobs
            .iter()
            .map(|e| e.value().info.read().clone())
            .collect()
    }

    /// Run a job immediately (out of schedule).
    pub fn run_now(&self, id: JobId) -> TaskResult<()> {
        let entry = self.entry(id)?;
        spawn_run(id, entry, &self.total_executed);
        Ok(())
    }

    /// Start the scheduler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> TaskResult<()> {
        if self.config.tick_interval.is_zero() {
            return Err(TaskError::invalid_config("tick interval must be non-zero"));
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(TaskError::AlreadyRunning);
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let jobs = Arc::clone(&self.jobs);
        let tick_interval = self.config.tick_interval;
        let total_executed = Arc::clone(&self.total_executed);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => run_due_jobs(&jobs, &total_executed, Utc::now()),
                    _ = shutdown_rx.recv() => {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                }
            }
        });

        *self.loop_handle.lock() = Some(handle);
        info!(jobs = self.jobs.len(), "scheduler started");

        Ok(())
    }

    /// Stop the scheduler and wait for its loop to exit.
    ///
    /// Runs already in progress are left to finish on their own.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let shutdown_tx = self.shutdown_tx.lock().take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(()).await;
        }

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        info!("scheduler stopped");
    }

    fn entry(&self, id: JobId) -> TaskResult<Arc<JobEntry>> {
        self.jobs
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| TaskError::not_found(id))
    }
}

fn run_due_jobs(jobs: &JobTable, total_executed: &AtomicU64, now: DateTime<Utc>) {
    let due: Vec<(JobId, Arc<JobEntry>)> = jobs
        .iter()
        .filter(|entry| {
            let info = entry.value().info.read();
            info.enabled && info.next_run.is_some_and(|next| next <= now)
        })
        .map(|entry| (*entry.key(), Arc::clone(entry.value())))
        .collect();

    for (id, entry) in due {
        entry.info.write().next_run = entry.schedule.after(&now).next();
        debug!(job_id = %id, "executing scheduled job");
        spawn_run(id, entry, total_executed);
    }
}

fn spawn_run(id: JobId, entry: Arc<JobEntry>, total_executed: &AtomicU64) {
    let name = {
        let mut info = entry.info.write();
        info.last_run = Some(Utc::now());
        info.name.clone()
    };
    total_executed.fetch_add(1, Ordering::Relaxed);
    record_scheduled_run(&name);

    tokio::spawn(async move {
        let result = AssertUnwindSafe((entry.func)()).catch_unwind().await;
        let mut info = entry.info.write();
        info.run_count += 1;
        if result.is_err() {
            info.fail_count += 1;
            error!(job_id = %id, job_name = %name, "scheduled job panicked");
        }
    });
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("jobs", &self.jobs.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.running.load(Ordering::Acquire) {
            if let Some(tx) = self.shutdown_tx.lock().take() {
                let _ = tx.try_send(());
            }
        }
    }
}
