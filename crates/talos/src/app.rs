//! Application assembly and lifecycle.
//!
//! [`AppBuilder`] is the single assembly phase: it builds each service
//! with the configured operation defaults, compiles one [`Pipeline`] per
//! endpoint and aux, and mounts endpoints into a [`MountTable`]. The
//! resulting [`App`] is immutable apart from its lifecycle state and
//! storage.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderValue, Request, Response, StatusCode};
use parking_lot::{Mutex, RwLock};
use semver::Version;
use talos_config::TalosConfig;
use talos_core::{
    is_valid_slug, AssemblyError, Aux, Context, ContextId, Operation, OutcomeKind, Service,
    ServiceBuilder, SharedSupervisor, StorageMap, Watchdog,
};
use talos_pipeline::stages::CONTEXT_ID_HEADER;
use talos_pipeline::Pipeline;
use talos_tasks::{parse_cron, Scheduler, SchedulerConfig};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::mount::{join_path, MountTable, Resolution};
use crate::provider::Provider;

/// Namespace URL that application references are derived under.
const REFERENCE_NAMESPACE: &str = "https://talos.rs/apps";

/// Where an [`App`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Built but not started.
    Assembled,
    /// Started and not yet shut down.
    Running,
    /// Shut down, or failed to start. Terminal.
    Stopped,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Assembled => "assembled",
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

/// One lifecycle-triggered aux run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxRun {
    /// Owning service slug.
    pub service: String,
    /// Aux slug.
    pub aux: String,
    /// The recorded outcome, or `None` if a middleware short-circuited.
    pub outcome: Option<OutcomeKind>,
}

impl AuxRun {
    /// Returns `true` if the aux completed successfully.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == Some(OutcomeKind::Success)
    }
}

/// What [`App::start`] or [`App::shutdown`] ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Startup or shutdown aux runs, in the order they ran.
    pub runs: Vec<AuxRun>,
    /// Auxes registered with the scheduler.
    pub scheduled_jobs: usize,
}

impl LifecycleReport {
    /// Returns `true` if every aux run succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.runs.iter().all(AuxRun::succeeded)
    }
}

struct MountedAux {
    aux: Arc<Aux>,
    pipeline: Arc<Pipeline>,
}

struct MountedService {
    service: Arc<Service>,
    auxes: Vec<MountedAux>,
}

/// Builder for [`App`].
pub struct AppBuilder {
    slug: String,
    version: String,
    config: Option<TalosConfig>,
    supervisor: Option<SharedSupervisor>,
    services: Vec<ServiceBuilder>,
    providers: Vec<Provider>,
}

impl AppBuilder {
    fn new(slug: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            version: version.into(),
            config: None,
            supervisor: None,
            services: Vec::new(),
            providers: Vec::new(),
        }
    }

    /// Sets the configuration. Defaults to [`TalosConfig::default`].
    pub fn config(mut self, config: TalosConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the supervisor. Defaults to [`Watchdog`].
    pub fn supervisor(mut self, supervisor: SharedSupervisor) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Adds a service. Services are mounted, started and scheduled in the
    /// order they are added.
    pub fn service(mut self, service: ServiceBuilder) -> Self {
        self.services.push(service);
        self
    }

    /// Adds a provider.
    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Validates and compiles everything.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidSlug`] for a bad application slug
    /// - [`AppError::InvalidVersion`] unless the version is semver
    /// - [`AppError::Config`] if the configuration does not validate
    /// - [`AppError::Assembly`] for a bad service, operation or route
    /// - [`AppError::Task`] for an unparsable aux schedule
    pub fn build(self) -> Result<App, AppError> {
        if !is_valid_slug(&self.slug) {
            return Err(AppError::InvalidSlug(self.slug));
        }
        let version = Version::parse(self.version.trim())
            .map_err(|source| AppError::invalid_version(self.version.as_str(), source))?;
        let reference = app_reference(&self.slug, &version);

        let mut config = self.config.unwrap_or_default();
        config.normalize();
        config.validate()?;

        let defaults = config.operation_defaults();
        let supervisor = self
            .supervisor
            .unwrap_or_else(|| Arc::new(Watchdog::new()));

        let mut slugs = HashSet::new();
        let mut mounts = MountTable::new();
        let mut services = Vec::with_capacity(self.services.len());

        for builder in self.services {
            if !slugs.insert(builder.slug().to_string()) {
                return Err(AssemblyError::DuplicateService(builder.slug().to_string()).into());
            }
            let service = Arc::new(builder.build_with(&defaults)?);

            for endpoint in service.endpoints() {
                let operation: Arc<dyn Operation> = endpoint.clone();
                let pipeline = Arc::new(
                    Pipeline::builder(Arc::clone(&service), operation)
                        .compile(Arc::clone(&supervisor)),
                );
                let path = join_path(service.prefix(), endpoint.pattern());
                for method in endpoint.methods() {
                    mounts.insert(method.clone(), &path, Arc::clone(&pipeline))?;
                }
            }

            let mut auxes = Vec::with_capacity(service.auxes().len());
            for aux in service.auxes() {
                if let Some(expression) = aux.schedule() {
                    parse_cron(expression)?;
                }
                let operation: Arc<dyn Operation> = aux.clone();
                let pipeline = Pipeline::builder(Arc::clone(&service), operation)
                    .compile(Arc::clone(&supervisor));
                auxes.push(MountedAux {
                    aux: Arc::clone(aux),
                    pipeline: Arc::new(pipeline),
                });
            }

            services.push(MountedService { service, auxes });
        }

        let scheduler = Scheduler::with_config(
            SchedulerConfig::new().with_tick_interval(config.tick_interval()),
        );

        Ok(App {
            slug: self.slug,
            version,
            reference,
            config,
            supervisor,
            services,
            mounts,
            providers: self.providers,
            scheduler,
            storage: RwLock::new(StorageMap::new()),
            booted_at: Utc::now(),
            state: Mutex::new(AppState::Assembled),
        })
    }
}

impl fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppBuilder")
            .field("slug", &self.slug)
            .field("version", &self.version)
            .field("services", &self.services.len())
            .field("providers", &self.providers.len())
            .finish_non_exhaustive()
    }
}

/// An assembled application.
///
/// # Example
///
/// ```rust
/// use http::{Method, Request, StatusCode};
/// use bytes::Bytes;
/// use talos::App;
/// use talos_core::{Endpoint, Service};
///
/// # tokio_test::block_on(async {
/// let app = App::builder("shop", "1.0.0")
///     .service(
///         Service::builder("orders", "/orders").endpoint(
///             Endpoint::builder("/")
///                 .method(Method::GET)
///                 .logic(|ctx| async move {
///                     ctx.respond(http::Response::new(Bytes::from_static(b"[]")));
///                     Ok(())
///                 }),
///         ),
///     )
///     .build()
///     .unwrap();
///
/// let request = Request::get("/orders").body(Bytes::new()).unwrap();
/// let response = app.dispatch(request).await;
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.body().as_ref(), b"[]");
/// # });
/// ```
pub struct App {
    slug: String,
    version: Version,
    reference: Uuid,
    config: TalosConfig,
    supervisor: SharedSupervisor,
    services: Vec<MountedService>,
    mounts: MountTable,
    providers: Vec<Provider>,
    scheduler: Scheduler,
    storage: RwLock<StorageMap>,
    booted_at: DateTime<Utc>,
    state: Mutex<AppState>,
}

impl App {
    /// Starts assembling an application.
    pub fn builder(slug: impl Into<String>, version: impl Into<String>) -> AppBuilder {
        AppBuilder::new(slug, version)
    }

    /// The application slug.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// The application version.
    #[must_use]
    pub const fn version(&self) -> &Version {
        &self.version
    }

    /// Identifies this application.
    ///
    /// A UUID v5 derived from the slug and version, so two builds of the
    /// same release share a reference.
    #[must_use]
    pub const fn reference(&self) -> Uuid {
        self.reference
    }

    /// The environment operations are checked against.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.config.application.environment
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &TalosConfig {
        &self.config
    }

    /// The supervisor every pipeline reports to.
    #[must_use]
    pub fn supervisor(&self) -> &SharedSupervisor {
        &self.supervisor
    }

    /// When the application was built.
    #[must_use]
    pub const fn booted_at(&self) -> DateTime<Utc> {
        self.booted_at
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AppState {
        *self.state.lock()
    }

    /// Storage shared by the whole application.
    #[must_use]
    pub const fn storage(&self) -> &RwLock<StorageMap> {
        &self.storage
    }

    /// Services in mount order.
    pub fn services(&self) -> impl Iterator<Item = &Arc<Service>> {
        self.services.iter().map(|mounted| &mounted.service)
    }

    /// Looks up a service by slug.
    #[must_use]
    pub fn service(&self, slug: &str) -> Option<&Arc<Service>> {
        self.services().find(|service| service.slug() == slug)
    }

    /// The endpoint routing table.
    #[must_use]
    pub const fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    /// The scheduler running aux schedules.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Installs logging and metrics from the configuration.
    ///
    /// Call once per process.
    pub fn install_telemetry(&self) -> Result<(), AppError> {
        talos_telemetry::init_telemetry(&self.config.telemetry_config(&self.slug))?;
        Ok(())
    }

    /// A fresh internal context for this application's environment.
    #[must_use]
    pub fn context(&self) -> Arc<Context> {
        Context::builder().environment(self.environment()).build()
    }

    /// A fresh network context for `request`.
    ///
    /// A UUID in the request's `x-context-id` header is adopted as the
    /// context ID.
    #[must_use]
    pub fn request_context(&self, request: Request<Bytes>) -> Arc<Context> {
        let mut builder = Context::builder().environment(self.environment());
        if let Some(id) = incoming_context_id(&request) {
            builder = builder.id(id);
        }
        builder.request(request).build()
    }

    /// Routes and runs a request.
    ///
    /// Unmatched requests go to the supervisor. Returns the response
    /// written to the exchange, or `204 No Content` carrying the
    /// context id header if none was.
    pub async fn dispatch(&self, request: Request<Bytes>) -> Response<Bytes> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let ctx = self.request_context(request);

        match self.mounts.resolve(&method, &path) {
            Resolution::Found(pipeline) => {
                pipeline.run(Arc::clone(&ctx)).await;
            }
            Resolution::MethodNotAllowed => self.supervisor.method_not_allowed(&ctx),
            Resolution::NotFound => self.supervisor.route_not_found(&ctx),
        }

        ctx.take_response().unwrap_or_else(|| no_content(ctx.id()))
    }

    /// Runs an aux on demand with a fresh context, in any lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownService`] or [`AppError::UnknownAux`]
    /// if nothing matches.
    pub async fn trigger(&self, service: &str, aux: &str) -> Result<Option<OutcomeKind>, AppError> {
        let mounted = self
            .services
            .iter()
            .find(|mounted| mounted.service.slug() == service)
            .ok_or_else(|| AppError::UnknownService(service.to_string()))?;
        let entry = mounted
            .auxes
            .iter()
            .find(|entry| entry.aux.slug() == aux)
            .ok_or_else(|| AppError::unknown_aux(service, aux))?;

        Ok(entry.pipeline.run(self.context()).await)
    }

    /// Sets up providers, activates services in mount order running their
    /// startup auxes, then starts the scheduler.
    ///
    /// # Errors
    ///
    /// - [`AppError::Lifecycle`] unless the application is
    ///   [`AppState::Assembled`]
    /// - [`AppError::Provider`] if a setup hook fails; providers already
    ///   set up are cleaned up and the application stops
    /// - [`AppError::Task`] if the scheduler cannot start; providers are
    ///   cleaned up and the application stops
    pub async fn start(&self) -> Result<LifecycleReport, AppError> {
        self.transition("start", AppState::Assembled, AppState::Running)?;

        for (index, provider) in self.providers.iter().enumerate() {
            if let Err(source) = provider.run_setup(self) {
                self.cleanup_providers(&self.providers[..index]);
                *self.state.lock() = AppState::Stopped;
                return Err(AppError::provider(provider.about(), source));
            }
        }

        let mut report = LifecycleReport::default();
        for mounted in &self.services {
            mounted.service.mark_loaded();
            for entry in mounted.auxes.iter().filter(|entry| entry.aux.when_up()) {
                report.runs.push(self.run_aux(mounted, entry).await);
            }
        }

        if self.config.scheduler.enabled {
            match self.start_scheduler() {
                Ok(count) => report.scheduled_jobs = count,
                Err(error) => {
                    self.abort_start();
                    return Err(error);
                }
            }
        }

        info!(
            app = %self.slug,
            version = %self.version,
            reference = %self.reference,
            environment = %self.environment(),
            startup_runs = report.runs.len(),
            scheduled_jobs = report.scheduled_jobs,
            "application started"
        );

        Ok(report)
    }

    /// Stops the scheduler, runs shutdown auxes with services in reverse
    /// mount order, then cleans up providers in reverse.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Lifecycle`] unless the application is
    /// [`AppState::Running`].
    pub async fn shutdown(&self) -> Result<LifecycleReport, AppError> {
        self.transition("shut down", AppState::Running, AppState::Stopped)?;

        self.scheduler.stop().await;

        let mut report = LifecycleReport::default();
        for mounted in self.services.iter().rev() {
            for entry in mounted.auxes.iter().filter(|entry| entry.aux.when_down()) {
                report.runs.push(self.run_aux(mounted, entry).await);
            }
        }

        self.cleanup_providers(&self.providers);

        info!(
            app = %self.slug,
            reference = %self.reference,
            shutdown_runs = report.runs.len(),
            "application stopped"
        );

        Ok(report)
    }

    fn transition(
        &self,
        action: &'static str,
        from: AppState,
        to: AppState,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(AppError::Lifecycle {
                action,
                state: *state,
            });
        }
        *state = to;
        Ok(())
    }

    async fn run_aux(&self, mounted: &MountedService, entry: &MountedAux) -> AuxRun {
        let outcome = entry.pipeline.run(self.context()).await;
        AuxRun {
            service: mounted.service.slug().to_string(),
            aux: entry.aux.slug().to_string(),
            outcome,
        }
    }

    fn start_scheduler(&self) -> Result<usize, AppError> {
        let count = self.schedule_auxes()?;
        if count > 0 {
            self.scheduler.start()?;
        }
        Ok(count)
    }

    fn abort_start(&self) {
        self.cleanup_providers(&self.providers);
        *self.state.lock() = AppState::Stopped;
        warn!(app = %self.slug, "application failed to start, providers cleaned up");
    }

    fn schedule_auxes(&self) -> Result<usize, AppError> {
        let mut count = 0;
        for mounted in &self.services {
            for entry in &mounted.auxes {
                let Some(expression) = entry.aux.schedule() else {
                    continue;
                };
                let name = job_name(&mounted.service, &entry.aux);
                let pipeline = Arc::clone(&entry.pipeline);
                let environment = self.environment().to_string();

                self.scheduler.register(name, expression, move || {
                    let pipeline = Arc::clone(&pipeline);
                    let ctx = Context::builder().environment(environment.clone()).build();
                    async move {
                        pipeline.run(ctx).await;
                    }
                })?;
                count += 1;
            }
        }
        Ok(count)
    }

    fn cleanup_providers(&self, providers: &[Provider]) {
        for provider in providers.iter().rev() {
            if let Err(error) = provider.run_cleanup(self) {
                warn!(provider = %provider.about(), error = %error, "provider cleanup failed");
            }
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("slug", &self.slug)
            .field("version", &self.version)
            .field("reference", &self.reference)
            .field("environment", &self.environment())
            .field("state", &self.state())
            .field("services", &self.services.len())
            .field("mounts", &self.mounts.len())
            .finish_non_exhaustive()
    }
}

fn incoming_context_id(request: &Request<Bytes>) -> Option<ContextId> {
    let value = request.headers().get(CONTEXT_ID_HEADER)?.to_str().ok()?;
    value.parse::<Uuid>().ok().map(ContextId::from_uuid)
}

fn job_name(service: &Service, aux: &Aux) -> String {
    format!("{}.{}", service.slug(), aux.slug())
}

fn app_reference(slug: &str, version: &Version) -> Uuid {
    let url = format!("{REFERENCE_NAMESPACE}/{slug}/{version}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes())
}

fn no_content(id: ContextId) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::NO_CONTENT;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(CONTEXT_ID_HEADER, value);
    }
    response
}
