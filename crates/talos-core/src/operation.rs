//! Operations: units of business logic a service exposes.
//!
//! There are two flavours. An [`Endpoint`] is bound to HTTP methods and a
//! path pattern. An [`Aux`] is auxiliary work the runtime triggers itself:
//! at startup, at shutdown, or on a cron schedule.
//!
//! Both implement [`Operation`], the object-safe trait the pipeline works
//! with. Its provided [`Operation::apply`] runs the business logic through
//! the bounded invoker.

use crate::context::Context;
use crate::error::{is_valid_slug, AssemblyError, OperationResult};
use crate::invoke;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware};
use crate::outcome::Outcome;
use http::Method;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Deadline applied to operations that do not configure one.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Type-erased business logic.
///
/// Deadlines are enforced against blocking logic only on a multi-thread
/// runtime. See [`crate::invoke`].
pub type Logic = Arc<dyn Fn(Arc<Context>) -> BoxFuture<'static, OperationResult> + Send + Sync>;

/// Hook that replaces the default fault report of an operation.
pub type FaultHook = Arc<dyn Fn(&Context, &Outcome) + Send + Sync>;

/// Wraps an async function as [`Logic`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use talos_core::{logic, Context};
///
/// let ping = logic(|ctx: Arc<Context>| async move {
///     ctx.storage().insert("pong", true);
///     Ok(())
/// });
/// # let _ = ping;
/// ```
pub fn logic<F, Fut>(func: F) -> Logic
where
    F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OperationResult> + Send + 'static,
{
    Arc::new(move |ctx: Arc<Context>| -> BoxFuture<'static, OperationResult> {
        Box::pin(func(ctx))
    })
}

/// Settings applied to operations that leave them unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDefaults {
    /// Deadline for operations without their own.
    pub deadline: Duration,
}

impl Default for OperationDefaults {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
        }
    }
}

/// The set of environments something is offered in.
///
/// An empty set means every environment. Names compare case-insensitively.
///
/// # Example
///
/// ```
/// use talos_core::Availability;
///
/// let availability = Availability::only(["staging", "Production"]);
/// assert!(availability.permits("production"));
/// assert!(!availability.permits("development"));
/// assert!(Availability::everywhere().permits("anything"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
    environments: BTreeSet<String>,
}

impl Availability {
    /// Available in every environment.
    #[must_use]
    pub fn everywhere() -> Self {
        Self::default()
    }

    /// Available only in the listed environments.
    pub fn only<I, S>(environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            environments: environments
                .into_iter()
                .map(|env| env.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Adds an environment to the set.
    pub fn with(mut self, environment: impl AsRef<str>) -> Self {
        self.environments
            .insert(environment.as_ref().to_ascii_lowercase());
        self
    }

    /// Returns `true` if `environment` is in the set, or the set is empty.
    #[must_use]
    pub fn permits(&self, environment: &str) -> bool {
        self.environments.is_empty()
            || self
                .environments
                .contains(&environment.to_ascii_lowercase())
    }

    /// Returns `true` unless this is [`Availability::everywhere`].
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        !self.environments.is_empty()
    }

    /// The environments in the set, lowercased and sorted.
    pub fn environments(&self) -> impl Iterator<Item = &str> {
        self.environments.iter().map(String::as_str)
    }
}

/// A unit of business logic the pipeline can run.
///
/// Implementors describe the operation. The provided methods supply the
/// behaviour shared by every operation.
pub trait Operation: Send + Sync + 'static {
    /// Stable identity used in logs, metrics and errors.
    fn identify(&self) -> &str;

    /// Human-readable description.
    fn about(&self) -> &str;

    /// Maximum time the business logic may run before it is abandoned.
    fn deadline(&self) -> Duration;

    /// Environments this operation is offered in.
    fn availability(&self) -> &Availability;

    /// Operation-specific middleware, outermost first.
    fn middleware(&self) -> &[BoxedMiddleware];

    /// Whether the owning service's middleware wraps this operation.
    fn inherits_middleware(&self) -> bool {
        true
    }

    /// The business logic.
    fn logic(&self) -> &Logic;

    /// Returns `true` if both this operation and its bound service (if any)
    /// are offered in the context's environment.
    fn is_available(&self, ctx: &Context) -> bool {
        let environment = ctx.environment();
        self.availability().permits(environment)
            && ctx
                .service()
                .map_or(true, |service| service.availability().permits(environment))
    }

    /// Runs the business logic through the bounded invoker.
    fn apply(&self, ctx: Arc<Context>) -> BoxFuture<'_, Outcome> {
        Box::pin(invoke::invoke(self, ctx))
    }

    /// Reports how an invocation ended. Called for every outcome.
    fn on_fault(&self, ctx: &Context, outcome: &Outcome) {
        report_fault(self.identify(), ctx, outcome);
    }
}

/// Default fault report: a warning for every non-success outcome.
pub fn report_fault(operation: &str, ctx: &Context, outcome: &Outcome) {
    if outcome.is_success() {
        return;
    }
    match outcome.error() {
        Some(error) => tracing::warn!(
            parent: ctx.span(),
            operation,
            outcome = %outcome.kind(),
            error = %error,
            "operation reported a fault"
        ),
        None => tracing::warn!(
            parent: ctx.span(),
            operation,
            outcome = %outcome.kind(),
            "operation reported a fault"
        ),
    }
}

/// An operation bound to HTTP methods and a path pattern.
pub struct Endpoint {
    identity: String,
    about: String,
    methods: Vec<Method>,
    pattern: String,
    availability: Availability,
    inherit: bool,
    deadline: Duration,
    middleware: Vec<BoxedMiddleware>,
    logic: Logic,
    fault_hook: Option<FaultHook>,
}

impl Endpoint {
    /// Starts declaring an endpoint at `pattern`, relative to its service prefix.
    pub fn builder(pattern: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(pattern)
    }

    /// HTTP methods this endpoint answers.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Path pattern, relative to the service prefix.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` if this endpoint answers `method`.
    #[must_use]
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

impl Operation for Endpoint {
    fn identify(&self) -> &str {
        &self.identity
    }

    fn about(&self) -> &str {
        &self.about
    }

    fn deadline(&self) -> Duration {
        self.deadline
    }

    fn availability(&self) -> &Availability {
        &self.availability
    }

    fn middleware(&self) -> &[BoxedMiddleware] {
        &self.middleware
    }

    fn inherits_middleware(&self) -> bool {
        self.inherit
    }

    fn logic(&self) -> &Logic {
        &self.logic
    }

    fn on_fault(&self, ctx: &Context, outcome: &Outcome) {
        match &self.fault_hook {
            Some(hook) => hook(ctx, outcome),
            None => report_fault(&self.identity, ctx, outcome),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("identity", &self.identity)
            .field("availability", &self.availability)
            .field("inherit", &self.inherit)
            .field("deadline", &self.deadline)
            .field("middleware", &middleware_names(&self.middleware))
            .finish_non_exhaustive()
    }
}

/// Builder for [`Endpoint`].
pub struct EndpointBuilder {
    about: String,
    methods: Vec<Method>,
    pattern: String,
    availability: Availability,
    inherit: bool,
    deadline: Option<Duration>,
    middleware: Vec<BoxedMiddleware>,
    logic: Option<Logic>,
    fault_hook: Option<FaultHook>,
}

impl EndpointBuilder {
    fn new(pattern: impl Into<String>) -> Self {
        Self {
            about: String::new(),
            methods: Vec::new(),
            pattern: pattern.into(),
            availability: Availability::everywhere(),
            inherit: true,
            deadline: None,
            middleware: Vec::new(),
            logic: None,
            fault_hook: None,
        }
    }

    /// Sets the description.
    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = about.into();
        self
    }

    /// Adds an HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Adds several HTTP methods.
    pub fn methods(self, methods: impl IntoIterator<Item = Method>) -> Self {
        methods.into_iter().fold(self, Self::method)
    }

    /// Offers the endpoint in `environment`. Not calling this means everywhere.
    pub fn available_in(mut self, environment: impl AsRef<str>) -> Self {
        self.availability = self.availability.with(environment);
        self
    }

    /// Replaces the availability set.
    pub fn availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Whether the service middleware wraps this endpoint. Defaults to `true`.
    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = inherit;
        self
    }

    /// Sets the deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Appends a middleware. The first one added is outermost.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already boxed middleware.
    pub fn layer(mut self, middleware: BoxedMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Sets the business logic from an async function.
    pub fn logic<F, Fut>(mut self, func: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        self.logic = Some(logic(func));
        self
    }

    /// Sets already type-erased business logic.
    pub fn with_logic(mut self, logic: Logic) -> Self {
        self.logic = Some(logic);
        self
    }

    /// Replaces the default fault report.
    pub fn on_fault<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context, &Outcome) + Send + Sync + 'static,
    {
        self.fault_hook = Some(Arc::new(hook));
        self
    }

    /// Builds the endpoint with [`OperationDefaults::default`].
    pub fn build(self) -> Result<Endpoint, AssemblyError> {
        self.build_with(&OperationDefaults::default())
    }

    /// Builds the endpoint, filling unset settings from `defaults`.
    pub fn build_with(self, defaults: &OperationDefaults) -> Result<Endpoint, AssemblyError> {
        let names: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
        let identity = format!("{} {}", names.join("|"), self.pattern);

        if self.methods.is_empty() {
            return Err(AssemblyError::MissingMethods(self.pattern));
        }
        let deadline = self.deadline.unwrap_or(defaults.deadline);
        if deadline.is_zero() {
            return Err(AssemblyError::ZeroDeadline(identity));
        }
        let Some(logic) = self.logic else {
            return Err(AssemblyError::MissingLogic(identity));
        };

        Ok(Endpoint {
            identity,
            about: self.about,
            methods: self.methods,
            pattern: self.pattern,
            availability: self.availability,
            inherit: self.inherit,
            deadline,
            middleware: self.middleware,
            logic,
            fault_hook: self.fault_hook,
        })
    }
}

/// Auxiliary work the runtime triggers on its own.
///
/// An aux may run when the service comes up, when it goes down, on a cron
/// schedule, or any combination. It always inherits service middleware.
pub struct Aux {
    slug: String,
    about: String,
    when_up: bool,
    when_down: bool,
    schedule: Option<String>,
    availability: Availability,
    deadline: Duration,
    middleware: Vec<BoxedMiddleware>,
    logic: Logic,
    fault_hook: Option<FaultHook>,
}

impl Aux {
    /// Starts declaring an auxiliary operation.
    pub fn builder(slug: impl Into<String>) -> AuxBuilder {
        AuxBuilder::new(slug)
    }

    /// The slug, unique within its service.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Runs when the service starts.
    #[must_use]
    pub const fn when_up(&self) -> bool {
        self.when_up
    }

    /// Runs when the service stops.
    #[must_use]
    pub const fn when_down(&self) -> bool {
        self.when_down
    }

    /// Cron expression for periodic runs, if any.
    #[must_use]
    pub fn schedule(&self) -> Option<&str> {
        self.schedule.as_deref()
    }
}

impl Operation for Aux {
    fn identify(&self) -> &str {
        &self.slug
    }

    fn about(&self) -> &str {
        &self.about
    }

    fn deadline(&self) -> Duration {
        self.deadline
    }

    fn availability(&self) -> &Availability {
        &self.availability
    }

    fn middleware(&self) -> &[BoxedMiddleware] {
        &self.middleware
    }

    fn logic(&self) -> &Logic {
        &self.logic
    }

    fn on_fault(&self, ctx: &Context, outcome: &Outcome) {
        match &self.fault_hook {
            Some(hook) => hook(ctx, outcome),
            None => report_fault(&self.slug, ctx, outcome),
        }
    }
}

impl fmt::Debug for Aux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aux")
            .field("slug", &self.slug)
            .field("when_up", &self.when_up)
            .field("when_down", &self.when_down)
            .field("schedule", &self.schedule)
            .field("deadline", &self.deadline)
            .field("middleware", &middleware_names(&self.middleware))
            .finish_non_exhaustive()
    }
}

/// Builder for [`Aux`].
pub struct AuxBuilder {
    slug: String,
    about: String,
    when_up: bool,
    when_down: bool,
    schedule: Option<String>,
    availability: Availability,
    deadline: Option<Duration>,
    middleware: Vec<BoxedMiddleware>,
    logic: Option<Logic>,
    fault_hook: Option<FaultHook>,
}

impl AuxBuilder {
    fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            about: String::new(),
            when_up: false,
            when_down: false,
            schedule: None,
            availability: Availability::everywhere(),
            deadline: None,
            middleware: Vec::new(),
            logic: None,
            fault_hook: None,
        }
    }

    /// The slug this aux is declared under.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Sets the description.
    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = about.into();
        self
    }

    /// Runs the aux when its service starts.
    pub fn when_up(mut self) -> Self {
        self.when_up = true;
        self
    }

    /// Runs the aux when its service stops.
    pub fn when_down(mut self) -> Self {
        self.when_down = true;
        self
    }

    /// Runs the aux on a cron schedule (seconds field first).
    pub fn schedule(mut self, cron: impl Into<String>) -> Self {
        self.schedule = Some(cron.into());
        self
    }

    /// Offers the aux in `environment`. Not calling this means everywhere.
    pub fn available_in(mut self, environment: impl AsRef<str>) -> Self {
        self.availability = self.availability.with(environment);
        self
    }

    /// Replaces the availability set.
    pub fn availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Sets the deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Appends a middleware, run inside the service middleware.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already boxed middleware.
    pub fn layer(mut self, middleware: BoxedMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Sets the business logic from an async function.
    pub fn logic<F, Fut>(mut self, func: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        self.logic = Some(logic(func));
        self
    }

    /// Sets already type-erased business logic.
    pub fn with_logic(mut self, logic: Logic) -> Self {
        self.logic = Some(logic);
        self
    }

    /// Replaces the default fault report.
    pub fn on_fault<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context, &Outcome) + Send + Sync + 'static,
    {
        self.fault_hook = Some(Arc::new(hook));
        self
    }

    /// Builds the aux with [`OperationDefaults::default`].
    pub fn build(self) -> Result<Aux, AssemblyError> {
        self.build_with(&OperationDefaults::default())
    }

    /// Builds the aux, filling unset settings from `defaults`.
    pub fn build_with(self, defaults: &OperationDefaults) -> Result<Aux, AssemblyError> {
        if !is_valid_slug(&self.slug) {
            return Err(AssemblyError::InvalidSlug(self.slug));
        }
        let deadline = self.deadline.unwrap_or(defaults.deadline);
        if deadline.is_zero() {
            return Err(AssemblyError::ZeroDeadline(self.slug));
        }
        let Some(logic) = self.logic else {
            return Err(AssemblyError::MissingLogic(self.slug));
        };

        Ok(Aux {
            slug: self.slug,
            about: self.about,
            when_up: self.when_up,
            when_down: self.when_down,
            schedule: self.schedule,
            availability: self.availability,
            deadline,
            middleware: self.middleware,
            logic,
            fault_hook: self.fault_hook,
        })
    }
}

fn middleware_names(middleware: &[BoxedMiddleware]) -> Vec<&'static str> {
    middleware.iter().map(|m| m.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::middleware::{FnMiddleware, Next};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> BoxedMiddleware {
        FnMiddleware::new("noop", |ctx: Arc<Context>, next: Next| async move {
            next.run(ctx).await;
        })
        .boxed()
    }

    #[test]
    fn test_availability_case_insensitive() {
        let availability = Availability::only(["QA"]).with("Staging");
        assert!(availability.permits("qa"));
        assert!(availability.permits("STAGING"));
        assert!(!availability.permits("production"));
        assert!(availability.is_restricted());
        assert_eq!(availability.environments().collect::<Vec<_>>(), ["qa", "staging"]);
    }

    #[test]
    fn test_endpoint_identity_and_defaults() {
        let endpoint = Endpoint::builder("/orders/{id}")
            .method(Method::GET)
            .method(Method::HEAD)
            .method(Method::GET)
            .logic(|_ctx| async { Ok(()) })
            .build()
            .expect("valid endpoint");

        assert_eq!(endpoint.identify(), "GET|HEAD /orders/{id}");
        assert_eq!(endpoint.methods(), &[Method::GET, Method::HEAD]);
        assert_eq!(endpoint.deadline(), DEFAULT_DEADLINE);
        assert!(endpoint.inherits_middleware());
        assert!(endpoint.allows(&Method::HEAD));
        assert!(!endpoint.allows(&Method::POST));
    }

    #[test]
    fn test_endpoint_requires_methods_and_logic() {
        let err = Endpoint::builder("/x")
            .logic(|_ctx| async { Ok(()) })
            .build()
            .unwrap_err();
        assert_eq!(err, AssemblyError::MissingMethods("/x".into()));

        let err = Endpoint::builder("/x").method(Method::PUT).build().unwrap_err();
        assert_eq!(err, AssemblyError::MissingLogic("PUT /x".into()));
    }

    #[test]
    fn test_endpoint_uses_configured_default_deadline() {
        let defaults = OperationDefaults {
            deadline: Duration::from_millis(250),
        };
        let endpoint = Endpoint::builder("/slow")
            .method(Method::POST)
            .logic(|_ctx| async { Ok(()) })
            .build_with(&defaults)
            .expect("valid endpoint");
        assert_eq!(endpoint.deadline(), Duration::from_millis(250));

        let explicit = Endpoint::builder("/fast")
            .method(Method::POST)
            .deadline(Duration::from_millis(5))
            .logic(|_ctx| async { Ok(()) })
            .build_with(&defaults)
            .expect("valid endpoint");
        assert_eq!(explicit.deadline(), Duration::from_millis(5));
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let err = Aux::builder("warm")
            .deadline(Duration::ZERO)
            .logic(|_ctx| async { Ok(()) })
            .build()
            .unwrap_err();
        assert_eq!(err, AssemblyError::ZeroDeadline("warm".into()));
    }

    #[test]
    fn test_aux_flags_and_middleware() {
        let aux = Aux::builder("compact")
            .about("compacts the journal")
            .when_up()
            .schedule("0 */5 * * * *")
            .layer(noop())
            .logic(|_ctx| async { Ok(()) })
            .build()
            .expect("valid aux");

        assert_eq!(aux.identify(), "compact");
        assert_eq!(aux.about(), "compacts the journal");
        assert!(aux.when_up());
        assert!(!aux.when_down());
        assert_eq!(aux.schedule(), Some("0 */5 * * * *"));
        assert_eq!(aux.middleware().len(), 1);
        assert!(aux.inherits_middleware());
    }

    #[test]
    fn test_aux_slug_validated() {
        let err = Aux::builder("bad slug")
            .logic(|_ctx| async { Ok(()) })
            .build()
            .unwrap_err();
        assert_eq!(err, AssemblyError::InvalidSlug("bad slug".into()));
    }

    #[test]
    fn test_is_available_checks_environment() {
        let endpoint = Endpoint::builder("/debug")
            .method(Method::GET)
            .available_in("development")
            .logic(|_ctx| async { Ok(()) })
            .build()
            .expect("valid endpoint");

        let dev = Context::builder().environment("development").build();
        let prod = Context::builder().environment("production").build();
        assert!(endpoint.is_available(&dev));
        assert!(!endpoint.is_available(&prod));
    }

    #[test]
    fn test_fault_hook_replaces_default_report() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let endpoint = Endpoint::builder("/hooked")
            .method(Method::GET)
            .on_fault(move |_ctx, outcome| {
                if !outcome.is_success() {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            })
            .logic(|_ctx| async { Err(ServiceError::conflict("taken")) })
            .build()
            .expect("valid endpoint");

        let ctx = Context::builder().build();
        endpoint.on_fault(&ctx, &Outcome::Success);
        endpoint.on_fault(&ctx, &Outcome::Unavailable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_apply_runs_logic() {
        let endpoint = Endpoint::builder("/ping")
            .method(Method::GET)
            .logic(|ctx: Arc<Context>| async move {
                ctx.storage().insert("pinged", true);
                Ok(())
            })
            .build()
            .expect("valid endpoint");

        let ctx = Context::builder().build();
        let outcome = endpoint.apply(Arc::clone(&ctx)).await;
        assert!(outcome.is_success());
        assert_eq!(ctx.storage().get::<bool>("pinged"), Some(&true));
    }

    proptest::proptest! {
        #[test]
        fn prop_availability_ignores_case(env in "[a-zA-Z0-9]{1,12}") {
            let availability = Availability::only([env.to_ascii_uppercase()]);
            proptest::prop_assert!(availability.permits(&env.to_ascii_lowercase()));
            proptest::prop_assert!(Availability::everywhere().permits(&env));
        }
    }
}
