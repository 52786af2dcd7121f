//! Services: named groups of operations sharing a mount prefix and middleware.

use crate::error::{is_valid_slug, AssemblyError};
use crate::middleware::{BoxedMiddleware, Middleware};
use crate::operation::{Availability, Aux, AuxBuilder, Endpoint, EndpointBuilder, OperationDefaults};
use crate::storage::StorageMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A group of endpoints and auxiliary operations.
///
/// Service middleware wraps every aux and every endpoint that inherits it.
/// The service also owns long-lived storage shared by all its invocations.
///
/// # Example
///
/// ```
/// use http::Method;
/// use talos_core::{Endpoint, Service};
///
/// let service = Service::builder("orders", "/orders")
///     .endpoint(
///         Endpoint::builder("/")
///             .method(Method::GET)
///             .logic(|_ctx| async { Ok(()) }),
///     )
///     .build()
///     .expect("valid service");
///
/// assert_eq!(service.prefix(), "/orders");
/// assert_eq!(service.endpoints().len(), 1);
/// ```
pub struct Service {
    slug: String,
    about: String,
    prefix: String,
    availability: Availability,
    middleware: Vec<BoxedMiddleware>,
    endpoints: Vec<Arc<Endpoint>>,
    auxes: Vec<Arc<Aux>>,
    storage: RwLock<StorageMap>,
    loaded_at: OnceLock<DateTime<Utc>>,
}

impl Service {
    /// Starts declaring a service mounted at `prefix`.
    pub fn builder(slug: impl Into<String>, prefix: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder::new(slug, prefix)
    }

    /// The slug, unique within an application.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Human-readable description.
    #[must_use]
    pub fn about(&self) -> &str {
        &self.about
    }

    /// The path prefix endpoints are mounted under.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Environments the service is offered in.
    #[must_use]
    pub const fn availability(&self) -> &Availability {
        &self.availability
    }

    /// Service-wide middleware, outermost first.
    #[must_use]
    pub fn middleware(&self) -> &[BoxedMiddleware] {
        &self.middleware
    }

    /// Endpoints in declaration order.
    #[must_use]
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Auxiliary operations in declaration order.
    #[must_use]
    pub fn auxes(&self) -> &[Arc<Aux>] {
        &self.auxes
    }

    /// Looks up an auxiliary operation by slug.
    #[must_use]
    pub fn aux(&self, slug: &str) -> Option<&Arc<Aux>> {
        self.auxes.iter().find(|aux| aux.slug() == slug)
    }

    /// Storage shared across every invocation of this service.
    #[must_use]
    pub const fn storage(&self) -> &RwLock<StorageMap> {
        &self.storage
    }

    /// Marks the service as started. Only the first call has any effect.
    pub fn mark_loaded(&self) -> bool {
        self.loaded_at.set(Utc::now()).is_ok()
    }

    /// When the service was started, if it has been.
    #[must_use]
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at.get().copied()
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("slug", &self.slug)
            .field("prefix", &self.prefix)
            .field("availability", &self.availability)
            .field("endpoints", &self.endpoints.len())
            .field("auxes", &self.auxes.len())
            .field("loaded_at", &self.loaded_at())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Service`].
pub struct ServiceBuilder {
    slug: String,
    about: String,
    prefix: String,
    availability: Availability,
    middleware: Vec<BoxedMiddleware>,
    endpoints: Vec<EndpointBuilder>,
    auxes: Vec<AuxBuilder>,
}

impl ServiceBuilder {
    fn new(slug: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            about: String::new(),
            prefix: prefix.into(),
            availability: Availability::everywhere(),
            middleware: Vec::new(),
            endpoints: Vec::new(),
            auxes: Vec::new(),
        }
    }

    /// The slug this service is declared under.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Sets the description.
    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = about.into();
        self
    }

    /// Offers the service in `environment`. Not calling this means everywhere.
    pub fn available_in(mut self, environment: impl AsRef<str>) -> Self {
        self.availability = self.availability.with(environment);
        self
    }

    /// Appends a service-wide middleware. The first one added is outermost.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already boxed service-wide middleware.
    pub fn layer(mut self, middleware: BoxedMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Declares an endpoint.
    pub fn endpoint(mut self, endpoint: EndpointBuilder) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Declares an auxiliary operation.
    pub fn aux(mut self, aux: AuxBuilder) -> Self {
        self.auxes.push(aux);
        self
    }

    /// Builds the service with [`OperationDefaults::default`].
    pub fn build(self) -> Result<Service, AssemblyError> {
        self.build_with(&OperationDefaults::default())
    }

    /// Builds the service and every operation in it.
    pub fn build_with(self, defaults: &OperationDefaults) -> Result<Service, AssemblyError> {
        if !is_valid_slug(&self.slug) {
            return Err(AssemblyError::InvalidSlug(self.slug));
        }
        let prefix = self.prefix.trim();
        if prefix.is_empty() {
            return Err(AssemblyError::MissingPrefix(self.slug));
        }
        let prefix = normalize_prefix(prefix);

        let endpoints = self
            .endpoints
            .into_iter()
            .map(|builder| builder.build_with(defaults).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        let mut auxes = Vec::with_capacity(self.auxes.len());
        for builder in self.auxes {
            if !seen.insert(builder.slug().to_string()) {
                return Err(AssemblyError::DuplicateAux {
                    service: self.slug,
                    aux: builder.slug().to_string(),
                });
            }
            auxes.push(Arc::new(builder.build_with(defaults)?));
        }

        Ok(Service {
            slug: self.slug,
            about: self.about,
            prefix,
            availability: self.availability,
            middleware: self.middleware,
            endpoints,
            auxes,
            storage: RwLock::new(StorageMap::new()),
            loaded_at: OnceLock::new(),
        })
    }
}

/// Ensures a leading `/` and strips trailing ones. `/` itself is kept.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
