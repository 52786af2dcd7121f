//! Invocation context types.
//!
//! A [`Context`] is created for every invocation, whether it came in over the
//! network or was started by the runtime itself. It carries the environment,
//! a tracing span, scratch storage, and for network invocations the request
//! together with a slot for the response.

use crate::outcome::OutcomeKind;
use crate::service::Service;
use crate::storage::StorageMap;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};
use tracing::field::Empty;
use tracing::Span;
use uuid::Uuid;

/// Environment used when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// A unique identifier for each context, using UUID v7.
///
/// # Example
///
/// ```
/// use talos_core::ContextId;
///
/// let id = ContextId::new();
/// assert_ne!(id, ContextId::new());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Creates a new time-ordered identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID, e.g. one propagated from a caller.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ContextId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// The network request behind a context and the response written for it.
#[derive(Debug)]
pub struct Exchange {
    request: http::Request<Bytes>,
    response: Mutex<Option<http::Response<Bytes>>>,
}

impl Exchange {
    fn new(request: http::Request<Bytes>) -> Self {
        Self {
            request,
            response: Mutex::new(None),
        }
    }
}

/// Per-invocation state shared by every layer of a pipeline.
///
/// Contexts are always handled through `Arc<Context>`. Interior state sits
/// behind locks so middleware and business logic can share one context.
///
/// # Example
///
/// ```
/// use talos_core::Context;
///
/// let ctx = Context::builder().environment("staging").build();
/// ctx.storage().insert("tenant", String::from("acme"));
///
/// assert_eq!(ctx.environment(), "staging");
/// assert!(!ctx.is_network());
/// ```
pub struct Context {
    id: ContextId,
    created_at: DateTime<Utc>,
    started: Instant,
    environment: String,
    storage: Mutex<StorageMap>,
    span: Span,
    service: OnceLock<Weak<Service>>,
    exchange: Option<Exchange>,
    outcome: OnceLock<OutcomeKind>,
}

impl Context {
    /// Starts building a context.
    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Returns the context ID.
    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Wall-clock time at which the context was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The environment this invocation runs in.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Locks the context's scratch storage.
    ///
    /// The guard must not be held across an `.await`.
    pub fn storage(&self) -> MutexGuard<'_, StorageMap> {
        self.storage.lock()
    }

    /// The tracing span for this invocation.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Records the owning service. Only the first call has any effect.
    pub fn bind_service(&self, service: &Arc<Service>) -> bool {
        self.service.set(Arc::downgrade(service)).is_ok()
    }

    /// The service running this invocation, once bound and still alive.
    #[must_use]
    pub fn service(&self) -> Option<Arc<Service>> {
        self.service.get().and_then(Weak::upgrade)
    }

    /// Returns `true` when this context carries a network request.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        self.exchange.is_some()
    }

    /// The network request, if any.
    #[must_use]
    pub fn request(&self) -> Option<&http::Request<Bytes>> {
        self.exchange.as_ref().map(|exchange| &exchange.request)
    }

    /// Stores the response for a network request, replacing an earlier one.
    ///
    /// Returns `false` and drops the response when there is no request.
    pub fn respond(&self, response: http::Response<Bytes>) -> bool {
        match &self.exchange {
            Some(exchange) => {
                *exchange.response.lock() = Some(response);
                true
            }
            None => false,
        }
    }

    /// Returns `true` once a response has been written.
    #[must_use]
    pub fn has_response(&self) -> bool {
        self.exchange
            .as_ref()
            .is_some_and(|exchange| exchange.response.lock().is_some())
    }

    /// Removes and returns the written response.
    pub fn take_response(&self) -> Option<http::Response<Bytes>> {
        self.exchange
            .as_ref()
            .and_then(|exchange| exchange.response.lock().take())
    }

    /// Records how the invocation ended. Only the first call has any effect.
    pub fn record_outcome(&self, kind: OutcomeKind) -> bool {
        self.outcome.set(kind).is_ok()
    }

    /// How the invocation ended, once known.
    #[must_use]
    pub fn outcome(&self) -> Option<OutcomeKind> {
        self.outcome.get().copied()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("environment", &self.environment)
            .field("network", &self.is_network())
            .field("outcome", &self.outcome())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Context`].
#[derive(Debug, Default)]
pub struct ContextBuilder {
    id: Option<ContextId>,
    environment: Option<String>,
    request: Option<http::Request<Bytes>>,
}

impl ContextBuilder {
    /// Uses a specific context ID instead of a fresh one.
    pub fn id(mut self, id: ContextId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the environment. Defaults to [`DEFAULT_ENVIRONMENT`].
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Attaches a network request.
    pub fn request(mut self, request: http::Request<Bytes>) -> Self {
        self.request = Some(request);
        self
    }

    /// Builds the context and its tracing span.
    pub fn build(self) -> Arc<Context> {
        let id = self.id.unwrap_or_default();
        let span = tracing::info_span!(
            "invocation",
            context_id = %id,
            operation = Empty,
            service = Empty,
        );

        Arc::new(Context {
            id,
            created_at: Utc::now(),
            started: Instant::now(),
            environment: self
                .environment
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            storage: Mutex::new(StorageMap::new()),
            span,
            service: OnceLock::new(),
            exchange: self.request.map(Exchange::new),
            outcome: OnceLock::new(),
        })
    }
}
