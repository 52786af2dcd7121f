//! Literal path routing to compiled endpoint pipelines.
//!
//! A [`MountTable`] maps the full mounted path (service prefix plus
//! endpoint pattern) and an HTTP method to the endpoint's [`Pipeline`].
//! Paths are compared literally after trailing-slash normalization, so
//! `/orders/` and `/orders` are the same mount.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use talos_core::AssemblyError;
use talos_pipeline::Pipeline;

/// The result of resolving a request against a [`MountTable`].
#[derive(Debug, Clone)]
pub enum Resolution {
    /// An endpoint is mounted at the path for this method.
    Found(Arc<Pipeline>),
    /// The path is mounted, but not for this method.
    MethodNotAllowed,
    /// Nothing is mounted at the path.
    NotFound,
}

impl Resolution {
    /// Returns the pipeline if one was found.
    #[must_use]
    pub fn pipeline(&self) -> Option<&Arc<Pipeline>> {
        match self {
            Self::Found(pipeline) => Some(pipeline),
            _ => None,
        }
    }
}

/// Maps `(method, path)` pairs to endpoint pipelines.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use http::Method;
/// use talos::{MountTable, Resolution};
/// use talos_core::{fixtures, Endpoint, Service, Watchdog};
/// use talos_pipeline::Pipeline;
///
/// let service = Arc::new(
///     Service::builder("orders", "/orders")
///         .endpoint(Endpoint::builder("/").method(Method::GET).with_logic(fixtures::succeed()))
///         .build()
///         .unwrap(),
/// );
/// let endpoint = service.endpoints()[0].clone();
/// let pipeline = Pipeline::builder(service, endpoint).compile(Arc::new(Watchdog::new()));
///
/// let mut table = MountTable::new();
/// table.insert(Method::GET, "/orders/", Arc::new(pipeline)).unwrap();
///
/// assert!(matches!(table.resolve(&Method::GET, "/orders"), Resolution::Found(_)));
/// assert!(matches!(table.resolve(&Method::POST, "/orders"), Resolution::MethodNotAllowed));
/// assert!(matches!(table.resolve(&Method::GET, "/invoices"), Resolution::NotFound));
/// ```
#[derive(Debug, Default)]
pub struct MountTable {
    paths: HashMap<String, HashMap<Method, Arc<Pipeline>>>,
    mount_count: usize,
}

impl MountTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts `pipeline` for `method` at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::DuplicateRoute`] if the pair is already
    /// mounted.
    pub fn insert(
        &mut self,
        method: Method,
        path: &str,
        pipeline: Arc<Pipeline>,
    ) -> Result<(), AssemblyError> {
        let path = normalize_path(path);
        let methods = self.paths.entry(path.clone()).or_default();
        if methods.contains_key(&method) {
            return Err(AssemblyError::DuplicateRoute {
                method: method.to_string(),
                path,
            });
        }
        methods.insert(method, pipeline);
        self.mount_count += 1;
        Ok(())
    }

    /// Resolves a request method and path.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution {
        match self.paths.get(&normalize_path(path)) {
            Some(methods) => methods
                .get(method)
                .map_or(Resolution::MethodNotAllowed, |pipeline| {
                    Resolution::Found(Arc::clone(pipeline))
                }),
            None => Resolution::NotFound,
        }
    }

    /// Number of `(method, path)` mounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mount_count
    }

    /// Returns `true` if nothing is mounted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mount_count == 0
    }

    /// Mounted paths, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }
}

/// Joins a service prefix and an endpoint pattern into a mount path.
#[must_use]
pub fn join_path(prefix: &str, pattern: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let pattern = pattern.trim_start_matches('/');
    normalize_path(&format!("{prefix}/{pattern}"))
}

/// Ensures a leading `/` and strips trailing ones. `/` itself is kept.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talos_core::{fixtures, Endpoint, Service, Watchdog};

    fn pipeline(pattern: &str) -> Arc<Pipeline> {
        let service = Arc::new(
            Service::builder("orders", "/orders")
                .endpoint(
                    Endpoint::builder(pattern)
                        .method(Method::GET)
                        .with_logic(fixtures::succeed()),
                )
                .build()
                .unwrap(),
        );
        let endpoint = Arc::clone(&service.endpoints()[0]);
        Arc::new(Pipeline::builder(service, endpoint).compile(Arc::new(Watchdog::new())))
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/orders", "/"), "/orders");
        assert_eq!(join_path("/orders", "/open"), "/orders/open");
        assert_eq!(join_path("/orders/", "open/"), "/orders/open");
        assert_eq!(join_path("/", "/"), "/");
        assert_eq!(join_path("/", "health"), "/health");
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let mut table = MountTable::new();
        table.insert(Method::GET, "/orders/open/", pipeline("/open")).unwrap();

        assert!(table.resolve(&Method::GET, "/orders/open").pipeline().is_some());
        assert!(table.resolve(&Method::GET, "/orders/open/").pipeline().is_some());
    }

    #[test]
    fn test_method_not_allowed_vs_not_found() {
        let mut table = MountTable::new();
        table.insert(Method::GET, "/orders", pipeline("/")).unwrap();

        assert!(matches!(
            table.resolve(&Method::DELETE, "/orders"),
            Resolution::MethodNotAllowed
        ));
        assert!(matches!(
            table.resolve(&Method::GET, "/orders/1"),
            Resolution::NotFound
        ));
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut table = MountTable::new();
        table.insert(Method::GET, "/orders", pipeline("/")).unwrap();
        table.insert(Method::POST, "/orders", pipeline("/")).unwrap();

        let err = table
            .insert(Method::GET, "/orders/", pipeline("/"))
            .unwrap_err();
        assert_eq!(
            err,
            AssemblyError::DuplicateRoute {
                method: "GET".to_string(),
                path: "/orders".to_string(),
            }
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.paths().count(), 1);
    }

    #[test]
    fn test_empty_table() {
        let table = MountTable::new();
        assert!(table.is_empty());
        assert!(matches!(table.resolve(&Method::GET, "/"), Resolution::NotFound));
    }
}
