//! Application-wide resources with setup and cleanup hooks.

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};

use crate::app::App;

/// A provider hook.
pub type ProviderHook = Arc<dyn Fn(&App) -> anyhow::Result<()> + Send + Sync>;

/// A resource the application sets up before its services start and
/// cleans up after they stop, such as a connection pool stored in
/// [`App::storage`].
///
/// Setup runs in declaration order, cleanup in reverse.
///
/// ```rust
/// use talos::Provider;
///
/// let provider = Provider::new("feature flags")
///     .setup(|app| {
///         app.storage().write().insert("flags", vec!["beta-checkout"]);
///         Ok(())
///     })
///     .cleanup(|app| {
///         app.storage().write().remove("flags");
///         Ok(())
///     });
///
/// assert_eq!(provider.about(), "feature flags");
/// assert!(provider.invoked_at().is_none());
/// ```
#[derive(Clone)]
pub struct Provider {
    about: String,
    setup: Option<ProviderHook>,
    cleanup: Option<ProviderHook>,
    invoked_at: Arc<OnceLock<DateTime<Utc>>>,
}

impl Provider {
    /// Creates a provider with no hooks.
    pub fn new(about: impl Into<String>) -> Self {
        Self {
            about: about.into(),
            setup: None,
            cleanup: None,
            invoked_at: Arc::new(OnceLock::new()),
        }
    }

    /// Sets the setup hook.
    pub fn setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&App) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(hook));
        self
    }

    /// Sets the cleanup hook.
    pub fn cleanup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&App) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(hook));
        self
    }

    /// Description used in logs and errors.
    #[must_use]
    pub fn about(&self) -> &str {
        &self.about
    }

    /// When setup ran, if it has.
    #[must_use]
    pub fn invoked_at(&self) -> Option<DateTime<Utc>> {
        self.invoked_at.get().copied()
    }

    pub(crate) fn run_setup(&self, app: &App) -> anyhow::Result<()> {
        if let Some(hook) = &self.setup {
            hook(app)?;
        }
        let _ = self.invoked_at.set(Utc::now());
        Ok(())
    }

    pub(crate) fn run_cleanup(&self, app: &App) -> anyhow::Result<()> {
        match &self.cleanup {
            Some(hook) => hook(app),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("about", &self.about)
            .field("has_setup", &self.setup.is_some())
            .field("has_cleanup", &self.cleanup.is_some())
            .field("invoked_at", &self.invoked_at.get())
            .finish()
    }
}
