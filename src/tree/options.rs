use std::sync::Arc;
use std::time::Duration;

use super::metrics::TreeMetrics;

/// Default identifier of the root node.
pub const DEFAULT_ROOT_IDENTIFIER: &str = "device";
/// Default bound on waiting for the tree lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of memoised address resolutions.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Configuration options supplied when creating a [`super::Tree`].
#[derive(Clone)]
pub struct TreeOptions {
    /// Identifier of the root node; rootless addresses are resolved under it.
    pub root_identifier: String,
    /// Maximum wait for the tree lock before failing with `Locked`.
    pub lock_timeout: Duration,
    /// Whether address resolutions are memoised.
    pub cache_enabled: bool,
    /// Upper bound on memoised resolutions.
    pub cache_capacity: usize,
    /// Optional metrics collection implementation.
    pub metrics: Option<Arc<dyn TreeMetrics>>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self {
            root_identifier: DEFAULT_ROOT_IDENTIFIER.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            cache_enabled: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            metrics: None,
        }
    }

    /// Sets the root identifier.
    pub fn root_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.root_identifier = identifier.into();
        self
    }

    /// Sets the lock acquisition timeout.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Enables or disables the address cache.
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Sets the address cache capacity.
    pub fn cache_capacity(mut self, entries: usize) -> Self {
        self.cache_capacity = entries;
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn TreeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}
