use std::sync::atomic::{AtomicU64, Ordering};

/// Trait for tracking structural operations and lookup behaviour of a tree.
///
/// Implementations collect statistics about element creation, edge wiring,
/// address cache efficiency and lock contention.
pub trait TreeMetrics: Send + Sync {
    /// Records the creation of a new element.
    fn element_created(&self);

    /// Records the discarding of a detached element.
    fn element_discarded(&self);

    /// Records a child edge being wired.
    fn child_added(&self);

    /// Records a child edge being unwired.
    fn child_removed(&self);

    /// Records a link edge being wired.
    fn link_added(&self);

    /// Records a link edge being unwired.
    fn link_removed(&self);

    /// Records an address lookup.
    ///
    /// # Parameters
    /// * `cached` - Whether the result was served from the address cache.
    fn address_lookup(&self, cached: bool);

    /// Records a wholesale cache invalidation.
    fn cache_invalidated(&self);

    /// Records a failed lock acquisition.
    fn lock_timeout(&self);

    /// Records observer failures from one notification.
    fn observer_failures(&self, count: usize);
}

/// A no-op implementation of [`TreeMetrics`].
#[derive(Default)]
pub struct NoopMetrics;

impl TreeMetrics for NoopMetrics {
    fn element_created(&self) {}
    fn element_discarded(&self) {}
    fn child_added(&self) {}
    fn child_removed(&self) {}
    fn link_added(&self) {}
    fn link_removed(&self) {}
    fn address_lookup(&self, _cached: bool) {}
    fn cache_invalidated(&self) {}
    fn lock_timeout(&self) {}
    fn observer_failures(&self, _count: usize) {}
}

/// A thread-safe counter-based implementation of [`TreeMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Number of elements created.
    pub elements_created: AtomicU64,
    /// Number of elements discarded.
    pub elements_discarded: AtomicU64,
    /// Number of child edges wired.
    pub children_added: AtomicU64,
    /// Number of child edges unwired.
    pub children_removed: AtomicU64,
    /// Number of link edges wired.
    pub links_added: AtomicU64,
    /// Number of link edges unwired.
    pub links_removed: AtomicU64,
    /// Number of lookups served from the cache.
    pub cache_hits: AtomicU64,
    /// Number of lookups that walked the tree.
    pub cache_misses: AtomicU64,
    /// Number of wholesale cache invalidations.
    pub cache_invalidations: AtomicU64,
    /// Number of lock acquisitions that timed out.
    pub lock_timeouts: AtomicU64,
    /// Number of individual observer failures.
    pub observer_failures: AtomicU64,
}

impl TreeMetrics for CounterMetrics {
    fn element_created(&self) {
        self.elements_created.fetch_add(1, Ordering::Relaxed);
    }

    fn element_discarded(&self) {
        self.elements_discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn child_added(&self) {
        self.children_added.fetch_add(1, Ordering::Relaxed);
    }

    fn child_removed(&self) {
        self.children_removed.fetch_add(1, Ordering::Relaxed);
    }

    fn link_added(&self) {
        self.links_added.fetch_add(1, Ordering::Relaxed);
    }

    fn link_removed(&self) {
        self.links_removed.fetch_add(1, Ordering::Relaxed);
    }

    fn address_lookup(&self, cached: bool) {
        if cached {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn cache_invalidated(&self) {
        self.cache_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    fn lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn observer_failures(&self, count: usize) {
        self.observer_failures
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

