use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::types::NodeId;

/// Lock-free memo table from normalised address to node.
///
/// Keys are lower-cased rooted addresses. Any structural change makes the
/// whole table suspect, so invalidation clears everything and bumps an epoch.
/// A resolution computed under an older epoch is dropped instead of being
/// memoised, which keeps a walk racing with a mutation from re-inserting a
/// stale mapping after the clear.
pub struct AddressCache {
    map: DashMap<String, NodeId>,
    capacity: usize,
    enabled: bool,
    epoch: AtomicU64,
}

impl AddressCache {
    /// Creates a cache holding at most `capacity` entries.
    pub(crate) fn new(capacity: usize, enabled: bool) -> Self {
        Self {
            map: DashMap::with_capacity(if enabled { capacity.min(1024) } else { 0 }),
            capacity,
            enabled: enabled && capacity > 0,
            epoch: AtomicU64::new(0),
        }
    }

    /// Current invalidation epoch; read before starting a tree walk.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Looks up a key without blocking other readers.
    pub(crate) fn get(&self, key: &str) -> Option<NodeId> {
        if !self.enabled {
            return None;
        }
        self.map.get(key).map(|entry| *entry.value())
    }

    /// Memoises a resolution that was computed during `epoch`.
    ///
    /// Returns false if the entry was not kept.
    pub(crate) fn put(&self, key: String, node: NodeId, epoch: u64) -> bool {
        if !self.enabled || self.epoch() != epoch {
            return false;
        }
        if !self.map.contains_key(&key) {
            while self.map.len() >= self.capacity {
                if !self.evict_one() {
                    break;
                }
            }
        }
        self.map.insert(key.clone(), node);
        if self.epoch() != epoch {
            self.map.remove(&key);
            return false;
        }
        true
    }

    /// Evicts approximately one entry.
    ///
    /// Removes whichever entry iteration yields first; under concurrency
    /// this is approximate but never blocks for long.
    fn evict_one(&self) -> bool {
        let victim = self.map.iter().next().map(|entry| entry.key().clone());
        match victim {
            Some(key) => self.map.remove(&key).is_some(),
            None => false,
        }
    }

    /// Drops every entry and starts a new epoch.
    pub(crate) fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.map.clear();
    }

    /// Number of memoised entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if nothing is memoised.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether lookups are memoised at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
