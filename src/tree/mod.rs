//! The tree manager.
//!
//! [`Tree`] owns every node of one device model in an arena keyed by
//! [`NodeId`]. Parents and references store ids, never owning handles, so
//! the parent/child back-pointers form no ownership cycle.
//!
//! Structural mutation is serialised by a single [`StructureLock`] with a
//! bounded wait. Each node additionally guards its own mutable state so a
//! two-node splice is atomic with respect to lock-free readers: address
//! resolution and the other lookups never take the tree lock.
//!
//! Every mutating call validates its request completely before touching any
//! node. An error therefore always leaves the tree as it was.
//!
//! # Example
//!
//! ```rust
//! use devtree::{ElementKind, Tree};
//!
//! let tree = Tree::new();
//! let sensors = tree.create_structure_element(Some(tree.root()), "sensors")?;
//! let temp = tree.create_element(Some(sensors), "temp", ElementKind::Data, None)?;
//! assert_eq!(tree.get_element_by_address("/sensors/temp"), Some(temp));
//! # Ok::<(), devtree::ModelError>(())
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{trace, warn};

use crate::address::{self, Identifier};
use crate::model::{
    Attachment, ElementKind, Node, NodeSnapshot, Reference, TreeAction, TreeEvent, TreeObserver,
};
use crate::primitives::concurrency::{LockSnapshot, ReaderGuard, StructureLock, WriterGuard};
use crate::types::{ModelError, NodeId, NotificationError, Result, SubscriptionId};

mod cache;
mod elements;
mod metrics;
mod ops;
mod options;
mod transaction;
mod verify;
mod walk;


pub use cache::AddressCache;
pub use elements::{DataElementOptions, DATA_CHANGED_EVENT, GET_DATA_SERVICE, SET_DATA_SERVICE};
pub use metrics::{CounterMetrics, NoopMetrics, TreeMetrics};
pub use options::{
    TreeOptions, DEFAULT_CACHE_CAPACITY, DEFAULT_LOCK_TIMEOUT, DEFAULT_ROOT_IDENTIFIER,
};
pub use transaction::{ReadTransaction, WriteTransaction};
pub use verify::{VerifyCounts, VerifyFinding, VerifyReport};

/// A concurrent, addressable device tree.
///
/// `Tree` is `Send + Sync`; share it between threads with an `Arc`.
pub struct Tree {
    nodes: DashMap<NodeId, Arc<Node>>,
    root_identifier: Identifier,
    lock: StructureLock,
    cache: AddressCache,
    metrics: Arc<dyn TreeMetrics>,
    next_node: AtomicU64,
    next_subscription: AtomicU64,
    // observers registered on any live node
    subscribed: AtomicUsize,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Creates a tree with default options and a Structure root named
    /// [`DEFAULT_ROOT_IDENTIFIER`].
    pub fn new() -> Self {
        Self::build(
            TreeOptions::new(),
            Identifier::trusted(DEFAULT_ROOT_IDENTIFIER),
        )
    }

    /// Creates a tree from explicit options.
    ///
    /// # Errors
    /// * `ModelError::InvalidArgument` - the root identifier is malformed
    pub fn with_options(options: TreeOptions) -> Result<Self> {
        let root_identifier = Identifier::new(options.root_identifier.clone())?;
        Ok(Self::build(options, root_identifier))
    }

    fn build(options: TreeOptions, root_identifier: Identifier) -> Self {
        let nodes = DashMap::new();
        let root = Node::new(
            NodeId::ROOT,
            root_identifier.clone(),
            ElementKind::Structure,
            root_identifier.as_str().to_string(),
            None,
        );
        nodes.insert(NodeId::ROOT, Arc::new(root));
        Self {
            nodes,
            root_identifier,
            lock: StructureLock::new(options.lock_timeout),
            cache: AddressCache::new(options.cache_capacity, options.cache_enabled),
            metrics: options
                .metrics
                .unwrap_or_else(|| Arc::new(NoopMetrics) as Arc<dyn TreeMetrics>),
            next_node: AtomicU64::new(NodeId::ROOT.0 + 1),
            next_subscription: AtomicU64::new(1),
            subscribed: AtomicUsize::new(0),
        }
    }

    /// Id of the root node.
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Identifier of the root node.
    pub fn root_identifier(&self) -> &Identifier {
        &self.root_identifier
    }

    /// Number of nodes in the arena, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if `id` names a live arena slot.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// The address cache, for inspection.
    pub fn cache(&self) -> &AddressCache {
        &self.cache
    }

    /// Current state of the tree lock.
    pub fn lock_snapshot(&self) -> LockSnapshot {
        self.lock.snapshot()
    }

    pub(crate) fn slot(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn require(&self, id: NodeId) -> Result<Arc<Node>> {
        self.slot(id).ok_or_else(|| ModelError::unknown_node(id))
    }

    pub(crate) fn allocate_id(&self) -> NodeId {
        NodeId(self.next_node.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert_slot(&self, node: Node) {
        self.nodes.insert(node.id, Arc::new(node));
        self.metrics.element_created();
    }

    pub(crate) fn remove_slot(&self, id: NodeId) {
        if let Some((_, node)) = self.nodes.remove(&id) {
            let dropped = node.observers.clear();
            self.subscribed.fetch_sub(dropped, Ordering::AcqRel);
            self.metrics.element_discarded();
        }
    }

    pub(crate) fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn metrics(&self) -> &dyn TreeMetrics {
        self.metrics.as_ref()
    }

    pub(crate) fn invalidate_cache(&self) {
        self.cache.invalidate();
        self.metrics.cache_invalidated();
    }

    pub(crate) fn acquire_writer(&self) -> Result<WriterGuard<'_>> {
        self.lock.acquire_writer().map_err(|err| {
            self.metrics.lock_timeout();
            err
        })
    }

    pub(crate) fn acquire_reader(&self) -> Result<ReaderGuard<'_>> {
        self.lock.acquire_reader().map_err(|err| {
            self.metrics.lock_timeout();
            err
        })
    }

    /// Begins a write transaction holding the tree lock exclusively.
    ///
    /// # Errors
    /// * `ModelError::Locked` - the lock was not acquired in time
    pub fn begin_write(&self) -> Result<WriteTransaction<'_>> {
        let guard = self.acquire_writer()?;
        Ok(WriteTransaction::new(self, guard))
    }

    /// Begins a read transaction holding the tree lock shared.
    ///
    /// # Errors
    /// * `ModelError::Locked` - the lock was not acquired in time
    pub fn begin_read(&self) -> Result<ReadTransaction<'_>> {
        let guard = self.acquire_reader()?;
        Ok(ReadTransaction::new(self, guard))
    }

    /// Resolves an address to a node.
    ///
    /// Accepts rooted (`device/a/b`) and rootless (`/a/b`) forms, compares
    /// identifiers case-insensitively and follows links as well as children.
    /// Returns `None` when any segment fails to resolve. Successful
    /// resolutions are memoised until the next structural change.
    pub fn get_element_by_address(&self, address: &str) -> Option<NodeId> {
        let rooted = address::normalize(address, self.root_identifier.as_str());
        let key = address::cache_key(&rooted);
        if let Some(hit) = self.cache.get(&key) {
            if self.contains(hit) {
                self.metrics.address_lookup(true);
                trace!(address = %rooted, node = %hit, "address cache hit");
                return Some(hit);
            }
        }
        self.metrics.address_lookup(false);
        let epoch = self.cache.epoch();
        let mut segments = address::split(&rooted);
        let first = segments.next()?;
        if !self.root_identifier.matches(first) {
            return None;
        }
        let mut current = NodeId::ROOT;
        for segment in segments {
            current = self.get_child_by_identifier(current, segment)?;
        }
        trace!(address = %rooted, node = %current, "address resolved");
        self.cache.put(key, current, epoch);
        Some(current)
    }

    /// Returns the target of `node`'s forward reference named `identifier`,
    /// child or link.
    pub fn get_child_by_identifier(&self, node: NodeId, identifier: &str) -> Option<NodeId> {
        let slot = self.slot(node)?;
        let state = slot.state.lock();
        state.forward_named(identifier).map(Reference::target)
    }

    /// Point-in-time copy of a node.
    pub fn node(&self, id: NodeId) -> Option<NodeSnapshot> {
        self.slot(id).map(|node| node.snapshot())
    }

    /// Canonical address of a node.
    ///
    /// The address of a detached node is stale and only meaningful relative
    /// to its own detached subtree.
    pub fn address(&self, id: NodeId) -> Result<String> {
        Ok(self.require(id)?.state.lock().address.clone())
    }

    /// Identifier of a node.
    pub fn identifier(&self, id: NodeId) -> Result<Identifier> {
        Ok(self.require(id)?.identifier.clone())
    }

    /// Element kind of a node.
    pub fn kind(&self, id: NodeId) -> Result<ElementKind> {
        Ok(self.require(id)?.kind)
    }

    /// Owning parent of a node, `None` for the root and detached nodes.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.require(id)?.state.lock().parent)
    }

    /// Collaborator attachment of a node.
    pub fn attachment(&self, id: NodeId) -> Result<Option<Attachment>> {
        Ok(self.require(id)?.attachment.clone())
    }

    /// Forward references (children and links) in insertion order.
    pub fn forward_references(&self, id: NodeId) -> Result<Vec<Reference>> {
        Ok(self.require(id)?.state.lock().forward.to_vec())
    }

    /// Inverse references (parent edge and incoming links).
    pub fn inverse_references(&self, id: NodeId) -> Result<Vec<Reference>> {
        Ok(self.require(id)?.state.lock().inverse.to_vec())
    }

    /// Child edges in insertion order.
    pub fn children(&self, id: NodeId) -> Result<Vec<Reference>> {
        let node = self.require(id)?;
        let state = node.state.lock();
        Ok(state.forward.iter().filter(|r| r.is_child()).cloned().collect())
    }

    /// Link edges in insertion order.
    pub fn links(&self, id: NodeId) -> Result<Vec<Reference>> {
        let node = self.require(id)?;
        let state = node.state.lock();
        Ok(state.forward.iter().filter(|r| r.is_link()).cloned().collect())
    }

    /// Child descendants of a node in depth-first pre-order, excluding the
    /// node itself.
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.require(id)?;
        let mut subtree = self.child_subtree(id);
        subtree.remove(0);
        Ok(subtree)
    }

    /// Registers an observer on a node's change event.
    ///
    /// The observer sees changes whose source is the node or any of its
    /// Child descendants.
    pub fn subscribe(&self, node: NodeId, observer: Arc<dyn TreeObserver>) -> Result<SubscriptionId> {
        let slot = self.require(node)?;
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribed.fetch_add(1, Ordering::AcqRel);
        slot.observers.add(id, observer);
        Ok(id)
    }

    /// Number of observers registered directly on a node.
    pub fn observer_count(&self, node: NodeId) -> usize {
        self.slot(node).map_or(0, |slot| slot.observers.len())
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn unsubscribe(&self, node: NodeId, subscription: SubscriptionId) -> bool {
        let removed = self
            .slot(node)
            .map(|slot| slot.observers.remove(subscription))
            .unwrap_or(false);
        if removed {
            self.subscribed.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Number of observers registered across all live nodes.
    pub fn subscriber_count(&self) -> usize {
        self.subscribed.load(Ordering::Acquire)
    }

    /// Delivers a structural-change notification.
    ///
    /// Observers on `event.source` run first, then those on each Child
    /// ancestor up to the root. Every observer runs even if others fail; all
    /// failures are returned together. The ancestor walk costs one hop per
    /// level and is skipped while no observer is registered anywhere.
    ///
    /// # Errors
    /// * `NotificationError` - one or more observers failed or panicked
    pub fn raise_tree_changed(&self, event: TreeEvent) -> std::result::Result<(), NotificationError> {
        if self.subscribed.load(Ordering::Acquire) == 0 {
            return Ok(());
        }
        let mut failures = Vec::new();
        let mut current = Some(event.source);
        let mut hops = 0usize;
        let limit = self.nodes.len();
        while let Some(id) = current {
            let Some(node) = self.slot(id) else {
                break;
            };
            node.observers.deliver(id, &event, &mut failures);
            current = node.state.lock().parent;
            hops += 1;
            if hops > limit {
                break;
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        self.metrics.observer_failures(failures.len());
        Err(NotificationError { failures })
    }

    /// Delivers a notification produced by a completed mutation.
    ///
    /// The mutation already happened, so observer failures are logged
    /// rather than returned.
    pub(crate) fn notify(&self, event: Option<TreeEvent>) {
        let Some(event) = event else {
            return;
        };
        if let Err(err) = self.raise_tree_changed(event) {
            for failure in &err.failures {
                warn!(
                    node = %failure.node,
                    subscription = %failure.subscription,
                    error = %failure.message,
                    "tree observer failed"
                );
            }
        }
    }

    /// Runs one mutation under its own write lock and notifies afterwards.
    pub(crate) fn write_one<T>(
        &self,
        op: impl FnOnce(&Tree, &WriterGuard<'_>) -> Result<(T, Option<TreeEvent>)>,
    ) -> Result<T> {
        let (value, event) = {
            let write = self.acquire_writer()?;
            op(self, &write)?
        };
        self.notify(event);
        Ok(value)
    }

    /// Coalesced notification raised at the end of a write transaction.
    pub(crate) fn batch_event(&self) -> TreeEvent {
        TreeEvent::new(TreeAction::TreeChanged, NodeId::ROOT)
    }
}
