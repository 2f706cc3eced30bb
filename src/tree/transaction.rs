//! Lock scopes batching several tree operations.
//!
//! A [`WriteTransaction`] holds the tree lock exclusively from
//! [`Tree::begin_write`] until [`WriteTransaction::end`] (or drop). The
//! operations it exposes reuse the held lock and raise no notification of
//! their own; `end` raises a single coalesced `TreeChanged` on the root.
//!
//! There is no rollback. If an operation fails halfway through a batch, the
//! tree stays in the state left by the last operation that succeeded.
//!
//! # Example
//!
//! ```rust
//! use devtree::Tree;
//!
//! let tree = Tree::new();
//! let mut tx = tree.begin_write()?;
//! let room = tx.create_structure_element(Some(tree.root()), "room")?;
//! let lamp = tx.create_structure_element(None, "lamp")?;
//! tx.add_element(room, lamp)?;
//! tx.end()?;
//! assert_eq!(tree.address(lamp)?, "device/room/lamp");
//! # Ok::<(), devtree::ModelError>(())
//! ```

use tracing::{debug, warn};

use super::elements::DataElementOptions;
use super::ops::LinkSelector;
use super::Tree;
use crate::address::Identifier;
use crate::model::{Attachment, ElementKind};
use crate::primitives::concurrency::{ReaderGuard, WriterGuard};
use crate::types::{ModelError, NodeId, Result};

/// Exclusive lock scope over a [`Tree`].
pub struct WriteTransaction<'t> {
    tree: &'t Tree,
    guard: Option<WriterGuard<'t>>,
    operations: usize,
}

impl<'t> WriteTransaction<'t> {
    pub(crate) fn new(tree: &'t Tree, guard: WriterGuard<'t>) -> Self {
        debug!("write transaction started");
        Self {
            tree,
            guard: Some(guard),
            operations: 0,
        }
    }

    /// The tree this transaction locks, for lookups.
    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    /// Whether the lock is still held.
    pub fn is_active(&self) -> bool {
        self.guard.is_some()
    }

    /// Number of operations that succeeded so far.
    pub fn operations(&self) -> usize {
        self.operations
    }

    fn held(&self) -> Result<&WriterGuard<'t>> {
        self.guard
            .as_ref()
            .ok_or_else(|| ModelError::BadRequest("write transaction already ended".into()))
    }

    /// Creates an element. See [`Tree::create_element`].
    pub fn create_element(
        &mut self,
        parent: Option<NodeId>,
        identifier: &str,
        kind: ElementKind,
        attachment: Option<Attachment>,
    ) -> Result<NodeId> {
        let tree = self.tree;
        let (id, _) = tree.apply_create_element(self.held()?, parent, identifier, kind, attachment)?;
        self.operations += 1;
        Ok(id)
    }

    /// Creates a Structure element.
    pub fn create_structure_element(&mut self, parent: Option<NodeId>, identifier: &str) -> Result<NodeId> {
        self.create_element(parent, identifier, ElementKind::Structure, None)
    }

    /// Creates a Service element.
    pub fn create_service_element(
        &mut self,
        parent: Option<NodeId>,
        identifier: &str,
        service: Option<Attachment>,
    ) -> Result<NodeId> {
        self.create_element(parent, identifier, ElementKind::Service, service)
    }

    /// Creates an Event element.
    pub fn create_event_element(
        &mut self,
        parent: Option<NodeId>,
        identifier: &str,
        sender: Option<Attachment>,
    ) -> Result<NodeId> {
        self.create_element(parent, identifier, ElementKind::Event, sender)
    }

    /// Creates a Data element with its sub-elements. See
    /// [`Tree::create_data_element`].
    pub fn create_data_element(
        &mut self,
        parent: Option<NodeId>,
        identifier: &str,
        options: DataElementOptions,
    ) -> Result<NodeId> {
        let tree = self.tree;
        let (id, _) = tree.apply_create_data_element(self.held()?, parent, identifier, options)?;
        self.operations += 1;
        Ok(id)
    }

    /// Attaches a child. See [`Tree::add_element`].
    pub fn add_element(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let tree = self.tree;
        tree.apply_add_element(self.held()?, parent, child)?;
        self.operations += 1;
        Ok(())
    }

    /// Detaches a child. See [`Tree::remove_element`].
    pub fn remove_element(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let tree = self.tree;
        tree.apply_remove_element(self.held()?, parent, child)?;
        self.operations += 1;
        Ok(())
    }

    /// Adds a link. See [`Tree::add_link`].
    pub fn add_link(&mut self, source: NodeId, target: NodeId, identifier: Option<&str>) -> Result<()> {
        let tree = self.tree;
        tree.apply_add_link(self.held()?, source, target, identifier)?;
        self.operations += 1;
        Ok(())
    }

    /// Removes a link by target. See [`Tree::remove_link`].
    pub fn remove_link(&mut self, source: NodeId, target: NodeId) -> Result<Identifier> {
        let tree = self.tree;
        let (identifier, _) =
            tree.apply_remove_link(self.held()?, source, LinkSelector::Target(target))?;
        self.operations += 1;
        Ok(identifier)
    }

    /// Removes a link by identifier. See [`Tree::remove_link_by_identifier`].
    pub fn remove_link_by_identifier(&mut self, source: NodeId, identifier: &str) -> Result<Identifier> {
        let tree = self.tree;
        let (removed, _) =
            tree.apply_remove_link(self.held()?, source, LinkSelector::Identifier(identifier))?;
        self.operations += 1;
        Ok(removed)
    }

    /// Discards a detached subtree. See [`Tree::discard_element`].
    pub fn discard_element(&mut self, node: NodeId) -> Result<usize> {
        let tree = self.tree;
        let (count, _) = tree.apply_discard_element(self.held()?, node)?;
        self.operations += 1;
        Ok(count)
    }

    /// Releases the lock and raises one `TreeChanged` notification.
    ///
    /// Idempotent: once the lock has been released further calls do
    /// nothing and return `Ok`.
    ///
    /// # Errors
    /// * `ModelError::Notification` - observers failed; the lock is released
    ///   and the batch stays applied regardless
    pub fn end(&mut self) -> Result<()> {
        let Some(guard) = self.guard.take() else {
            return Ok(());
        };
        drop(guard);
        debug!(operations = self.operations, "write transaction ended");
        self.tree.raise_tree_changed(self.tree.batch_event())?;
        Ok(())
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.end() {
            warn!(error = %err, "notification after write transaction failed");
        }
    }
}

/// Shared lock scope over a [`Tree`].
///
/// Holding it keeps writers out, so several lookups observe one consistent
/// tree. Lookups themselves go through [`ReadTransaction::tree`].
pub struct ReadTransaction<'t> {
    tree: &'t Tree,
    guard: Option<ReaderGuard<'t>>,
}

impl<'t> ReadTransaction<'t> {
    pub(crate) fn new(tree: &'t Tree, guard: ReaderGuard<'t>) -> Self {
        Self {
            tree,
            guard: Some(guard),
        }
    }

    /// The tree this transaction locks.
    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    /// Whether the lock is still held.
    pub fn is_active(&self) -> bool {
        self.guard.is_some()
    }

    /// Releases the lock. Idempotent.
    pub fn end(&mut self) {
        self.guard.take();
    }
}
