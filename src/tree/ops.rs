//! Structural mutations.
//!
//! Every `apply_*` function takes the held [`WriterGuard`] as proof that the
//! caller owns the tree lock, runs all of its checks, and only then splices.
//! Splices lock the parent (or link source) before the child (or link
//! target). The cache is invalidated before the function returns so no
//! stale resolution survives a change, including inside transactions.

use rustc_hash::FxHashSet;
use tracing::debug;

use super::Tree;
use crate::address::{self, Identifier};
use crate::model::{
    Attachment, ElementKind, Node, Reference, ReferenceKind, TreeAction, TreeEvent,
};
use crate::primitives::concurrency::WriterGuard;
use crate::types::{ModelError, NodeId, Result};

pub(crate) type Applied<T> = (T, Option<TreeEvent>);

impl Tree {
    /// Creates an element, optionally attached under `parent`.
    ///
    /// The new node's address is `parent.address/identifier`, or just the
    /// identifier when it starts out detached.
    ///
    /// # Errors
    /// * `ModelError::InvalidArgument` - malformed identifier
    /// * `ModelError::NotFound` - unknown parent
    /// * `ModelError::AlreadyExists` - parent already uses the identifier
    /// * `ModelError::Locked` - the tree lock was not acquired in time
    pub fn create_element(
        &self,
        parent: Option<NodeId>,
        identifier: &str,
        kind: ElementKind,
        attachment: Option<Attachment>,
    ) -> Result<NodeId> {
        self.write_one(|tree, write| {
            tree.apply_create_element(write, parent, identifier, kind, attachment)
        })
    }

    /// Creates a Structure element.
    pub fn create_structure_element(&self, parent: Option<NodeId>, identifier: &str) -> Result<NodeId> {
        self.create_element(parent, identifier, ElementKind::Structure, None)
    }

    /// Creates a Service element carrying its service implementation.
    pub fn create_service_element(
        &self,
        parent: Option<NodeId>,
        identifier: &str,
        service: Option<Attachment>,
    ) -> Result<NodeId> {
        self.create_element(parent, identifier, ElementKind::Service, service)
    }

    /// Creates an Event element carrying its event sender.
    pub fn create_event_element(
        &self,
        parent: Option<NodeId>,
        identifier: &str,
        sender: Option<Attachment>,
    ) -> Result<NodeId> {
        self.create_element(parent, identifier, ElementKind::Event, sender)
    }

    /// Attaches a detached `child` under `parent`.
    ///
    /// Re-addresses `child` and its whole Child subtree below the parent's
    /// address.
    ///
    /// # Errors
    /// * `ModelError::NotFound` - unknown parent or child
    /// * `ModelError::AlreadyExists` - parent already references the child
    ///   or uses its identifier
    /// * `ModelError::BadRequest` - child is the root, already has a parent,
    ///   or the edge would close a cycle
    /// * `ModelError::Locked` - the tree lock was not acquired in time
    pub fn add_element(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.write_one(|tree, write| tree.apply_add_element(write, parent, child))
    }

    /// Detaches `child` from `parent`.
    ///
    /// The detached subtree keeps its now stale addresses.
    ///
    /// # Errors
    /// * `ModelError::NotFound` - no child edge from parent to child
    /// * `ModelError::BadRequest` - child or one of its descendants is the
    ///   target of a link
    /// * `ModelError::Locked` - the tree lock was not acquired in time
    pub fn remove_element(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.write_one(|tree, write| tree.apply_remove_element(write, parent, child))
    }

    /// Adds a link from `source` to `target`.
    ///
    /// The link is named `identifier`, or the target's identifier when none
    /// is given. Addresses do not change.
    ///
    /// # Errors
    /// * `ModelError::NotFound` - unknown source or target
    /// * `ModelError::InvalidArgument` - malformed identifier
    /// * `ModelError::AlreadyExists` - source already references the target
    ///   or uses the identifier
    /// * `ModelError::BadRequest` - self-link or cycle
    /// * `ModelError::Locked` - the tree lock was not acquired in time
    pub fn add_link(&self, source: NodeId, target: NodeId, identifier: Option<&str>) -> Result<()> {
        self.write_one(|tree, write| tree.apply_add_link(write, source, target, identifier))
    }

    /// Removes the link from `source` to `target` and returns its identifier.
    ///
    /// # Errors
    /// * `ModelError::NotFound` - no such link
    /// * `ModelError::Locked` - the tree lock was not acquired in time
    pub fn remove_link(&self, source: NodeId, target: NodeId) -> Result<Identifier> {
        self.write_one(|tree, write| tree.apply_remove_link(write, source, LinkSelector::Target(target)))
    }

    /// Removes the link of `source` named `identifier` and returns the
    /// identifier as stored.
    ///
    /// # Errors
    /// * `ModelError::NotFound` - no link with that identifier
    /// * `ModelError::Locked` - the tree lock was not acquired in time
    pub fn remove_link_by_identifier(&self, source: NodeId, identifier: &str) -> Result<Identifier> {
        self.write_one(|tree, write| {
            tree.apply_remove_link(write, source, LinkSelector::Identifier(identifier))
        })
    }

    /// Drops a detached node and its Child subtree from the arena.
    ///
    /// Links leaving the subtree are unwired first. Returns the number of
    /// nodes reclaimed.
    ///
    /// # Errors
    /// * `ModelError::NotFound` - unknown node
    /// * `ModelError::BadRequest` - the node is the root, is attached, or
    ///   something outside the subtree still links into it
    /// * `ModelError::Locked` - the tree lock was not acquired in time
    pub fn discard_element(&self, node: NodeId) -> Result<usize> {
        self.write_one(|tree, write| tree.apply_discard_element(write, node))
    }

    pub(crate) fn apply_create_element(
        &self,
        _write: &WriterGuard<'_>,
        parent: Option<NodeId>,
        identifier: &str,
        kind: ElementKind,
        attachment: Option<Attachment>,
    ) -> Result<Applied<NodeId>> {
        let identifier = Identifier::new(identifier)?;
        let Some(parent) = parent else {
            let id = self.allocate_id();
            let address = identifier.as_str().to_string();
            self.insert_slot(Node::new(id, identifier, kind, address, attachment));
            debug!(node = %id, %kind, "detached element created");
            return Ok((id, None));
        };

        let parent_slot = self.require(parent)?;
        {
            let state = parent_slot.state.lock();
            if state.forward_named(identifier.as_str()).is_some() {
                return Err(ModelError::AlreadyExists(format!(
                    "{} already has a reference named {identifier}",
                    state.address
                )));
            }
        }

        let id = self.allocate_id();
        let address = address::join(&parent_slot.state.lock().address, identifier.as_str());
        self.insert_slot(Node::new(id, identifier.clone(), kind, address, attachment));
        self.wire_child(parent, id, identifier.clone());
        self.invalidate_cache();
        debug!(parent = %parent, node = %id, %identifier, %kind, "element created");
        let event = TreeEvent::new(TreeAction::ChildAdded, parent)
            .with_target(id)
            .with_identifier(identifier);
        Ok((id, Some(event)))
    }

    pub(crate) fn apply_add_element(
        &self,
        _write: &WriterGuard<'_>,
        parent: NodeId,
        child: NodeId,
    ) -> Result<Applied<()>> {
        let parent_slot = self.require(parent)?;
        let child_slot = self.require(child)?;
        let identifier = child_slot.identifier.clone();
        {
            let state = parent_slot.state.lock();
            if state.forward_to(child).is_some() {
                return Err(ModelError::AlreadyExists(format!(
                    "{} already references {child}",
                    state.address
                )));
            }
            if state.forward_named(identifier.as_str()).is_some() {
                return Err(ModelError::AlreadyExists(format!(
                    "{} already has a reference named {identifier}",
                    state.address
                )));
            }
        }
        if child.is_root() {
            return Err(ModelError::BadRequest("the root cannot be attached".into()));
        }
        if let Some(existing) = child_slot.state.lock().parent {
            return Err(ModelError::BadRequest(format!(
                "{child} already has parent {existing}; detach it first"
            )));
        }
        if self.reaches(child, parent) {
            return Err(ModelError::BadRequest(format!(
                "attaching {child} under {parent} would create a cycle"
            )));
        }

        let rewritten = self.wire_child(parent, child, identifier.clone());
        self.invalidate_cache();
        debug!(parent = %parent, child = %child, %identifier, rewritten, "child added");
        let event = TreeEvent::new(TreeAction::ChildAdded, parent)
            .with_target(child)
            .with_identifier(identifier);
        Ok(((), Some(event)))
    }

    /// Splices a Child edge. Checks must already have passed.
    ///
    /// Returns the number of descendants whose address was rewritten.
    pub(crate) fn wire_child(&self, parent: NodeId, child: NodeId, identifier: Identifier) -> usize {
        let (Some(parent_slot), Some(child_slot)) = (self.slot(parent), self.slot(child)) else {
            return 0;
        };
        let (forward, inverse) = Reference::pair(identifier, parent, child, ReferenceKind::Child);
        let mut parent_state = parent_slot.state.lock();
        let (base, grandchildren) = {
            let mut child_state = child_slot.state.lock();
            child_state.parent = Some(parent);
            child_state.inverse.push(inverse);
            child_state.address =
                address::join(&parent_state.address, child_slot.identifier.as_str());
            let grandchildren: Vec<NodeId> = child_state.child_targets().collect();
            (child_state.address.clone(), grandchildren)
        };
        let rewritten = self.readdress(grandchildren, base);
        parent_state.forward.push(forward);
        self.metrics().child_added();
        rewritten
    }

    pub(crate) fn apply_remove_element(
        &self,
        _write: &WriterGuard<'_>,
        parent: NodeId,
        child: NodeId,
    ) -> Result<Applied<()>> {
        let parent_slot = self.require(parent)?;
        let child_slot = self.require(child)?;
        let identifier = {
            let state = parent_slot.state.lock();
            state
                .forward_to(child)
                .filter(|r| r.is_child())
                .map(|r| r.identifier().clone())
                .ok_or_else(|| {
                    ModelError::NotFound(format!("{} has no child {child}", state.address))
                })?
        };
        let subtree = self.child_subtree(child);
        if let Some(linked) = self.linked_node_in_subtree(&subtree, None) {
            return Err(ModelError::BadRequest(format!(
                "cannot detach {child}: {linked} is the target of a link"
            )));
        }

        {
            let mut parent_state = parent_slot.state.lock();
            let mut child_state = child_slot.state.lock();
            child_state.remove_inverse(parent, ReferenceKind::Child);
            child_state.parent = None;
            parent_state.remove_forward(child, ReferenceKind::Child);
        }
        self.metrics().child_removed();
        self.invalidate_cache();
        debug!(parent = %parent, child = %child, %identifier, "child removed");
        let event = TreeEvent::new(TreeAction::ChildRemoved, parent)
            .with_target(child)
            .with_identifier(identifier);
        Ok(((), Some(event)))
    }

    pub(crate) fn apply_add_link(
        &self,
        _write: &WriterGuard<'_>,
        source: NodeId,
        target: NodeId,
        identifier: Option<&str>,
    ) -> Result<Applied<()>> {
        let source_slot = self.require(source)?;
        let target_slot = self.require(target)?;
        let identifier = match identifier {
            Some(raw) => Identifier::new(raw)?,
            None => target_slot.identifier.clone(),
        };
        {
            let state = source_slot.state.lock();
            if state.forward_to(target).is_some() {
                return Err(ModelError::AlreadyExists(format!(
                    "{} already references {target}",
                    state.address
                )));
            }
            if state.forward_named(identifier.as_str()).is_some() {
                return Err(ModelError::AlreadyExists(format!(
                    "{} already has a reference named {identifier}",
                    state.address
                )));
            }
        }
        if source == target {
            return Err(ModelError::BadRequest(format!("{source} cannot link to itself")));
        }
        if self.reaches(target, source) {
            return Err(ModelError::BadRequest(format!(
                "linking {source} to {target} would create a cycle"
            )));
        }

        let (forward, inverse) =
            Reference::pair(identifier.clone(), source, target, ReferenceKind::Link);
        {
            let mut source_state = source_slot.state.lock();
            let mut target_state = target_slot.state.lock();
            target_state.inverse.push(inverse);
            source_state.forward.push(forward);
        }
        self.metrics().link_added();
        self.invalidate_cache();
        debug!(source = %source, target = %target, %identifier, "link added");
        let event = TreeEvent::new(TreeAction::LinkAdded, source)
            .with_target(target)
            .with_identifier(identifier);
        Ok(((), Some(event)))
    }

    pub(crate) fn apply_remove_link(
        &self,
        _write: &WriterGuard<'_>,
        source: NodeId,
        selector: LinkSelector<'_>,
    ) -> Result<Applied<Identifier>> {
        let source_slot = self.require(source)?;
        let (target, identifier) = {
            let state = source_slot.state.lock();
            let found = match selector {
                LinkSelector::Target(target) => state.forward_to(target),
                LinkSelector::Identifier(name) => state.forward_named(name),
            };
            match found.filter(|r| r.is_link()) {
                Some(reference) => (reference.target(), reference.identifier().clone()),
                None => {
                    return Err(ModelError::NotFound(format!(
                        "{} has no link {selector}",
                        state.address
                    )))
                }
            }
        };

        self.unwire_link(&source_slot, target);
        self.invalidate_cache();
        debug!(source = %source, target = %target, %identifier, "link removed");
        let event = TreeEvent::new(TreeAction::LinkRemoved, source)
            .with_target(target)
            .with_identifier(identifier.clone());
        Ok((identifier, Some(event)))
    }

    fn unwire_link(&self, source_slot: &Node, target: NodeId) {
        let mut source_state = source_slot.state.lock();
        if let Some(target_slot) = self.slot(target) {
            target_slot
                .state
                .lock()
                .remove_inverse(source_slot.id, ReferenceKind::Link);
        }
        source_state.remove_forward(target, ReferenceKind::Link);
        self.metrics().link_removed();
    }

    pub(crate) fn apply_discard_element(
        &self,
        _write: &WriterGuard<'_>,
        node: NodeId,
    ) -> Result<Applied<usize>> {
        let slot = self.require(node)?;
        if node.is_root() {
            return Err(ModelError::BadRequest("the root cannot be discarded".into()));
        }
        if let Some(parent) = slot.state.lock().parent {
            return Err(ModelError::BadRequest(format!(
                "{node} is attached under {parent}; detach it first"
            )));
        }
        let subtree = self.child_subtree(node);
        let members: FxHashSet<NodeId> = subtree.iter().copied().collect();
        if let Some(linked) = self.linked_node_in_subtree(&subtree, Some(&members)) {
            return Err(ModelError::BadRequest(format!(
                "cannot discard {node}: {linked} is still linked from outside"
            )));
        }

        for id in &subtree {
            let Some(member) = self.slot(*id) else {
                continue;
            };
            let outgoing: Vec<NodeId> = member
                .state
                .lock()
                .forward
                .iter()
                .filter(|r| r.is_link() && !members.contains(&r.target()))
                .map(Reference::target)
                .collect();
            for target in outgoing {
                self.unwire_link(&member, target);
            }
        }
        for id in &subtree {
            self.remove_slot(*id);
        }
        self.invalidate_cache();
        debug!(node = %node, reclaimed = subtree.len(), "detached subtree discarded");
        Ok((subtree.len(), None))
    }
}

/// Selects the link to remove from a source node.
#[derive(Clone, Copy, Debug)]
pub(crate) enum LinkSelector<'a> {
    Target(NodeId),
    Identifier(&'a str),
}

impl std::fmt::Display for LinkSelector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkSelector::Target(target) => write!(f, "to {target}"),
            LinkSelector::Identifier(name) => write!(f, "named {name}"),
        }
    }
}
