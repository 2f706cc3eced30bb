use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::event::ObserverList;
use super::reference::{Reference, ReferenceKind};
use crate::address::Identifier;
use crate::types::NodeId;

/// Opaque collaborator state threaded through element construction.
///
/// Persistence handles, event senders and service implementations live here.
/// The tree never looks inside.
pub type Attachment = Arc<dyn Any + Send + Sync>;

/// Element type of a node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Pure grouping node.
    Structure,
    /// Holds a value owned by the persistence layer.
    Data,
    /// Invocable operation.
    Service,
    /// Emits events to subscribers.
    Event,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Structure => "structure",
            ElementKind::Data => "data",
            ElementKind::Service => "service",
            ElementKind::Event => "event",
        };
        f.write_str(name)
    }
}

/// Arena slot for one element.
///
/// Identity, kind and attachment never change after construction. Everything
/// the tree manager rewires sits behind the per-node `state` lock.
pub(crate) struct Node {
    pub(crate) id: NodeId,
    pub(crate) identifier: Identifier,
    pub(crate) kind: ElementKind,
    pub(crate) attachment: Option<Attachment>,
    pub(crate) state: Mutex<NodeState>,
    pub(crate) observers: ObserverList,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        identifier: Identifier,
        kind: ElementKind,
        address: String,
        attachment: Option<Attachment>,
    ) -> Self {
        Self {
            id,
            identifier,
            kind,
            attachment,
            state: Mutex::new(NodeState {
                address,
                parent: None,
                forward: SmallVec::new(),
                inverse: SmallVec::new(),
            }),
            observers: ObserverList::default(),
        }
    }

    pub(crate) fn snapshot(&self) -> NodeSnapshot {
        let state = self.state.lock();
        NodeSnapshot {
            id: self.id,
            identifier: self.identifier.clone(),
            kind: self.kind,
            address: state.address.clone(),
            parent: state.parent,
            forward: state.forward.to_vec(),
            inverse: state.inverse.to_vec(),
        }
    }
}

/// Mutable part of a node.
pub(crate) struct NodeState {
    pub(crate) address: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) forward: SmallVec<[Reference; 4]>,
    pub(crate) inverse: SmallVec<[Reference; 2]>,
}

impl NodeState {
    pub(crate) fn forward_named(&self, identifier: &str) -> Option<&Reference> {
        self.forward
            .iter()
            .find(|r| r.identifier().matches(identifier))
    }

    pub(crate) fn forward_to(&self, target: NodeId) -> Option<&Reference> {
        self.forward.iter().find(|r| r.target() == target)
    }

    pub(crate) fn has_inverse_link(&self) -> bool {
        self.inverse.iter().any(Reference::is_link)
    }

    pub(crate) fn child_targets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.forward
            .iter()
            .filter(|r| r.is_child())
            .map(Reference::target)
    }

    pub(crate) fn remove_forward(&mut self, target: NodeId, kind: ReferenceKind) -> Option<Reference> {
        let pos = self
            .forward
            .iter()
            .position(|r| r.target() == target && r.kind() == kind)?;
        Some(self.forward.remove(pos))
    }

    pub(crate) fn remove_inverse(&mut self, source: NodeId, kind: ReferenceKind) -> Option<Reference> {
        let pos = self
            .inverse
            .iter()
            .position(|r| r.source() == source && r.kind() == kind)?;
        Some(self.inverse.remove(pos))
    }
}

/// Point-in-time copy of a node, as returned by lookups.
#[derive(Clone, Debug, Serialize)]
pub struct NodeSnapshot {
    /// Arena id.
    pub id: NodeId,
    /// Last address segment.
    pub identifier: Identifier,
    /// Element type.
    pub kind: ElementKind,
    /// Canonical address at the time of the snapshot.
    pub address: String,
    /// Owning parent, if attached.
    pub parent: Option<NodeId>,
    /// Edges this node originates.
    pub forward: Vec<Reference>,
    /// Edges pointing at this node.
    pub inverse: Vec<Reference>,
}

impl NodeSnapshot {
    /// Child edges in insertion order.
    pub fn children(&self) -> impl Iterator<Item = &Reference> {
        self.forward.iter().filter(|r| r.is_child())
    }

    /// Link edges in insertion order.
    pub fn links(&self) -> impl Iterator<Item = &Reference> {
        self.forward.iter().filter(|r| r.is_link())
    }
}
