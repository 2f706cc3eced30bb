use serde::Serialize;

use crate::address::Identifier;
use crate::types::NodeId;

/// Whether an edge owns its target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Owning edge; sets the target's parent and drives its address.
    Child,
    /// Aliasing edge; leaves parent and address of the target alone.
    Link,
}

/// Which end of an edge holds the reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Held by the source node.
    Forward,
    /// Held by the target node.
    Inverse,
}

/// One directed edge viewed from one of its ends.
///
/// Every edge is stored twice: a forward reference in the source's list and
/// an inverse reference, with identical fields apart from `direction`, in the
/// target's list.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Reference {
    identifier: Identifier,
    source: NodeId,
    target: NodeId,
    kind: ReferenceKind,
    direction: Direction,
}

impl Reference {
    /// Builds the forward and inverse halves of an edge.
    pub fn pair(
        identifier: Identifier,
        source: NodeId,
        target: NodeId,
        kind: ReferenceKind,
    ) -> (Reference, Reference) {
        let forward = Reference {
            identifier,
            source,
            target,
            kind,
            direction: Direction::Forward,
        };
        let inverse = forward.inverse();
        (forward, inverse)
    }

    /// Returns the same edge seen from the other end.
    pub fn inverse(&self) -> Reference {
        Reference {
            identifier: self.identifier.clone(),
            source: self.source,
            target: self.target,
            kind: self.kind,
            direction: match self.direction {
                Direction::Forward => Direction::Inverse,
                Direction::Inverse => Direction::Forward,
            },
        }
    }

    /// Identifier the edge is known by in the source's namespace.
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Node the edge originates from.
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// Node the edge points to.
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Edge kind.
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// End of the edge this reference is stored on.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The node at the far end from the holder's point of view.
    pub fn peer(&self) -> NodeId {
        match self.direction {
            Direction::Forward => self.target,
            Direction::Inverse => self.source,
        }
    }

    /// Returns true for Child-kind references.
    pub fn is_child(&self) -> bool {
        self.kind == ReferenceKind::Child
    }

    /// Returns true for Link-kind references.
    pub fn is_link(&self) -> bool {
        self.kind == ReferenceKind::Link
    }
}
