//! Structural-change notifications and their observers.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::address::Identifier;
use crate::types::{NodeId, ObserverFailure, SubscriptionId};

/// Error type observers return.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Kind of structural change being reported.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeAction {
    /// A child edge was wired.
    ChildAdded,
    /// A child edge was unwired.
    ChildRemoved,
    /// A link edge was wired.
    LinkAdded,
    /// A link edge was unwired.
    LinkRemoved,
    /// Coalesced notification for a batch of changes.
    TreeChanged,
}

/// A structural-change notification.
#[derive(Clone, Debug, Serialize)]
pub struct TreeEvent {
    /// What happened.
    pub action: TreeAction,
    /// Node whose forward references changed.
    pub source: NodeId,
    /// Other end of the affected edge, when there is one.
    pub target: Option<NodeId>,
    /// Identifier of the affected edge, when there is one.
    pub identifier: Option<Identifier>,
}

impl TreeEvent {
    /// Builds an event without target or identifier.
    pub fn new(action: TreeAction, source: NodeId) -> Self {
        Self {
            action,
            source,
            target: None,
            identifier: None,
        }
    }

    /// Sets the edge target.
    pub fn with_target(mut self, target: NodeId) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the edge identifier.
    pub fn with_identifier(mut self, identifier: Identifier) -> Self {
        self.identifier = Some(identifier);
        self
    }
}

/// Receives structural-change notifications for one node and its subtree.
///
/// Observers run synchronously on the mutating thread, after the tree lock
/// has been released. A failing or panicking observer does not stop delivery
/// to the others.
pub trait TreeObserver: Send + Sync {
    /// Called once per notification.
    fn on_tree_changed(&self, event: &TreeEvent) -> Result<(), ObserverError>;
}

impl<F> TreeObserver for F
where
    F: Fn(&TreeEvent) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_tree_changed(&self, event: &TreeEvent) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Observers registered on one node.
#[derive(Default)]
pub(crate) struct ObserverList {
    entries: RwLock<Vec<(SubscriptionId, Arc<dyn TreeObserver>)>>,
}

impl ObserverList {
    pub(crate) fn add(&self, id: SubscriptionId, observer: Arc<dyn TreeObserver>) {
        self.entries.write().push((id, observer));
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Drops every observer and returns how many were registered.
    pub(crate) fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Invokes every observer and appends failures to `failures`.
    ///
    /// The list is snapshotted first so observers may subscribe or
    /// unsubscribe while being notified.
    pub(crate) fn deliver(
        &self,
        node: NodeId,
        event: &TreeEvent,
        failures: &mut Vec<ObserverFailure>,
    ) {
        let snapshot: Vec<_> = self.entries.read().clone();
        for (subscription, observer) in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.on_tree_changed(event)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            failures.push(ObserverFailure {
                node,
                subscription,
                message,
            });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("observer panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("observer panicked: {text}")
    } else {
        "observer panicked".to_string()
    }
}
