//! Composite element creators.

use tracing::debug;

use super::ops::Applied;
use super::Tree;
use crate::address::Identifier;
use crate::model::{Attachment, ElementKind, Node, TreeAction, TreeEvent};
use crate::primitives::concurrency::WriterGuard;
use crate::types::{ModelError, NodeId, Result};

/// Identifier of the generated read service below a data element.
pub const GET_DATA_SERVICE: &str = "getdata";
/// Identifier of the generated write service below a writable data element.
pub const SET_DATA_SERVICE: &str = "setdata";
/// Identifier of the generated change event below a data element.
pub const DATA_CHANGED_EVENT: &str = "datachanged";

/// Construction options for [`Tree::create_data_element`].
#[derive(Clone, Default)]
pub struct DataElementOptions {
    /// Whether a `setdata` service is generated.
    pub writable: bool,
    /// Persistence handle for the element's value.
    pub storage: Option<Attachment>,
    /// Sender used by the generated `datachanged` event.
    pub event_sender: Option<Attachment>,
}

impl DataElementOptions {
    /// Options for a read-only data element.
    pub fn read_only() -> Self {
        Self::default()
    }

    /// Options for a writable data element.
    pub fn writable() -> Self {
        Self {
            writable: true,
            ..Self::default()
        }
    }

    /// Sets the persistence handle.
    pub fn storage(mut self, storage: Attachment) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the event sender.
    pub fn event_sender(mut self, sender: Attachment) -> Self {
        self.event_sender = Some(sender);
        self
    }
}

impl Tree {
    /// Creates a Data element together with its generated sub-elements.
    ///
    /// Below the new element sit a `getdata` service, a `setdata` service
    /// when `options.writable` is set, and a `datachanged` event. The whole
    /// composite is wired under one lock acquisition, so no reader ever sees
    /// the data element without its sub-elements. A single `ChildAdded`
    /// notification is raised for the data element.
    ///
    /// # Errors
    /// Same as [`Tree::create_element`].
    pub fn create_data_element(
        &self,
        parent: Option<NodeId>,
        identifier: &str,
        options: DataElementOptions,
    ) -> Result<NodeId> {
        self.write_one(|tree, write| tree.apply_create_data_element(write, parent, identifier, options))
    }

    pub(crate) fn apply_create_data_element(
        &self,
        _write: &WriterGuard<'_>,
        parent: Option<NodeId>,
        identifier: &str,
        options: DataElementOptions,
    ) -> Result<Applied<NodeId>> {
        let identifier = Identifier::new(identifier)?;
        let parent_address = match parent {
            Some(parent) => {
                let slot = self.require(parent)?;
                let state = slot.state.lock();
                if state.forward_named(identifier.as_str()).is_some() {
                    return Err(ModelError::AlreadyExists(format!(
                        "{} already has a reference named {identifier}",
                        state.address
                    )));
                }
                Some(state.address.clone())
            }
            None => None,
        };

        let mut generated = vec![(GET_DATA_SERVICE, ElementKind::Service, None)];
        if options.writable {
            generated.push((SET_DATA_SERVICE, ElementKind::Service, None));
        }
        generated.push((DATA_CHANGED_EVENT, ElementKind::Event, options.event_sender));

        let data = self.allocate_id();
        let address = match &parent_address {
            Some(base) => crate::address::join(base, identifier.as_str()),
            None => identifier.as_str().to_string(),
        };
        self.insert_slot(Node::new(
            data,
            identifier.clone(),
            ElementKind::Data,
            address,
            options.storage,
        ));
        for (name, kind, attachment) in generated {
            let sub = self.allocate_id();
            let sub_identifier = Identifier::trusted(name);
            self.insert_slot(Node::new(sub, sub_identifier.clone(), kind, name.to_string(), attachment));
            self.wire_child(data, sub, sub_identifier);
        }

        let event = match parent {
            Some(parent) => {
                self.wire_child(parent, data, identifier.clone());
                self.invalidate_cache();
                Some(
                    TreeEvent::new(TreeAction::ChildAdded, parent)
                        .with_target(data)
                        .with_identifier(identifier.clone()),
                )
            }
            None => None,
        };
        debug!(node = %data, %identifier, writable = options.writable, "data element created");
        Ok((data, event))
    }
}
