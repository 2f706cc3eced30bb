//! Value model of the device tree: nodes, references and change events.

pub mod event;
mod node;
mod reference;

pub use event::{ObserverError, TreeAction, TreeEvent, TreeObserver};
pub use node::{Attachment, ElementKind, NodeSnapshot};
pub(crate) use node::Node;
pub use reference::{Direction, Reference, ReferenceKind};
