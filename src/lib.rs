//! Device tree: addressable element hierarchy for device models.
//!
//! A [`Tree`] holds the elements of one device (structure nodes, data
//! points, services and events) as a rooted hierarchy of Child edges plus
//! cross-cutting Link edges. Every element has a canonical `/`-separated
//! address which [`Tree::get_element_by_address`] resolves case-insensitively.
//!
//! Structural changes are serialised by a timed tree lock, validated before
//! they touch anything, and reported to [`TreeObserver`]s registered on the
//! changed node or any of its ancestors. [`WriteTransaction`] batches several
//! changes under one lock and one notification.

#![warn(missing_docs)]

pub mod address;
pub mod config;
pub mod logging;
pub mod manifest;
pub mod model;
pub mod primitives;
pub mod tree;
pub mod types;

pub use address::Identifier;
pub use model::{
    Attachment, Direction, ElementKind, NodeSnapshot, ObserverError, Reference, ReferenceKind,
    TreeAction, TreeEvent, TreeObserver,
};
pub use tree::{
    CounterMetrics, DataElementOptions, NoopMetrics, ReadTransaction, Tree, TreeMetrics,
    TreeOptions, VerifyReport, WriteTransaction,
};
pub use types::{ConfigError, ModelError, NodeId, NotificationError, Result, SubscriptionId};
