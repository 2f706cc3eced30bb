//! Error handling for device tree operations.
//!
//! Every structural operation reports failures through [`ModelError`]. The
//! variants mirror the fault classes a protocol layer maps onto responses:
//! lock timeouts, duplicates, missing elements, rejected requests and
//! malformed arguments.
//!
//! Structural errors are raised while validating a request, before any node
//! is touched, so an `Err` from a mutating call means the tree is unchanged.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::{NodeId, SubscriptionId};

/// Result type for device tree operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors produced by the tree manager and its transaction scopes.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The tree lock could not be acquired within the configured timeout.
    ///
    /// The core does not retry; callers decide whether to try again.
    #[error("tree lock not acquired within {timeout:?}")]
    Locked {
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// An identifier or an edge to the same target already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A referenced node, child, link or identifier does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request would break a structural invariant.
    ///
    /// Raised for cycles, re-parenting, self-links, detaching linked
    /// subtrees and discarding attached nodes.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An identifier or another argument is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// One or more observers failed while a notification was delivered.
    #[error(transparent)]
    Notification(#[from] NotificationError),

    /// Loading configuration or a manifest failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ModelError {
    pub(crate) fn unknown_node(id: NodeId) -> Self {
        ModelError::NotFound(format!("node {id}"))
    }
}

/// A single observer failure captured during notification delivery.
#[derive(Debug, Clone)]
pub struct ObserverFailure {
    /// Node the failing observer was registered on.
    pub node: NodeId,
    /// Subscription of the failing observer.
    pub subscription: SubscriptionId,
    /// Error message, or the panic payload when the observer panicked.
    pub message: String,
}

impl fmt::Display for ObserverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "observer {} on {}: {}",
            self.subscription, self.node, self.message
        )
    }
}

/// Aggregate of every observer failure from one notification.
///
/// All observers run even when earlier ones fail; the failures are collected
/// here in delivery order.
#[derive(Debug, Clone, Error)]
#[error("{} observer(s) failed: {}", .failures.len(), join_failures(.failures))]
pub struct NotificationError {
    /// Individual failures in delivery order.
    pub failures: Vec<ObserverFailure>,
}

fn join_failures(failures: &[ObserverFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while loading configuration files and tree manifests.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for the expected schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// The document parsed but describes something invalid.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
