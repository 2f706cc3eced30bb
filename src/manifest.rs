//! TOML manifests describing a device tree.
//!
//! ```toml
//! root = "device"
//!
//! [[element]]
//! address = "/sensors"
//!
//! [[element]]
//! address = "/sensors/temperature"
//! kind = "data"
//! writable = true
//!
//! [[link]]
//! source = "/"
//! target = "/sensors/temperature"
//! identifier = "temp"
//! ```
//!
//! Elements are created in order, so a parent must appear before its
//! children. Sub-elements generated for data elements can be link targets.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::address;
use crate::model::ElementKind;
use crate::tree::{DataElementOptions, Tree, TreeOptions, WriteTransaction};
use crate::types::{ConfigError, ModelError, NodeId, Result};

/// A parsed manifest.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Manifest {
    /// Root identifier; overrides the one from the options when set.
    #[serde(default)]
    pub root: Option<String>,
    /// Elements in creation order.
    #[serde(default, rename = "element")]
    pub elements: Vec<ElementSpec>,
    /// Links, added after every element exists.
    #[serde(default, rename = "link")]
    pub links: Vec<LinkSpec>,
}

/// One `[[element]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ElementSpec {
    /// Full address of the new element; its last segment is the identifier.
    pub address: String,
    /// Element kind, `structure` when omitted.
    #[serde(default = "default_kind")]
    pub kind: ElementKind,
    /// For data elements, whether a `setdata` service is generated.
    #[serde(default)]
    pub writable: bool,
}

/// One `[[link]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LinkSpec {
    /// Address of the linking node.
    pub source: String,
    /// Address of the linked node.
    pub target: String,
    /// Link name; the target's identifier when omitted.
    #[serde(default)]
    pub identifier: Option<String>,
}

fn default_kind() -> ElementKind {
    ElementKind::Structure
}

impl Manifest {
    /// Reads a manifest file.
    pub fn from_path(path: &Path) -> std::result::Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds a new tree holding everything the manifest describes.
    ///
    /// All elements and links are applied inside one write transaction, so
    /// observers see a single notification and readers never see a half
    /// built tree.
    ///
    /// # Errors
    /// * any structural error from the underlying operations, or
    ///   `ModelError::NotFound` when an address names a missing parent,
    ///   source or target
    pub fn build(&self, options: TreeOptions) -> Result<Tree> {
        let options = match &self.root {
            Some(root) => options.root_identifier(root.clone()),
            None => options,
        };
        let tree = Tree::with_options(options)?;
        {
            let mut tx = tree.begin_write()?;
            self.apply(&mut tx)?;
            tx.end()?;
        }
        info!(
            elements = self.elements.len(),
            links = self.links.len(),
            nodes = tree.len(),
            "manifest applied"
        );
        Ok(tree)
    }

    /// Applies the manifest to an existing tree within `tx`.
    pub fn apply(&self, tx: &mut WriteTransaction<'_>) -> Result<()> {
        let tree = tx.tree();
        for element in &self.elements {
            let (parent, identifier) = split_parent(tree, &element.address)?;
            match element.kind {
                ElementKind::Data => {
                    let options = if element.writable {
                        DataElementOptions::writable()
                    } else {
                        DataElementOptions::read_only()
                    };
                    tx.create_data_element(Some(parent), identifier, options)?;
                }
                kind => {
                    tx.create_element(Some(parent), identifier, kind, None)?;
                }
            }
        }
        for link in &self.links {
            let source = resolve(tree, &link.source)?;
            let target = resolve(tree, &link.target)?;
            tx.add_link(source, target, link.identifier.as_deref())?;
        }
        Ok(())
    }
}

fn resolve(tree: &Tree, raw: &str) -> Result<NodeId> {
    tree.get_element_by_address(raw)
        .ok_or_else(|| ModelError::NotFound(format!("address {raw}")))
}

/// Splits an element address into its resolved parent and last segment.
fn split_parent<'a>(tree: &Tree, raw: &'a str) -> Result<(NodeId, &'a str)> {
    let trimmed = raw.trim().trim_end_matches(address::SEPARATOR);
    let Some((parent, identifier)) = trimmed.rsplit_once(address::SEPARATOR) else {
        return Err(ConfigError::Invalid(format!(
            "element address {raw} has no parent; use /{trimmed} or root/{trimmed}"
        ))
        .into());
    };
    let parent = if parent.is_empty() {
        tree.root()
    } else {
        resolve(tree, parent)?
    };
    Ok((parent, identifier))
}
