//! File-based configuration for trees and logging.
//!
//! ```toml
//! [tree]
//! root = "gateway"
//! lock_timeout_ms = 2500
//! cache_enabled = true
//! cache_capacity = 1024
//!
//! [logging]
//! level = "devtree=debug"
//! ```
//!
//! Every key is optional; missing keys fall back to the [`TreeOptions`]
//! defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address;
use crate::tree::{
    TreeOptions, DEFAULT_CACHE_CAPACITY, DEFAULT_LOCK_TIMEOUT, DEFAULT_ROOT_IDENTIFIER,
};
use crate::types::ConfigError;

/// Log filter used when neither the file nor the caller picks one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TreeConfig {
    /// Settings of the tree manager.
    #[serde(default)]
    pub tree: TreeSection,
    /// Settings of the log subscriber.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// The `[tree]` table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TreeSection {
    /// Identifier of the root node.
    pub root: String,
    /// Lock acquisition timeout in milliseconds.
    pub lock_timeout_ms: u64,
    /// Whether address resolutions are cached.
    pub cache_enabled: bool,
    /// Upper bound on cached resolutions.
    pub cache_capacity: usize,
}

impl Default for TreeSection {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT_IDENTIFIER.to_string(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            cache_enabled: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// The `[logging]` table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive, e.g. `info` or `devtree=debug`.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl TreeConfig {
    /// Loads `explicit`, or the default location when `None`.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is
    /// an error.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit.or_else(default_config_path) {
            Some(path) if path.exists() => Self::from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Reads and validates one configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TreeConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if address::validate_identifier(&self.tree.root).is_err() {
            return Err(ConfigError::Invalid(format!(
                "tree.root '{}' is not a valid identifier",
                self.tree.root
            )));
        }
        if self.tree.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "tree.lock_timeout_ms must be positive".into(),
            ));
        }
        if self.tree.cache_enabled && self.tree.cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "tree.cache_capacity must be positive when the cache is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Converts the `[tree]` table into builder options.
    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions::new()
            .root_identifier(self.tree.root.clone())
            .lock_timeout(Duration::from_millis(self.tree.lock_timeout_ms))
            .cache_enabled(self.tree.cache_enabled)
            .cache_capacity(self.tree.cache_capacity)
    }
}

/// Default configuration location, `<config dir>/devtree/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("devtree").join("config.toml"))
}
