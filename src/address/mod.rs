//! Address syntax: identifier validation, joining, splitting and rooting.
//!
//! An address is a `/`-joined sequence of identifiers starting at the root
//! node, e.g. `device/sensors/temp`. Callers may omit the root identifier and
//! start with a slash (`/sensors/temp`); [`normalize`] turns that rootless
//! form into the rooted one.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};

use crate::types::{ModelError, Result};

/// Separator between identifiers in an address.
pub const SEPARATOR: char = '/';

/// A validated node identifier.
///
/// Equality and hashing ignore ASCII case, so `Temp` and `temp` name the same
/// forward reference. The original spelling is kept for display and for
/// building addresses.
#[derive(Clone, Debug)]
pub struct Identifier(String);

impl Identifier {
    /// Validates `raw` and wraps it.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate_identifier(&raw)?;
        Ok(Self(raw))
    }

    /// Wraps an identifier known to be valid, such as a built-in constant.
    pub(crate) fn trusted(raw: &str) -> Self {
        debug_assert!(validate_identifier(raw).is_ok(), "invalid built-in identifier {raw}");
        Self(raw.to_string())
    }

    /// Returns the identifier as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a raw string.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.0)
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Identifier {
    type Error = ModelError;

    fn try_from(value: &str) -> Result<Self> {
        Identifier::new(value)
    }
}

/// Returns true if `c` may appear in an identifier.
pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '[' | ']')
}

/// Checks identifier syntax.
///
/// Identifiers are non-empty and consist of ASCII alphanumerics, `-`, `[` and
/// `]`. Separators, backslashes and whitespace are rejected explicitly so the
/// error names the offending character class.
pub fn validate_identifier(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(ModelError::InvalidArgument("identifier is empty".into()));
    }
    if let Some(bad) = raw.chars().find(|c| !is_identifier_char(*c)) {
        let reason = match bad {
            SEPARATOR | '\\' => "must not contain path separators",
            c if c.is_whitespace() => "must not contain whitespace",
            _ => "contains an unsupported character",
        };
        return Err(ModelError::InvalidArgument(format!(
            "identifier {raw:?} {reason} ({bad:?})"
        )));
    }
    Ok(())
}

/// Appends `identifier` to `parent`.
pub fn join(parent: &str, identifier: &str) -> String {
    let mut address = String::with_capacity(parent.len() + identifier.len() + 1);
    address.push_str(parent);
    address.push(SEPARATOR);
    address.push_str(identifier);
    address
}

/// Splits an address into its identifier tokens, skipping empty segments.
pub fn split(address: &str) -> impl Iterator<Item = &str> {
    address.split(SEPARATOR).filter(|segment| !segment.is_empty())
}

/// Returns the rooted form of `address`.
///
/// A leading slash marks a rootless address and gets `root` prepended.
/// Trailing slashes and repeated separators are collapsed. The result is not
/// validated; unresolvable segments simply fail to resolve.
pub fn normalize(address: &str, root: &str) -> String {
    let trimmed = address.trim();
    let mut out = String::with_capacity(trimmed.len() + root.len() + 1);
    if trimmed.starts_with(SEPARATOR) {
        out.push_str(root);
    }
    for segment in split(trimmed) {
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(segment);
    }
    out
}

/// Lower-cased key used for case-insensitive address maps.
pub fn cache_key(address: &str) -> String {
    address.to_ascii_lowercase()
}
