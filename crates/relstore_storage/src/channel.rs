//! Channel (table) identifiers.

use crate::error::{StorageError, StorageResult};
use std::fmt;

/// Prefix reserved for the store's own bookkeeping tables.
pub const RESERVED_PREFIX: &str = "_relstore";

/// The storage table identifier for one top-level entity.
///
/// Channel names are interpolated into SQL as quoted identifiers, so they
/// are restricted to `[A-Za-z_][A-Za-z0-9_]*` and may not use the reserved
/// `_relstore` prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(String);

impl Channel {
    /// Validates and wraps a channel name.
    pub fn new(name: impl Into<String>) -> StorageResult<Self> {
        let name = name.into();
        if !is_identifier(&name) || name.starts_with(RESERVED_PREFIX) {
            return Err(StorageError::invalid_channel(name));
        }
        Ok(Self(name))
    }

    /// Returns the bare name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name as a double-quoted SQL identifier.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns true if `name` matches `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
