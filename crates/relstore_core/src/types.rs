//! Core type definitions for relstore.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a top-level record.
///
/// Ids are assigned when a new record is first saved and never change
/// afterwards. Embedded records have no id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps an existing id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One record status tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusTag {
    /// Never saved.
    New,
    /// Created on this device.
    Local,
    /// Holds changes the remote side has not seen.
    Desynchronized,
    /// Changes are being pushed right now.
    Synchronizing,
}

impl StatusTag {
    const ALL: [Self; 4] = [
        Self::New,
        Self::Local,
        Self::Desynchronized,
        Self::Synchronizing,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::New => 1,
            Self::Local => 2,
            Self::Desynchronized => 4,
            Self::Synchronizing => 8,
        }
    }
}

/// The set of status tags carried by a record.
///
/// Tags change only through the named transitions below. The set is stored
/// in the reserved `$status` field as its integer encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StatusTags(u8);

impl StatusTags {
    /// Bit set by [`StatusTag::Desynchronized`] in the stored encoding.
    pub const DESYNCHRONIZED_BIT: u8 = 4;
    /// Bit set by [`StatusTag::Synchronizing`] in the stored encoding.
    pub const SYNCHRONIZING_BIT: u8 = 8;

    /// No tags: a synchronized, persisted record.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Tags of a record created on this device.
    #[must_use]
    pub const fn created_locally() -> Self {
        Self(1 | 2 | 4)
    }

    /// Tags of a record created with an id handed out by a remote source.
    #[must_use]
    pub const fn created_remotely() -> Self {
        Self(1)
    }

    /// Tags after a local save: no longer new, now desynchronized.
    #[must_use]
    pub const fn after_local_save(self) -> Self {
        Self((self.0 & !1) | 4)
    }

    /// Tags after a save coming from the remote source: fully synchronized.
    #[must_use]
    pub const fn after_sync_save(self) -> Self {
        Self(0)
    }

    /// Tags once a push of this record has started.
    #[must_use]
    pub const fn begin_synchronizing(self) -> Self {
        if self.0 & 4 == 0 {
            return self;
        }
        Self((self.0 & !4) | 8)
    }

    /// Returns true if `tag` is set.
    #[must_use]
    pub const fn contains(self, tag: StatusTag) -> bool {
        self.0 & tag.bit() != 0
    }

    /// Returns true for a record that was never saved.
    #[must_use]
    pub const fn is_new(self) -> bool {
        self.contains(StatusTag::New)
    }

    /// Returns true for a record created on this device.
    #[must_use]
    pub const fn is_local(self) -> bool {
        self.contains(StatusTag::Local)
    }

    /// Returns the stored integer encoding.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Decodes a stored integer, ignoring unknown bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0f)
    }

    /// Parses the stored `$status` text. Missing or malformed text yields no tags.
    #[must_use]
    pub fn from_stored(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse::<u8>().ok())
            .map_or(Self::empty(), Self::from_bits)
    }

    /// Iterates over the tags that are set.
    pub fn iter(self) -> impl Iterator<Item = StatusTag> {
        StatusTag::ALL.into_iter().filter(move |t| self.contains(*t))
    }
}

impl fmt::Display for StatusTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .iter()
            .map(|t| match t {
                StatusTag::New => "new",
                StatusTag::Local => "local",
                StatusTag::Desynchronized => "desynchronized",
                StatusTag::Synchronizing => "synchronizing",
            })
            .collect();
        if names.is_empty() {
            f.write_str("synchronized")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}
