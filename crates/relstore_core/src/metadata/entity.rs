//! Entity metadata.

use super::{EntityAttribute, EntityRelationship, RelationshipRef};
use crate::error::{CoreError, CoreResult};
use relstore_storage::Channel;
use std::fmt;

/// Index of an entity within its [`Schema`](super::Schema).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey(pub(crate) usize);

impl EntityKey {
    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

/// A place where an internal entity is embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embedding {
    /// Top-level entity whose records hold the embedded fields.
    pub root: EntityKey,
    /// Path template of the embedded record, e.g. `/lines[*]/detail`.
    pub template: String,
}

/// Immutable description of one entity.
///
/// Equality is by name, so two schemas loaded from the same definition
/// agree on which entities are the same.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    pub(crate) key: EntityKey,
    pub(crate) name: String,
    pub(crate) channel: Option<Channel>,
    pub(crate) internal: bool,
    pub(crate) attributes: Vec<EntityAttribute>,
    pub(crate) relationships: Vec<EntityRelationship>,
    pub(crate) references_to_me: Vec<RelationshipRef>,
    pub(crate) embeddings: Vec<Embedding>,
}

impl EntityMetadata {
    /// Returns the key of this entity in its schema.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        self.key
    }

    /// Returns the entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the storage channel. Internal entities have none.
    pub fn channel(&self) -> CoreResult<&Channel> {
        self.channel.as_ref().ok_or_else(|| {
            CoreError::usage(format!("{} is internal and has no channel", self.name))
        })
    }

    /// Returns true for embedded, identity-less entities.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Returns the attributes in declaration order.
    #[must_use]
    pub fn attributes(&self) -> &[EntityAttribute] {
        &self.attributes
    }

    /// Looks an attribute up by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&EntityAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Returns the relationships in declaration order.
    #[must_use]
    pub fn relationships(&self) -> &[EntityRelationship] {
        &self.relationships
    }

    /// Looks a relationship up by name.
    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&EntityRelationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Relationships of any entity whose target is this entity.
    #[must_use]
    pub fn references_to_me(&self) -> &[RelationshipRef] {
        &self.references_to_me
    }

    /// Where this entity is embedded. Empty for top-level entities.
    #[must_use]
    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    pub(crate) fn require_attribute(&self, name: &str) -> CoreResult<&EntityAttribute> {
        self.attribute(name)
            .ok_or_else(|| CoreError::usage(format!("{} has no attribute {name:?}", self.name)))
    }

    pub(crate) fn require_relationship(&self, name: &str) -> CoreResult<&EntityRelationship> {
        self.relationship(name)
            .ok_or_else(|| CoreError::usage(format!("{} has no relationship {name:?}", self.name)))
    }
}

impl PartialEq for EntityMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EntityMetadata {}
