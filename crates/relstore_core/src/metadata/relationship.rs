//! Relationship metadata.

use super::EntityKey;

/// How many targets a relationship holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// Zero or one target.
    Single,
    /// An ordered list of targets.
    Array,
}

/// Ownership and cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// Non-owning reference; never cascades deletes.
    Association(Cardinality),
    /// Owner to child; saves and deletes cascade to the targets.
    Composition(Cardinality),
}

impl RelationshipKind {
    /// Returns the cardinality.
    #[must_use]
    pub const fn cardinality(self) -> Cardinality {
        match self {
            Self::Association(c) | Self::Composition(c) => c,
        }
    }

    /// Returns true for compositions.
    #[must_use]
    pub const fn is_composition(self) -> bool {
        matches!(self, Self::Composition(_))
    }

    /// Returns true for array relationships.
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(self.cardinality(), Cardinality::Array)
    }
}

/// A named relationship from one entity to another.
///
/// A relationship with `mapped_by` set is *target-owned*: the foreign key
/// is the named field on the target, and this side is resolved by reverse
/// lookup. Otherwise it is *source-owned* and the target ids are stored in
/// this entity's own fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRelationship {
    pub(crate) name: String,
    pub(crate) target: EntityKey,
    pub(crate) kind: RelationshipKind,
    pub(crate) mapped_by: Option<String>,
}

impl EntityRelationship {
    /// Returns the relationship name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the target entity.
    #[must_use]
    pub fn target(&self) -> EntityKey {
        self.target
    }

    /// Returns the ownership and cardinality.
    #[must_use]
    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    /// Returns the field on the target holding the back-reference.
    #[must_use]
    pub fn mapped_by(&self) -> Option<&str> {
        self.mapped_by.as_deref()
    }

    /// Returns true if the target ids live on this side.
    #[must_use]
    pub fn is_source_owned(&self) -> bool {
        self.mapped_by.is_none()
    }

    /// Returns true for compositions.
    #[must_use]
    pub fn is_composition(&self) -> bool {
        self.kind.is_composition()
    }

    /// Returns true for array relationships.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.kind.is_array()
    }
}

/// Points at one relationship of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelationshipRef {
    /// Entity declaring the relationship.
    pub entity: EntityKey,
    /// Position of the relationship in the entity's declaration order.
    pub index: usize,
}
