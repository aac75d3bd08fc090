//! Serializable schema definitions.
//!
//! These are the inputs of [`SchemaBuilder`](super::SchemaBuilder). They can
//! be written in code with the builder methods below or loaded from JSON:
//!
//! ```json
//! {
//!   "entities": [
//!     { "name": "Invoice",
//!       "attributes": [{ "name": "number", "type": "integer" }],
//!       "relationships": [
//!         { "name": "lines", "target": "LineItem", "ownership": "composition", "array": true }
//!       ] },
//!     { "name": "LineItem", "internal": true,
//!       "attributes": [{ "name": "amount", "type": "decimal" }] }
//!   ]
//! }
//! ```

use super::AttributeType;
use serde::{Deserialize, Serialize};

/// Ownership of a relationship as written in a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// Non-owning.
    Association,
    /// Owning.
    Composition,
}

/// A whole schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Entities in declaration order.
    pub entities: Vec<EntityDefinition>,
}

/// One entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDefinition {
    /// Entity name.
    pub name: String,
    /// Storage channel; defaults to the entity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Whether the entity is embedded in its owners.
    #[serde(default)]
    pub internal: bool,
    /// Attributes in declaration order.
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    /// Relationships in declaration order.
    #[serde(default)]
    pub relationships: Vec<RelationshipDefinition>,
}

impl EntityDefinition {
    /// Starts a top-level entity definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: None,
            internal: false,
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Marks the entity as internal.
    #[must_use]
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Overrides the storage channel.
    #[must_use]
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        self.attributes.push(AttributeDefinition {
            name: name.into(),
            ty,
        });
        self
    }

    /// Adds a relationship.
    #[must_use]
    pub fn relationship(mut self, relationship: RelationshipDefinition) -> Self {
        self.relationships.push(relationship);
        self
    }
}

/// One attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Attribute name.
    pub name: String,
    /// Attribute type, e.g. `"integer"` or `"text[]"`.
    #[serde(rename = "type")]
    pub ty: AttributeType,
}

/// One relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDefinition {
    /// Relationship name.
    pub name: String,
    /// Target entity name.
    pub target: String,
    /// Association or composition.
    pub ownership: Ownership,
    /// Whether the relationship holds a list.
    #[serde(default)]
    pub array: bool,
    /// Field on the target holding the back-reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_by: Option<String>,
}

impl RelationshipDefinition {
    /// A singular association.
    #[must_use]
    pub fn association(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_ownership(name, target, Ownership::Association)
    }

    /// A singular composition.
    #[must_use]
    pub fn composition(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_ownership(name, target, Ownership::Composition)
    }

    fn with_ownership(
        name: impl Into<String>,
        target: impl Into<String>,
        ownership: Ownership,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            ownership,
            array: false,
            mapped_by: None,
        }
    }

    /// Makes the relationship an array.
    #[must_use]
    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    /// Makes the relationship target-owned through `field`.
    #[must_use]
    pub fn mapped_by(mut self, field: impl Into<String>) -> Self {
        self.mapped_by = Some(field.into());
        self
    }
}
