//! Entity metadata: attributes, relationships, entities and the schema.

mod attribute;
mod definition;
mod entity;
mod relationship;
mod schema;

pub use attribute::{AttributeType, EntityAttribute, ScalarKind};
pub use definition::{
    AttributeDefinition, EntityDefinition, Ownership, RelationshipDefinition, SchemaDefinition,
};
pub use entity::{Embedding, EntityKey, EntityMetadata};
pub use relationship::{Cardinality, EntityRelationship, RelationshipKind, RelationshipRef};
pub use schema::{Schema, SchemaBuilder};
