//! # relstore Core
//!
//! A relationship-aware record layer over the relstore EAV store.
//!
//! This crate provides:
//! - Entity metadata: attributes, relationships, ownership and embedding
//! - Live records with dirty tracking and a relationship edit buffer
//! - DAOs that save and delete whole object graphs in one transaction
//! - Embedded (internal) entities flattened into their owner's rows
//! - A typed select builder compiled to SQL over the channels
//! - Saved states for restoring unsaved edits across sessions
//!
//! ## Example
//!
//! ```rust
//! use relstore_core::{
//!     AttributeType, Config, DataManager, EntityDefinition, RelationshipDefinition, ScalarKind,
//!     Schema,
//! };
//!
//! let schema = Schema::builder()
//!     .entity(
//!         EntityDefinition::new("Person")
//!             .attribute("name", AttributeType::Scalar(ScalarKind::Text))
//!             .relationship(RelationshipDefinition::association("manager", "Person")),
//!     )
//!     .build()
//!     .unwrap();
//! let manager = DataManager::open_in_memory(schema, Config::default()).unwrap();
//!
//! let people = manager.dao("Person").unwrap();
//! let bob = people.create();
//! bob.set_value("name", Some("Bob".into())).unwrap();
//! let alice = people.create();
//! alice.set_value("name", Some("Alice".into())).unwrap();
//! alice.set_relationship("manager", Some(&bob)).unwrap();
//! assert!(people.save(&alice, false).unwrap());
//!
//! assert_eq!(people.count().unwrap(), 2);
//! assert!(bob.id().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod context;
mod dao;
mod error;
mod manager;
mod metadata;
mod path;
mod query;
mod record;
mod types;
mod value;

pub use config::{Config, ReferencePolicy};
pub use context::STATUS_FIELD;
pub use dao::{Dao, SavedState};
pub use error::{CoreError, CoreResult};
pub use manager::DataManager;
pub use metadata::{
    AttributeDefinition, AttributeType, Cardinality, Embedding, EntityAttribute, EntityDefinition,
    EntityKey, EntityMetadata, EntityRelationship, Ownership, RelationshipDefinition,
    RelationshipKind, RelationshipRef, Schema, SchemaBuilder, SchemaDefinition, ScalarKind,
};
pub use path::{decode_identifier, encode_identifier, FieldPath, PathSegment, ANY_INDEX};
pub use query::{
    Cast, Collation, CompareOp, CompiledQuery, Cursor, Filter, Select, Selected, SyncState,
    TextMatch,
};
pub use record::Record;
pub use relstore_storage::{CancelToken, PurgeHandle, PurgeOutcome, PurgeStage};
pub use types::{RecordId, StatusTag, StatusTags};
pub use value::{Image, Scalar, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
