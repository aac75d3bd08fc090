//! Error types for relstore core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in relstore core operations.
///
/// A commit that fails at the storage level is not an error here: `save`
/// and `delete` report it as `Ok(false)` after rolling everything back.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] relstore_storage::StorageError),

    /// The caller misused the API: wrong entity passed to a DAO, an
    /// operation on a deleted or embedded record, a type mismatch.
    #[error("usage error: {message}")]
    Usage {
        /// What was wrong.
        message: String,
    },

    /// A schema definition failed validation.
    #[error("schema error: {message}")]
    Schema {
        /// What was wrong.
        message: String,
    },

    /// A delete would leave live singular references pointing at nothing.
    #[error("cannot delete {entity} {id}: still referenced by {}", referenced_by.join(", "))]
    ReferenceViolation {
        /// Entity of the record being deleted.
        entity: String,
        /// Id of the record being deleted.
        id: String,
        /// Entities that still hold a reference.
        referenced_by: Vec<String>,
    },

    /// A stored value does not parse as the declared attribute type.
    #[error("field {field} of {entity} {} holds {raw:?}, expected {expected}", id.as_deref().unwrap_or("<unsaved>"))]
    ValueFormat {
        /// Field name or path.
        field: String,
        /// Entity name.
        entity: String,
        /// Record id, if the record has one.
        id: Option<String>,
        /// The raw stored text.
        raw: String,
        /// The expected type.
        expected: String,
    },

    /// A source-owned relationship points at a record that no longer exists.
    #[error("{entity}.{relationship} points to missing record {id}")]
    DanglingReference {
        /// Entity holding the reference.
        entity: String,
        /// Relationship name.
        relationship: String,
        /// The missing id.
        id: String,
    },

    /// Stored data contradicts the metadata.
    #[error("consistency error: {message}")]
    Consistency {
        /// Description of the contradiction.
        message: String,
    },

    /// A field path or key could not be parsed.
    #[error("invalid path {path:?}: {message}")]
    Path {
        /// The offending path.
        path: String,
        /// What was wrong.
        message: String,
    },

    /// A saved state could not be encoded or decoded.
    #[error("saved state error: {0}")]
    SavedState(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a consistency error.
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Creates a path error.
    pub fn path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true for a reference violation.
    #[must_use]
    pub fn is_reference_violation(&self) -> bool {
        matches!(self, Self::ReferenceViolation { .. })
    }
}
