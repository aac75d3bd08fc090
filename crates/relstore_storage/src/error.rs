//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite engine reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A channel name is not usable as a table identifier.
    #[error("invalid channel name: {name:?}")]
    InvalidChannel {
        /// The rejected name.
        name: String,
    },

    /// The outermost `COMMIT` failed; the transaction has been rolled back.
    #[error("commit failed: {reason}")]
    CommitFailed {
        /// Why the commit did not go through.
        reason: String,
    },

    /// `commit` or `rollback` was called with no open transaction.
    #[error("no transaction in progress")]
    NoTransaction,

    /// The store location does not exist and creation was disabled.
    #[error("store not found: {path}")]
    NotFound {
        /// Path that was looked up.
        path: String,
    },

    /// A background worker stopped abnormally.
    #[error("background worker failed: {0}")]
    Worker(String),
}

impl StorageError {
    /// Creates an invalid channel error.
    pub fn invalid_channel(name: impl Into<String>) -> Self {
        Self::InvalidChannel { name: name.into() }
    }

    /// Creates a commit failure error.
    pub fn commit_failed(reason: impl Into<String>) -> Self {
        Self::CommitFailed {
            reason: reason.into(),
        }
    }

    /// Returns true if this error reports a rolled-back commit.
    #[must_use]
    pub fn is_commit_failure(&self) -> bool {
        matches!(self, Self::CommitFailed { .. })
    }
}
