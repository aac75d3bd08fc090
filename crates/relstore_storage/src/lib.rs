//! # relstore Storage
//!
//! The entity-attribute-value channel store underneath relstore.
//!
//! Every top-level entity lives in its own SQLite table (a *channel*) of
//! `(record_id, name, value)` rows. This crate reads and writes those row
//! sets, runs compiled statements and scopes transactions. It knows nothing
//! about entity metadata; interpreting field names is the core crate's job.
//!
//! ## Design Principles
//!
//! - One row per field per record, every value stored as text
//! - An explicit NULL row is distinct from an absent row
//! - Nested transaction scopes join the outermost transaction
//! - Bulk deletion runs on a worker thread with its own connection
//!
//! ## Example
//!
//! ```rust
//! use relstore_storage::{Channel, EavStore};
//!
//! let store = EavStore::open_in_memory().unwrap();
//! let notes = Channel::new("notes").unwrap();
//! store.ensure_channel(&notes).unwrap();
//! store
//!     .transaction(|s| s.write_fields(&notes, "n1", &[("title".into(), Some("hi".into()))]))
//!     .unwrap();
//! assert_eq!(store.record_count(&notes).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod config;
mod error;
mod param;
mod purge;
mod store;

pub use channel::{is_identifier, Channel, RESERVED_PREFIX};
pub use config::StoreConfig;
pub use error::{StorageError, StorageResult};
pub use param::SqlParam;
pub use purge::{CancelToken, PurgeHandle, PurgeJob, PurgeOutcome, PurgeStage};
pub use store::{EavStore, FieldRow, StoreLocation, TOMBSTONE_TABLE};
