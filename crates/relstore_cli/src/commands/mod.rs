//! CLI command implementations.

pub mod check_schema;
pub mod dump;
pub mod inspect;
pub mod purge;

use relstore_storage::{EavStore, StoreConfig};
use std::path::Path;

/// Opens an existing store without creating one.
pub(crate) fn open_existing(path: &Path) -> Result<EavStore, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No database found at {}", path.display()).into());
    }
    Ok(EavStore::open(path, StoreConfig::new().create_if_missing(false))?)
}
