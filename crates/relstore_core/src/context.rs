//! Shared state behind a data manager, its DAOs and its records.

use crate::config::{Config, ReferencePolicy};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntityKey, EntityMetadata, Schema};
use crate::record::{Record, RecordState};
use crate::types::{RecordId, StatusTags};
use relstore_storage::EavStore;
use std::rc::Rc;
use std::sync::Arc;
use tracing::warn;

/// Reserved field holding a top-level record's status tags.
pub const STATUS_FIELD: &str = "$status";

pub(crate) struct Context {
    pub(crate) store: EavStore,
    pub(crate) schema: Arc<Schema>,
    pub(crate) config: Config,
}

impl Context {
    pub(crate) fn entity(&self, key: EntityKey) -> &EntityMetadata {
        self.schema.entity(key)
    }

    /// Loads a top-level record, or `None` if it has no rows.
    pub(crate) fn load(self: &Rc<Self>, key: EntityKey, id: &RecordId) -> CoreResult<Option<Record>> {
        let entity = self.entity(key);
        if entity.is_internal() {
            return Err(CoreError::usage(format!(
                "{} is internal and cannot be loaded by id",
                entity.name()
            )));
        }
        let mut rows = self.store.read_record(entity.channel()?, id.as_str())?;
        if rows.is_empty() {
            return Ok(None);
        }
        let status = StatusTags::from_stored(rows.remove(STATUS_FIELD).flatten().as_deref());
        let state = RecordState::hydrated(key, id.clone(), rows, status);
        Ok(Some(Record::from_state(Rc::clone(self), state)))
    }

    /// Resolves one stored reference, applying the dangling reference policy.
    pub(crate) fn resolve(
        self: &Rc<Self>,
        holder: &EntityMetadata,
        relationship: &str,
        target: EntityKey,
        id: &RecordId,
    ) -> CoreResult<Option<Record>> {
        if let Some(record) = self.load(target, id)? {
            return Ok(Some(record));
        }
        match self.config.reference_policy {
            ReferencePolicy::Strict => Err(CoreError::DanglingReference {
                entity: holder.name().to_string(),
                relationship: relationship.to_string(),
                id: id.to_string(),
            }),
            ReferencePolicy::Lenient => {
                warn!(
                    entity = holder.name(),
                    relationship,
                    %id,
                    "dangling reference treated as absent"
                );
                Ok(None)
            }
        }
    }
}
