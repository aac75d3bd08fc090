//! Data access objects.
//!
//! A [`Dao`] is the entry point for one entity: it creates, loads, saves,
//! deletes, refreshes and copies records, and starts queries. Saves and
//! deletes run as one cascade inside one transaction; the steps of each are
//! described in the `save` and `delete` submodules.

mod cascade;
mod copy;
mod delete;
mod save;
mod saved_state;

pub(crate) use cascade::Cascade;
pub use saved_state::SavedState;

use crate::context::{Context, STATUS_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntityKey, EntityMetadata};
use crate::path::ANY_INDEX;
use crate::query::{Select, Source};
use crate::record::{Record, RecordState};
use crate::types::{RecordId, StatusTags};
use std::rc::Rc;
use tracing::debug;

/// Record operations for one entity.
#[derive(Clone)]
pub struct Dao {
    ctx: Rc<Context>,
    entity: EntityKey,
}

impl std::fmt::Debug for Dao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dao")
            .field("entity", &self.entity().name())
            .finish()
    }
}

impl Dao {
    pub(crate) fn new(ctx: Rc<Context>, entity: EntityKey) -> Self {
        Self { ctx, entity }
    }

    /// Returns the entity this DAO serves.
    #[must_use]
    pub fn entity(&self) -> &EntityMetadata {
        self.ctx.entity(self.entity)
    }

    /// Creates a new local record. It has no id until first saved.
    #[must_use]
    pub fn create(&self) -> Record {
        let status = if self.entity().is_internal() {
            StatusTags::empty()
        } else {
            StatusTags::created_locally()
        };
        Record::from_state(Rc::clone(&self.ctx), RecordState::new(self.entity, status))
    }

    /// Creates a new record with an id handed out by a remote source.
    pub fn create_with_id(&self, id: impl Into<RecordId>) -> CoreResult<Record> {
        self.require_top_level("create with an id")?;
        let mut state = RecordState::new(self.entity, StatusTags::created_remotely());
        state.id = Some(id.into());
        Ok(Record::from_state(Rc::clone(&self.ctx), state))
    }

    /// Loads a record. Every call hydrates a fresh handle.
    pub fn get(&self, id: &RecordId) -> CoreResult<Option<Record>> {
        self.ctx.load(self.entity, id)
    }

    /// Loads every record, ordered by id.
    pub fn get_all(&self) -> CoreResult<Vec<Record>> {
        self.require_top_level("list")?;
        let ids = self.ctx.store.record_ids(self.entity().channel()?)?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.ctx.load(self.entity, &RecordId::from(id))? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Counts stored records.
    pub fn count(&self) -> CoreResult<usize> {
        self.require_top_level("count")?;
        Ok(self.ctx.store.record_count(self.entity().channel()?)?)
    }

    /// Saves `record` and cascades through its relationships.
    ///
    /// `sync` marks a save coming from the remote source: the record ends up
    /// synchronized instead of desynchronized. Returns `Ok(false)` if the
    /// commit failed; every touched record is then back in its prior state.
    pub fn save(&self, record: &Record, sync: bool) -> CoreResult<bool> {
        self.check_record(record)?;
        Cascade::run(&self.ctx, sync, |cascade| cascade.save(record))
    }

    /// Deletes `record` and cascades through its compositions.
    ///
    /// Fails with [`CoreError::ReferenceViolation`] if another record still
    /// holds a singular reference to it. Returns `Ok(false)` if the commit
    /// failed.
    pub fn delete(&self, record: &Record, sync: bool) -> CoreResult<bool> {
        self.check_record(record)?;
        Cascade::run(&self.ctx, sync, |cascade| cascade.delete(record))
    }

    /// Replaces the record's state with what is stored, dropping unsaved
    /// edits. Returns `false` if the record no longer exists.
    pub fn refresh(&self, record: &Record) -> CoreResult<bool> {
        self.check_record(record)?;
        let id = match record.id() {
            Some(id) if !record.is_new() => id,
            _ => {
                return Err(CoreError::usage(format!(
                    "cannot refresh unsaved {} record",
                    self.entity().name()
                )))
            }
        };
        let Some(stored) = self.ctx.load(self.entity, &id)? else {
            return Ok(false);
        };
        let fresh = stored.inner.borrow().clone();
        *record.inner.borrow_mut() = fresh;
        debug!(entity = self.entity().name(), %id, "record refreshed");
        Ok(true)
    }

    /// Copies a record in memory.
    ///
    /// With `fresh = false` the copy is an independent handle on identical
    /// state. With `fresh = true` it is a new unsaved record: every field is
    /// dirty, composed children are copied the same way, target-owned
    /// associations are dropped.
    pub fn copy(&self, record: &Record, fresh: bool) -> CoreResult<Record> {
        self.check_entity(record)?;
        if fresh {
            copy::fresh(record)
        } else {
            Ok(copy::detached(record))
        }
    }

    /// Persists the start of a push: desynchronized becomes synchronizing.
    /// Returns `false` if there was nothing to mark.
    pub fn mark_synchronizing(&self, record: &Record) -> CoreResult<bool> {
        self.check_record(record)?;
        let (Some(id), false) = (record.id(), record.is_new()) else {
            return Err(CoreError::usage("only saved records can be synchronized"));
        };
        let current = record.status();
        let next = current.begin_synchronizing();
        if next == current {
            return Ok(false);
        }
        let channel = self.entity().channel()?;
        self.ctx.store.transaction(|store| {
            store.write_fields(
                channel,
                id.as_str(),
                &[(STATUS_FIELD.to_string(), Some(next.bits().to_string()))],
            )
        })?;
        record.inner.borrow_mut().status = next;
        Ok(true)
    }

    /// Starts a query over this entity.
    ///
    /// An internal entity can be queried when it is embedded in exactly one
    /// place, as the elements of one top-level array.
    pub fn select(&self) -> CoreResult<Select> {
        let entity = self.entity();
        if !entity.is_internal() {
            return Ok(Select::new(Rc::clone(&self.ctx), self.entity, Source::TopLevel));
        }
        let [embedding] = entity.embeddings() else {
            return Err(CoreError::usage(format!(
                "{} is embedded in {} places; select it through an owner",
                entity.name(),
                entity.embeddings().len()
            )));
        };
        let prefix = embedding
            .template
            .strip_suffix(ANY_INDEX)
            .filter(|p| !p.contains(ANY_INDEX))
            .ok_or_else(|| {
                CoreError::usage(format!(
                    "{} at {} is not an element of a top-level array",
                    entity.name(),
                    embedding.template
                ))
            })?;
        Ok(Select::new(
            Rc::clone(&self.ctx),
            self.entity,
            Source::Internal {
                root: embedding.root,
                prefix: prefix.to_string(),
                owner: None,
            },
        ))
    }

    /// Captures a record's identity or pending edits.
    pub fn to_saved_state(&self, record: &Record) -> CoreResult<SavedState> {
        self.check_entity(record)?;
        saved_state::encode(record)
    }

    /// Rebuilds a record from [`to_saved_state`](Self::to_saved_state) output.
    pub fn from_saved_state(&self, state: &SavedState) -> CoreResult<Record> {
        if state.entity() != self.entity().name() {
            return Err(CoreError::usage(format!(
                "saved state of {} passed to the {} DAO",
                state.entity(),
                self.entity().name()
            )));
        }
        saved_state::decode(&self.ctx, state)
    }

    fn require_top_level(&self, what: &str) -> CoreResult<()> {
        if self.entity().is_internal() {
            return Err(CoreError::usage(format!(
                "cannot {what} internal entity {}",
                self.entity().name()
            )));
        }
        Ok(())
    }

    fn check_entity(&self, record: &Record) -> CoreResult<()> {
        if record.entity_key() != self.entity || !Rc::ptr_eq(&record.ctx, &self.ctx) {
            return Err(CoreError::usage(format!(
                "{} record passed to the {} DAO",
                record.entity().name(),
                self.entity().name()
            )));
        }
        Ok(())
    }

    fn check_record(&self, record: &Record) -> CoreResult<()> {
        self.check_entity(record)?;
        if record.is_internal() {
            return Err(CoreError::usage(format!(
                "{} is internal and is managed through its owner",
                self.entity().name()
            )));
        }
        Ok(())
    }
}
