//! Save cascade.
//!
//! A save runs in three steps:
//!
//! 1. Source-owned relationships. Embedded children are flattened into the
//!    record; other targets are saved first so their ids can be stored.
//! 2. The record's own dirty fields and status are written.
//! 3. Target-owned relationships. Each target's back-reference field is
//!    pointed at the record and the target is saved.

use super::Cascade;
use crate::codec;
use crate::context::STATUS_FIELD;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntityKey, EntityMetadata, EntityRelationship};
use crate::record::Record;
use crate::types::RecordId;
use relstore_storage::FieldRow;
use std::rc::Rc;
use tracing::debug;

impl Cascade {
    /// Saves a top-level record and everything it owns.
    pub(crate) fn save(&mut self, record: &Record) -> CoreResult<()> {
        if record.is_deleted() {
            return Err(CoreError::usage(format!(
                "cannot save deleted {} record",
                record.entity().name()
            )));
        }
        if record.is_internal() {
            return Err(CoreError::usage(format!(
                "{} is internal and is saved through its owner",
                record.entity().name()
            )));
        }

        self.touch(record);
        let key = record.entity_key();
        let id = record
            .inner
            .borrow_mut()
            .id
            .get_or_insert_with(RecordId::generate)
            .clone();
        if !self.saving.insert((key, id.clone())) {
            return Ok(());
        }
        let result = self.save_steps(record, key, &id);
        self.saving.remove(&(key, id));
        result
    }

    fn save_steps(&mut self, record: &Record, key: EntityKey, id: &RecordId) -> CoreResult<()> {
        let ctx = Rc::clone(&self.ctx);
        let entity = ctx.entity(key);
        let mark = self.deferred.len();

        for rel in entity.relationships().iter().filter(|r| r.is_source_owned()) {
            if ctx.entity(rel.target()).is_internal() {
                if record.has_buffered(rel.name()) {
                    codec::serialize(self, record, rel)?;
                }
            } else {
                self.save_source_owned(record, rel)?;
            }
        }

        self.persist(record, entity, id)?;

        for (target, dropped) in self.deferred.split_off(mark) {
            if let Some(child) = ctx.load(target, &dropped)? {
                self.delete(&child)?;
            }
        }

        for rel in entity.relationships().iter().filter(|r| !r.is_source_owned()) {
            self.save_target_owned(record, rel)?;
        }
        Ok(())
    }

    fn persist(&mut self, record: &Record, entity: &EntityMetadata, id: &RecordId) -> CoreResult<()> {
        let mut state = record.inner.borrow_mut();
        let needed = state.status.is_new()
            || !state.dirty.is_empty()
            || (self.sync && state.status.bits() != 0);
        if !needed {
            return Ok(());
        }

        let status = if self.sync {
            state.status.after_sync_save()
        } else {
            state.status.after_local_save()
        };
        let mut rows: Vec<FieldRow> = state
            .dirty
            .iter()
            .map(|key| (key.clone(), state.values.get(key).cloned().flatten()))
            .collect();
        rows.push((STATUS_FIELD.to_string(), Some(status.bits().to_string())));

        self.ctx
            .store
            .write_fields(entity.channel()?, id.as_str(), &rows)?;
        debug!(entity = entity.name(), %id, rows = rows.len(), %status, "record persisted");

        state.status = status;
        state.dirty.clear();
        Ok(())
    }

    /// Saves the targets of a source-owned, non-embedded relationship and
    /// stores their ids in `record`. `record` may be embedded.
    pub(crate) fn save_source_owned(
        &mut self,
        record: &Record,
        rel: &EntityRelationship,
    ) -> CoreResult<()> {
        let Some(targets) = record.buffered(rel.name()) else {
            if rel.is_composition() {
                let stored = record.inner.borrow().stored_ids(rel.name(), rel.is_array());
                let ctx = Rc::clone(&self.ctx);
                for id in &stored {
                    if let Some(child) = ctx.resolve(record.entity(), rel.name(), rel.target(), id)? {
                        self.save(&child)?;
                    }
                }
            }
            return Ok(());
        };

        for target in &targets {
            self.save(target)?;
        }
        let ids: Vec<RecordId> = targets.iter().filter_map(Record::id).collect();

        if rel.is_composition() {
            let previous = record.inner.borrow().stored_ids(rel.name(), rel.is_array());
            for old in previous {
                if !ids.contains(&old) {
                    self.deferred.push((rel.target(), old));
                }
            }
        }

        self.touch(record);
        let mut state = record.inner.borrow_mut();
        state.write_ids(rel.name(), rel.is_array(), &ids);
        state.buffer.remove(rel.name());
        Ok(())
    }

    /// Points the back-reference of every buffered target at `record` and
    /// releases targets that are no longer listed.
    fn save_target_owned(&mut self, record: &Record, rel: &EntityRelationship) -> CoreResult<()> {
        let Some(targets) = record.buffered(rel.name()) else {
            return Ok(());
        };
        let Some(field) = rel.mapped_by() else {
            return Ok(());
        };
        let Some(id) = record.id() else {
            return Ok(());
        };
        let ctx = Rc::clone(&self.ctx);
        let target_meta = ctx.entity(rel.target());

        let listed: Vec<RecordId> = targets.iter().filter_map(Record::id).collect();
        let previous = ctx
            .store
            .ids_with_value(target_meta.channel()?, field, id.as_str())?;
        for old in previous.into_iter().map(RecordId::from) {
            if listed.contains(&old) {
                continue;
            }
            let Some(released) = ctx.load(rel.target(), &old)? else {
                continue;
            };
            if rel.is_composition() {
                self.delete(&released)?;
            } else {
                self.touch(&released);
                released.write_raw(field, None);
                self.save(&released)?;
            }
        }

        for target in &targets {
            let value = Some(id.to_string());
            if !rel.is_composition() && !target.is_new() {
                // Only the back-reference is written; other pending edits on
                // an associated record stay unsaved.
                if let Some(stored) = target.id().map(|t| ctx.load(rel.target(), &t)).transpose()?.flatten() {
                    self.touch(&stored);
                    stored.write_raw(field, value.clone());
                    self.save(&stored)?;

                    self.touch(target);
                    let mut state = target.inner.borrow_mut();
                    state.values.insert(field.to_string(), value);
                    state.buffer.remove(field);
                    continue;
                }
            }
            self.touch(target);
            target.write_raw(field, value);
            self.save(target)?;
        }

        self.touch(record);
        record.inner.borrow_mut().buffer.remove(rel.name());
        Ok(())
    }
}
