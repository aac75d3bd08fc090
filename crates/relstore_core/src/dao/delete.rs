//! Delete cascade.
//!
//! 1. Target-owned relationships: composed targets are deleted, associated
//!    targets have their back-reference cleared.
//! 2. Remaining singular references to the record abort the delete.
//! 3. The record's rows are removed, leaving a tombstone for records the
//!    remote source knows about.
//! 4. Composed targets of source-owned relationships are deleted, including
//!    those held by embedded records.

use super::Cascade;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntityKey, EntityMetadata};
use crate::path::{child_key, matches_template, template_glob};
use crate::record::Record;
use crate::types::RecordId;
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::debug;

impl Cascade {
    /// Deletes a top-level record and everything it owns.
    pub(crate) fn delete(&mut self, record: &Record) -> CoreResult<()> {
        if record.is_internal() {
            return Err(CoreError::usage(format!(
                "{} is internal and is deleted through its owner",
                record.entity().name()
            )));
        }
        if record.is_deleted() {
            return Ok(());
        }
        self.touch(record);

        let key = record.entity_key();
        let id = match record.id() {
            Some(id) if !record.is_new() => id,
            _ => {
                record.inner.borrow_mut().deleted = true;
                return Ok(());
            }
        };
        if !self.deleting.insert((key, id.clone())) {
            return Ok(());
        }
        let result = self.delete_steps(record, key, &id);
        self.deleting.remove(&(key, id));
        result?;

        record.inner.borrow_mut().deleted = true;
        Ok(())
    }

    fn delete_steps(&mut self, record: &Record, key: EntityKey, id: &RecordId) -> CoreResult<()> {
        let ctx = Rc::clone(&self.ctx);
        let entity = ctx.entity(key);
        // Owned targets are found through what is stored, not through
        // unsaved edits on the handle.
        let stored = ctx.load(key, id)?.unwrap_or_else(|| record.clone());

        for rel in entity.relationships().iter().filter(|r| !r.is_source_owned()) {
            let Some(field) = rel.mapped_by() else {
                continue;
            };
            let target = ctx.entity(rel.target());
            for child_id in ctx.store.ids_with_value(target.channel()?, field, id.as_str())? {
                let Some(child) = ctx.load(rel.target(), &RecordId::from(child_id))? else {
                    continue;
                };
                if rel.is_composition() {
                    self.delete(&child)?;
                } else {
                    self.touch(&child);
                    child.write_raw(field, None);
                    self.save(&child)?;
                }
            }
        }

        self.check_references(entity, id)?;

        let channel = entity.channel()?;
        let removed = ctx.store.delete_record(channel, id.as_str())?;
        if !self.sync && !record.status().is_local() {
            ctx.store.add_tombstone(channel, id.as_str())?;
        }
        debug!(entity = entity.name(), %id, rows = removed, sync = self.sync, "record deleted");

        self.delete_owned(&stored)
    }

    /// Deletes the top-level composition targets held by `holder`, which is
    /// either the record being deleted or one of its embedded records.
    fn delete_owned(&mut self, holder: &Record) -> CoreResult<()> {
        let ctx = Rc::clone(&self.ctx);
        let entity = ctx.entity(holder.entity_key());
        for rel in entity.relationships().iter().filter(|r| r.is_source_owned()) {
            if ctx.entity(rel.target()).is_internal() {
                for embedded in holder.resolve_stored(rel)? {
                    self.delete_owned(&embedded)?;
                }
            } else if rel.is_composition() {
                let ids = holder.inner.borrow().stored_ids(rel.name(), rel.is_array());
                for child_id in &ids {
                    if let Some(child) = ctx.load(rel.target(), child_id)? {
                        self.delete(&child)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Fails if any singular source-owned relationship still points at `id`.
    fn check_references(&self, entity: &EntityMetadata, id: &RecordId) -> CoreResult<()> {
        let ctx = &self.ctx;
        let mut holders = BTreeSet::new();

        for r in entity.references_to_me() {
            let holder = ctx.entity(r.entity);
            let rel = ctx.schema.relationship(*r);
            if !rel.is_source_owned() || rel.is_array() {
                continue;
            }
            let is_self = |root: EntityKey, holder_id: &str| root == entity.key() && holder_id == id.as_str();

            if holder.is_internal() {
                for embedding in holder.embeddings() {
                    let template = child_key(&embedding.template, rel.name());
                    let root = ctx.entity(embedding.root);
                    let rows = ctx
                        .store
                        .rows_with_value(root.channel()?, id.as_str(), &template_glob(&template))?;
                    if rows
                        .iter()
                        .any(|(holder_id, name)| matches_template(&template, name) && !is_self(embedding.root, holder_id))
                    {
                        holders.insert(holder.name().to_string());
                    }
                }
            } else {
                let ids = ctx
                    .store
                    .ids_with_value(holder.channel()?, rel.name(), id.as_str())?;
                if ids.iter().any(|holder_id| !is_self(r.entity, holder_id)) {
                    holders.insert(holder.name().to_string());
                }
            }
        }

        if holders.is_empty() {
            return Ok(());
        }
        Err(CoreError::ReferenceViolation {
            entity: entity.name().to_string(),
            id: id.to_string(),
            referenced_by: holders.into_iter().collect(),
        })
    }
}
