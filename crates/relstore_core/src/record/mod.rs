//! Live records.
//!
//! A [`Record`] is a cheap, clonable handle onto one entity instance. All
//! clones share the same state: the stored field values, the set of dirty
//! fields, the relationship edit buffer and the status tags. Nothing a
//! record does touches storage except lazy relationship resolution; edits
//! reach the store only through a DAO save.
//!
//! Records are single-threaded (`!Send`), like the connection behind them.

mod accessors;
mod relationship;
mod state;

pub(crate) use state::{EmbeddingLink, RecordState};

use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{AttributeType, EntityKey, EntityMetadata};
use crate::path::element_key;
use crate::types::{RecordId, StatusTags};
use crate::value::Scalar;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A handle onto one record.
#[derive(Clone)]
pub struct Record {
    pub(crate) inner: Rc<RefCell<RecordState>>,
    pub(crate) ctx: Rc<Context>,
}

impl Record {
    pub(crate) fn from_state(ctx: Rc<Context>, state: RecordState) -> Self {
        Self {
            inner: Rc::new(RefCell::new(state)),
            ctx,
        }
    }

    /// Returns the entity metadata.
    #[must_use]
    pub fn entity(&self) -> &EntityMetadata {
        self.ctx.entity(self.entity_key())
    }

    /// Returns the entity key.
    #[must_use]
    pub fn entity_key(&self) -> EntityKey {
        self.inner.borrow().entity
    }

    /// Returns the id. New and embedded records have none.
    #[must_use]
    pub fn id(&self) -> Option<RecordId> {
        self.inner.borrow().id.clone()
    }

    /// Returns the status tags.
    #[must_use]
    pub fn status(&self) -> StatusTags {
        self.inner.borrow().status
    }

    /// Returns true until the record is first saved.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.inner.borrow().status.is_new()
    }

    /// Returns true if the record holds unsaved field or relationship edits.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        let state = self.inner.borrow();
        !state.dirty.is_empty() || !state.buffer.is_empty()
    }

    /// Returns true once the record was deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.inner.borrow().deleted
    }

    /// Returns true for records of internal entities.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.entity().is_internal()
    }

    /// Returns the top-level record this embedded record was saved into,
    /// while some handle to it is still alive.
    #[must_use]
    pub fn owner(&self) -> Option<Record> {
        let state = self.inner.borrow();
        let owner = state.embedding.as_ref()?.owner.upgrade()?;
        Some(Self {
            inner: owner,
            ctx: Rc::clone(&self.ctx),
        })
    }

    /// Like [`Record::owner`], but reloads a saved owner whose handles were
    /// all dropped.
    pub(crate) fn root(&self) -> CoreResult<Option<Record>> {
        if let Some(owner) = self.owner() {
            return Ok(Some(owner));
        }
        let link = self.inner.borrow().embedding.clone();
        match link {
            Some(EmbeddingLink {
                root,
                root_id: Some(id),
                ..
            }) => self.ctx.load(root, &id),
            _ => Ok(None),
        }
    }

    /// Returns the absolute path of this embedded record inside its owner.
    #[must_use]
    pub fn owner_path(&self) -> Option<String> {
        self.inner
            .borrow()
            .embedding
            .as_ref()
            .map(|e| e.path.clone())
    }

    /// Returns the names of fields changed since the last save.
    #[must_use]
    pub fn dirty_fields(&self) -> Vec<String> {
        self.inner.borrow().dirty.iter().cloned().collect()
    }

    /// Returns a copy of the raw field map.
    #[must_use]
    pub fn raw_fields(&self) -> BTreeMap<String, Option<String>> {
        self.inner.borrow().values.clone()
    }

    /// Returns true if both handles denote the same record: the same state,
    /// or the same entity and id.
    #[must_use]
    pub fn same_as(&self, other: &Record) -> bool {
        if Rc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        let (a, b) = (self.inner.borrow(), other.inner.borrow());
        a.entity == b.entity && a.id.is_some() && a.id == b.id
    }

    // ========================================================================
    // Untyped attribute access
    // ========================================================================

    /// Reads the raw text of an attribute.
    pub fn value(&self, name: &str) -> CoreResult<Option<String>> {
        self.entity().require_attribute(name)?;
        Ok(self.inner.borrow().field(name).map(str::to_string))
    }

    /// Writes the raw text of an attribute and marks it dirty.
    pub fn set_value(&self, name: &str, value: Option<String>) -> CoreResult<()> {
        self.entity().require_attribute(name)?;
        self.check_mutable()?;
        self.inner.borrow_mut().set_field(name, value);
        Ok(())
    }

    // ========================================================================
    // Typed attribute access
    // ========================================================================

    /// Reads a scalar attribute as `T`.
    pub fn scalar<T: Scalar>(&self, name: &str) -> CoreResult<Option<T>> {
        self.check_type(name, AttributeType::Scalar(T::KIND))?;
        let state = self.inner.borrow();
        state
            .field(name)
            .map(|raw| self.parse::<T>(name, raw))
            .transpose()
    }

    /// Writes a scalar attribute. Every write marks the field dirty.
    pub fn set_scalar<T: Scalar>(&self, name: &str, value: Option<T>) -> CoreResult<()> {
        self.check_type(name, AttributeType::Scalar(T::KIND))?;
        self.check_mutable()?;
        self.inner
            .borrow_mut()
            .set_field(name, value.as_ref().map(Scalar::format));
        Ok(())
    }

    /// Reads an array attribute as `Vec<T>`.
    pub fn array<T: Scalar>(&self, name: &str) -> CoreResult<Option<Vec<T>>> {
        self.check_type(name, AttributeType::Array(T::KIND))?;
        let state = self.inner.borrow();
        if state.field(name).is_none() {
            return Ok(None);
        }
        (0..state.array_len(name))
            .map(|i| {
                let key = element_key(name, i);
                let raw = state.field(&key).ok_or_else(|| {
                    CoreError::consistency(format!(
                        "{}.{name} holds {} elements but {key} is missing",
                        self.entity().name(),
                        state.array_len(name)
                    ))
                })?;
                self.parse::<T>(&key, raw)
            })
            .collect::<CoreResult<Vec<T>>>()
            .map(Some)
    }

    /// Writes an array attribute.
    pub fn set_array<T: Scalar>(&self, name: &str, values: Option<Vec<T>>) -> CoreResult<()> {
        self.check_type(name, AttributeType::Array(T::KIND))?;
        self.check_mutable()?;
        let elements = values.map(|v| v.iter().map(Scalar::format).collect());
        self.inner.borrow_mut().write_array(name, elements);
        Ok(())
    }

    fn check_type(&self, name: &str, expected: AttributeType) -> CoreResult<()> {
        let attribute = self.entity().require_attribute(name)?;
        if attribute.ty() != expected {
            return Err(CoreError::usage(format!(
                "{}.{name} is {}, not {expected}",
                self.entity().name(),
                attribute.ty()
            )));
        }
        Ok(())
    }

    fn parse<T: Scalar>(&self, field: &str, raw: &str) -> CoreResult<T> {
        T::parse(raw).ok_or_else(|| CoreError::ValueFormat {
            field: field.to_string(),
            entity: self.entity().name().to_string(),
            id: self.id().map(|id| id.to_string()),
            raw: raw.to_string(),
            expected: T::KIND.name().to_string(),
        })
    }

    pub(crate) fn check_mutable(&self) -> CoreResult<()> {
        if self.is_deleted() {
            return Err(CoreError::usage(format!(
                "{} record {} is deleted",
                self.entity().name(),
                self.id().map_or_else(|| "<unsaved>".to_string(), |id| id.to_string())
            )));
        }
        Ok(())
    }

    /// Writes a field without any checks. Used for back-references.
    pub(crate) fn write_raw(&self, key: &str, value: Option<String>) {
        let mut state = self.inner.borrow_mut();
        state.set_field(key, value);
        state.buffer.remove(key);
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Record")
            .field("entity", &self.ctx.entity(state.entity).name())
            .field("id", &state.id)
            .field("status", &state.status)
            .field("dirty", &state.dirty.len())
            .finish_non_exhaustive()
    }
}
