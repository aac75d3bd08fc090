//! Relationship reads and buffered relationship writes.

use super::Record;
use crate::codec;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{Cardinality, EntityKey, EntityRelationship};
use crate::path::{child_key, element_key, FieldPath};
use crate::types::RecordId;

impl Record {
    /// Reads a singular relationship. A buffered edit wins over storage.
    pub fn relationship(&self, name: &str) -> CoreResult<Option<Record>> {
        let rel = self.relationship_meta(name, Cardinality::Single)?;
        if let Some(buffered) = self.buffered(name) {
            return Ok(buffered.into_iter().next());
        }
        Ok(self.resolve_stored(rel)?.into_iter().next())
    }

    /// Reads an array relationship. A buffered edit wins over storage.
    pub fn relationship_array(&self, name: &str) -> CoreResult<Vec<Record>> {
        let rel = self.relationship_meta(name, Cardinality::Array)?;
        if let Some(buffered) = self.buffered(name) {
            return Ok(buffered);
        }
        self.resolve_stored(rel)
    }

    /// Buffers a new value for a singular relationship.
    pub fn set_relationship(&self, name: &str, target: Option<&Record>) -> CoreResult<()> {
        let rel = self.writable_relationship(name, Cardinality::Single)?;
        if let Some(target) = target {
            self.check_target(rel, target)?;
        }
        self.inner
            .borrow_mut()
            .buffer
            .insert(name.to_string(), target.into_iter().cloned().collect());
        Ok(())
    }

    /// Buffers a new value for an array relationship.
    pub fn set_relationship_array(&self, name: &str, targets: Vec<Record>) -> CoreResult<()> {
        let rel = self.writable_relationship(name, Cardinality::Array)?;
        for target in &targets {
            self.check_target(rel, target)?;
        }
        self.inner
            .borrow_mut()
            .buffer
            .insert(name.to_string(), targets);
        Ok(())
    }

    /// Appends to an array relationship, starting from its current value.
    pub fn add_relationship(&self, name: &str, target: &Record) -> CoreResult<()> {
        let rel = self.writable_relationship(name, Cardinality::Array)?;
        self.check_target(rel, target)?;
        let mut current = self.relationship_array(name)?;
        current.push(target.clone());
        self.inner
            .borrow_mut()
            .buffer
            .insert(name.to_string(), current);
        Ok(())
    }

    /// Removes every occurrence of `target` from an array relationship,
    /// starting from its current value. Returns true if anything was removed.
    pub fn remove_relationship(&self, name: &str, target: &Record) -> CoreResult<bool> {
        self.writable_relationship(name, Cardinality::Array)?;
        let mut current = self.relationship_array(name)?;
        let before = current.len();
        current.retain(|r| !r.same_as(target));
        let removed = current.len() != before;
        self.inner
            .borrow_mut()
            .buffer
            .insert(name.to_string(), current);
        Ok(removed)
    }

    /// Returns true if a buffered edit exists for `name`.
    #[must_use]
    pub fn has_buffered(&self, name: &str) -> bool {
        self.inner.borrow().buffer.contains_key(name)
    }

    pub(crate) fn buffered(&self, name: &str) -> Option<Vec<Record>> {
        self.inner.borrow().buffer.get(name).cloned()
    }

    fn relationship_meta(&self, name: &str, cardinality: Cardinality) -> CoreResult<&EntityRelationship> {
        let rel = self.entity().require_relationship(name)?;
        if rel.kind().cardinality() != cardinality {
            return Err(CoreError::usage(format!(
                "{}.{name} is {:?}, not {cardinality:?}",
                self.entity().name(),
                rel.kind().cardinality()
            )));
        }
        Ok(rel)
    }

    fn writable_relationship(&self, name: &str, cardinality: Cardinality) -> CoreResult<&EntityRelationship> {
        self.check_mutable()?;
        let rel = self.relationship_meta(name, cardinality)?;
        if self.is_internal() && !rel.is_source_owned() {
            return Err(CoreError::usage(format!(
                "{}.{name} is resolved from the owner and cannot be set",
                self.entity().name()
            )));
        }
        Ok(rel)
    }

    fn check_target(&self, rel: &EntityRelationship, target: &Record) -> CoreResult<()> {
        if target.entity_key() != rel.target() {
            return Err(CoreError::usage(format!(
                "{}.{} expects {}, got {}",
                self.entity().name(),
                rel.name(),
                self.ctx.entity(rel.target()).name(),
                target.entity().name()
            )));
        }
        target.check_mutable()
    }

    /// Resolves a relationship from stored data, ignoring the buffer.
    pub(crate) fn resolve_stored(&self, rel: &EntityRelationship) -> CoreResult<Vec<Record>> {
        let target = self.ctx.entity(rel.target());
        if target.is_internal() {
            return Ok(self.resolve_embedded(rel));
        }
        if let Some(field) = rel.mapped_by() {
            if self.is_internal() {
                return self.resolve_ancestor(rel.target(), field).map(|r| r.into_iter().collect());
            }
            return self.resolve_reverse(rel, field);
        }
        let ids = self
            .inner
            .borrow()
            .stored_ids(rel.name(), rel.is_array());
        let mut resolved = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(record) = self.ctx.resolve(self.entity(), rel.name(), rel.target(), id)? {
                resolved.push(record);
            }
        }
        Ok(resolved)
    }

    /// Stored embedded children. A top-level record reads them from its own
    /// values once; an embedded record got them when it was hydrated.
    fn resolve_embedded(&self, rel: &EntityRelationship) -> Vec<Record> {
        let cached = self.inner.borrow().children.get(rel.name()).cloned();
        if let Some(children) = cached {
            return children;
        }
        if self.is_internal() {
            return Vec::new();
        }
        let children = codec::read_embedded(self, &child_key("", rel.name()), rel);
        self.inner
            .borrow_mut()
            .children
            .insert(rel.name().to_string(), children.clone());
        children
    }

    fn resolve_reverse(&self, rel: &EntityRelationship, field: &str) -> CoreResult<Vec<Record>> {
        let Some(id) = self.id().filter(|_| !self.is_new()) else {
            return Ok(Vec::new());
        };
        let target = self.ctx.entity(rel.target());
        let ids = self
            .ctx
            .store
            .ids_with_value(target.channel()?, field, id.as_str())?;
        if !rel.is_array() && ids.len() > 1 {
            return Err(CoreError::consistency(format!(
                "{} {id} is referenced by {} records of {} through {field}, expected at most one",
                self.entity().name(),
                ids.len(),
                target.name()
            )));
        }
        let mut resolved = Vec::with_capacity(ids.len());
        for target_id in ids {
            if let Some(record) = self.ctx.load(rel.target(), &RecordId::from(target_id))? {
                resolved.push(record);
            }
        }
        Ok(resolved)
    }

    /// Finds the ancestor of an embedded record that embeds it through `field`.
    fn resolve_ancestor(&self, ancestor: EntityKey, field: &str) -> CoreResult<Option<Record>> {
        let (Some(root), Some(path)) = (self.root()?, self.owner_path()) else {
            return Ok(None);
        };
        let parsed = FieldPath::parse(&path)?;
        let mut owner = root.entity_key();
        let mut prefix = String::new();
        let mut found: Option<(String, EntityKey)> = None;
        for segment in parsed.segments() {
            if segment.name == field && owner == ancestor {
                found = Some((prefix.clone(), owner));
            }
            prefix = child_key(&prefix, &segment.name);
            if let Some(index) = segment.index {
                prefix = element_key(&prefix, index);
            }
            let rel = self.ctx.entity(owner).require_relationship(&segment.name)?;
            owner = rel.target();
        }
        match found {
            None => Ok(None),
            Some((prefix, _)) if prefix.is_empty() => Ok(Some(root)),
            Some((prefix, key)) => Ok(Some(codec::hydrate_embedded(&root, key, &prefix))),
        }
    }
}
