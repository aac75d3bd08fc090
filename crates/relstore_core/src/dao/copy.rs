//! In-memory record copies. Nothing here touches storage except lazy
//! resolution of relationships that have no buffered edit.

use crate::error::CoreResult;
use crate::metadata::EntityRelationship;
use crate::record::{Record, RecordState};
use crate::types::StatusTags;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Returns an independent handle holding the same id, values, dirty set,
/// buffer and tags as `record`.
pub(crate) fn detached(record: &Record) -> Record {
    let mut state = record.inner.borrow().clone();
    if state.embedding.is_some() {
        for children in state.children.values_mut() {
            *children = children.iter().map(detached).collect();
        }
    } else {
        // Re-read from the copy's own values on first access.
        state.children.clear();
    }
    Record::from_state(Rc::clone(&record.ctx), state)
}

/// Returns a new unsaved record with every field of `record` marked dirty.
///
/// Composed and embedded children are copied the same way and buffered.
/// Source-owned associations keep pointing at the same targets. Target-owned
/// associations are dropped.
pub(crate) fn fresh(record: &Record) -> CoreResult<Record> {
    FreshCopier::default().copy(record, None)
}

#[derive(Default)]
struct FreshCopier {
    copies: HashMap<*const RefCell<RecordState>, Record>,
}

impl FreshCopier {
    fn copy(&mut self, record: &Record, back_reference: Option<&str>) -> CoreResult<Record> {
        if let Some(copy) = self.copies.get(&Rc::as_ptr(&record.inner)) {
            return Ok(copy.clone());
        }
        let ctx = Rc::clone(&record.ctx);
        let entity = ctx.entity(record.entity_key());
        let status = if entity.is_internal() {
            StatusTags::empty()
        } else {
            StatusTags::created_locally()
        };
        let copy = Record::from_state(Rc::clone(&ctx), RecordState::new(entity.key(), status));
        self.copies.insert(Rc::as_ptr(&record.inner), copy.clone());

        let mut plain: Vec<&str> = entity.attributes().iter().map(|a| a.name()).collect();
        for rel in entity.relationships() {
            let internal = ctx.entity(rel.target()).is_internal();
            if Some(rel.name()) == back_reference {
                continue;
            }
            if rel.is_source_owned() && !internal && !rel.is_composition() {
                match record.buffered(rel.name()) {
                    Some(targets) => {
                        copy.inner.borrow_mut().buffer.insert(rel.name().to_string(), targets);
                    }
                    None => plain.push(rel.name()),
                }
                continue;
            }
            let owned = rel.is_source_owned() || (rel.is_composition() && !entity.is_internal());
            if owned {
                let children = self.copy_children(record, rel)?;
                copy.inner
                    .borrow_mut()
                    .buffer
                    .insert(rel.name().to_string(), children);
            }
        }

        {
            let source = record.inner.borrow();
            let mut state = copy.inner.borrow_mut();
            for (key, value) in &source.values {
                if plain.iter().any(|name| is_field_key(name, key)) {
                    state.set_field(key.clone(), value.clone());
                }
            }
        }
        Ok(copy)
    }

    fn copy_children(&mut self, record: &Record, rel: &EntityRelationship) -> CoreResult<Vec<Record>> {
        let current = match record.buffered(rel.name()) {
            Some(buffered) => buffered,
            None => record.resolve_stored(rel)?,
        };
        current
            .iter()
            .map(|child| self.copy(child, rel.mapped_by()))
            .collect()
    }
}

/// Returns true for `name` itself and its array element keys.
fn is_field_key(name: &str, key: &str) -> bool {
    match key.strip_prefix(name) {
        Some("") => true,
        Some(rest) => rest.starts_with('[') && !rest.contains('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::is_field_key;

    #[test]
    fn field_keys_cover_elements_only() {
        assert!(is_field_key("tags", "tags"));
        assert!(is_field_key("tags", "tags[3]"));
        assert!(!is_field_key("tag", "tags"));
        assert!(!is_field_key("tags", "tags[0]/x"));
    }
}
