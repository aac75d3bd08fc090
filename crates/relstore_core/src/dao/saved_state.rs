//! Serialized record state, for handing a record across a process boundary.
//!
//! A persisted record without pending edits travels as a bare reference.
//! Anything else travels as a diff: its pending fields, its tags and its
//! buffered relationships, recursively.

use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use crate::metadata::EntityRelationship;
use crate::record::{Record, RecordState};
use crate::types::{RecordId, StatusTags};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

/// The identity or pending edits of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SavedState {
    /// A persisted record with no pending edits.
    Reference {
        /// Entity name.
        entity: String,
        /// Record id.
        id: RecordId,
    },
    /// A record with pending edits, or an embedded record.
    Diff {
        /// Entity name.
        entity: String,
        /// Record id, if one was assigned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<RecordId>,
        /// Stored status bits.
        status: u8,
        /// Pending field values. Embedded records carry all of them.
        fields: BTreeMap<String, Option<String>>,
        /// Buffered relationship values.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        relationships: BTreeMap<String, Vec<SavedState>>,
    },
}

impl SavedState {
    /// Returns the entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        match self {
            Self::Reference { entity, .. } | Self::Diff { entity, .. } => entity,
        }
    }

    /// Returns true for a bare reference.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference { .. })
    }

    /// Encodes as JSON.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from JSON.
    pub fn from_json(text: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ============================================================================
// Encoding
// ============================================================================

pub(crate) fn encode(record: &Record) -> CoreResult<SavedState> {
    Encoder::default().encode(record)
}

#[derive(Default)]
struct Encoder {
    active: HashSet<*const RefCell<RecordState>>,
}

impl Encoder {
    fn encode(&mut self, record: &Record) -> CoreResult<SavedState> {
        let entity = record.entity();
        let id = record.id();
        if !record.is_internal() && !record.is_new() && !record.is_dirty() {
            if let Some(id) = id {
                return Ok(reference(entity.name(), id));
            }
        }

        let ptr = Rc::as_ptr(&record.inner);
        if !self.active.insert(ptr) {
            // Already being encoded further up: refer to it by id.
            return match id {
                Some(id) => Ok(reference(entity.name(), id)),
                None => Err(CoreError::usage(format!(
                    "{} record without an id is part of a cycle",
                    entity.name()
                ))),
            };
        }
        let result = self.encode_diff(record);
        self.active.remove(&ptr);
        result
    }

    fn encode_diff(&mut self, record: &Record) -> CoreResult<SavedState> {
        let ctx = Rc::clone(&record.ctx);
        let entity = ctx.entity(record.entity_key());
        let internal = entity.is_internal();

        let (id, status, fields, buffered) = {
            let state = record.inner.borrow();
            let fields = if internal {
                state.values.clone()
            } else {
                state
                    .dirty
                    .iter()
                    .map(|k| (k.clone(), state.values.get(k).cloned().flatten()))
                    .collect()
            };
            let buffered: Vec<String> = state.buffer.keys().cloned().collect();
            (state.id.clone(), state.status.bits(), fields, buffered)
        };

        let mut relationships = BTreeMap::new();
        for rel in entity.relationships() {
            let embeds = ctx.entity(rel.target()).is_internal();
            let targets = if buffered.iter().any(|name| name == rel.name()) {
                record.buffered(rel.name()).unwrap_or_default()
            } else if internal && embeds {
                // Nested embedded records live in the owner; carry them along.
                record.resolve_stored(rel)?
            } else {
                continue;
            };
            let encoded = targets
                .iter()
                .map(|target| self.encode_target(rel, target))
                .collect::<CoreResult<Vec<_>>>()?;
            relationships.insert(rel.name().to_string(), encoded);
        }

        Ok(SavedState::Diff {
            entity: entity.name().to_string(),
            id,
            status,
            fields,
            relationships,
        })
    }

    fn encode_target(&mut self, rel: &EntityRelationship, target: &Record) -> CoreResult<SavedState> {
        if !rel.is_composition() && !target.is_new() {
            if let Some(id) = target.id() {
                return Ok(reference(target.entity().name(), id));
            }
        }
        self.encode(target)
    }
}

fn reference(entity: &str, id: RecordId) -> SavedState {
    SavedState::Reference {
        entity: entity.to_string(),
        id,
    }
}

// ============================================================================
// Decoding
// ============================================================================

pub(crate) fn decode(ctx: &Rc<Context>, saved: &SavedState) -> CoreResult<Record> {
    match saved {
        SavedState::Reference { entity, id } => {
            let meta = ctx.schema.require(entity)?;
            ctx.load(meta.key(), id)?.ok_or_else(|| {
                CoreError::consistency(format!("saved state refers to missing {entity} {id}"))
            })
        }
        SavedState::Diff {
            entity,
            id,
            status,
            fields,
            relationships,
        } => {
            let meta = ctx.schema.require(entity)?;
            let status = StatusTags::from_bits(*status);

            let stored = match id {
                Some(id) if !meta.is_internal() && !status.is_new() => ctx.load(meta.key(), id)?,
                _ => None,
            };
            let record = stored.unwrap_or_else(|| {
                let mut state = RecordState::new(meta.key(), status);
                state.id = id.clone();
                Record::from_state(Rc::clone(ctx), state)
            });

            {
                let mut state = record.inner.borrow_mut();
                state.status = status;
                for (key, value) in fields {
                    if meta.is_internal() {
                        state.values.insert(key.clone(), value.clone());
                    } else {
                        state.set_field(key.clone(), value.clone());
                    }
                }
            }

            for (name, targets) in relationships {
                meta.require_relationship(name)?;
                let decoded = targets
                    .iter()
                    .map(|target| decode(ctx, target))
                    .collect::<CoreResult<Vec<_>>>()?;
                record.inner.borrow_mut().buffer.insert(name.clone(), decoded);
            }
            Ok(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape() {
        let state = SavedState::Diff {
            entity: "Invoice".into(),
            id: None,
            status: 7,
            fields: BTreeMap::from([("number".to_string(), Some("A-1".to_string()))]),
            relationships: BTreeMap::from([(
                "customer".to_string(),
                vec![SavedState::Reference {
                    entity: "Customer".into(),
                    id: RecordId::from("c1"),
                }],
            )]),
        };

        let json = state.to_json().unwrap();
        assert!(json.contains(r#""kind":"diff""#));
        assert!(json.contains(r#""kind":"reference""#));
        assert!(!json.contains(r#""id":null"#));
        assert_eq!(SavedState::from_json(&json).unwrap(), state);
    }

    #[test]
    fn malformed_json_is_a_saved_state_error() {
        let err = SavedState::from_json("{\"kind\":\"nope\"}").unwrap_err();
        assert!(matches!(err, CoreError::SavedState(_)));
    }
}
