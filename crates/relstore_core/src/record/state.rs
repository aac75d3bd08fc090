//! The mutable state shared by every handle to one record.

use super::Record;
use crate::metadata::EntityKey;
use crate::path::element_key;
use crate::types::{RecordId, StatusTags};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Weak;

/// Where an embedded record lives inside its top-level owner.
#[derive(Debug, Clone)]
pub(crate) struct EmbeddingLink {
    pub(crate) owner: Weak<RefCell<RecordState>>,
    pub(crate) path: String,
    /// Entity and id of the owner, for reloading it once the handle is gone.
    pub(crate) root: EntityKey,
    pub(crate) root_id: Option<RecordId>,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordState {
    pub(crate) entity: EntityKey,
    pub(crate) id: Option<RecordId>,
    pub(crate) values: BTreeMap<String, Option<String>>,
    pub(crate) status: StatusTags,
    pub(crate) dirty: BTreeSet<String>,
    pub(crate) buffer: BTreeMap<String, Vec<Record>>,
    /// Stored embedded children, read once per relationship.
    pub(crate) children: BTreeMap<String, Vec<Record>>,
    pub(crate) deleted: bool,
    pub(crate) embedding: Option<EmbeddingLink>,
}

impl RecordState {
    pub(crate) fn new(entity: EntityKey, status: StatusTags) -> Self {
        Self {
            entity,
            id: None,
            values: BTreeMap::new(),
            status,
            dirty: BTreeSet::new(),
            buffer: BTreeMap::new(),
            children: BTreeMap::new(),
            deleted: false,
            embedding: None,
        }
    }

    pub(crate) fn hydrated(
        entity: EntityKey,
        id: RecordId,
        values: BTreeMap<String, Option<String>>,
        status: StatusTags,
    ) -> Self {
        Self {
            id: Some(id),
            values,
            ..Self::new(entity, status)
        }
    }

    pub(crate) fn embedded(
        entity: EntityKey,
        values: BTreeMap<String, Option<String>>,
        children: BTreeMap<String, Vec<Record>>,
        embedding: EmbeddingLink,
    ) -> Self {
        Self {
            values,
            children,
            embedding: Some(embedding),
            ..Self::new(entity, StatusTags::empty())
        }
    }

    /// Writes a field and marks it dirty.
    pub(crate) fn set_field(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        self.values.insert(key.clone(), value);
        self.dirty.insert(key);
    }

    pub(crate) fn field(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_deref())
    }

    /// Element count stored under an array key; zero when absent or null.
    pub(crate) fn array_len(&self, key: &str) -> usize {
        self.field(key)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0)
    }

    /// Writes an array as a count plus one key per element, nulling any
    /// elements left over from a longer previous value.
    pub(crate) fn write_array(&mut self, key: &str, elements: Option<Vec<String>>) {
        let previous = self.array_len(key);
        let elements = match elements {
            Some(elements) => elements,
            None => {
                self.set_field(key, None);
                for i in 0..previous {
                    self.set_field(element_key(key, i), None);
                }
                return;
            }
        };
        self.set_field(key, Some(elements.len().to_string()));
        let count = elements.len();
        for (i, element) in elements.into_iter().enumerate() {
            self.set_field(element_key(key, i), Some(element));
        }
        for i in count..previous {
            self.set_field(element_key(key, i), None);
        }
    }

    /// Ids stored in a source-owned relationship field.
    pub(crate) fn stored_ids(&self, name: &str, array: bool) -> Vec<RecordId> {
        if !array {
            return self.field(name).map(RecordId::from).into_iter().collect();
        }
        (0..self.array_len(name))
            .filter_map(|i| self.field(&element_key(name, i)).map(RecordId::from))
            .collect()
    }

    /// Stores ids into a source-owned relationship field.
    pub(crate) fn write_ids(&mut self, name: &str, array: bool, ids: &[RecordId]) {
        if array {
            self.write_array(name, Some(ids.iter().map(ToString::to_string).collect()));
        } else {
            self.set_field(name, ids.first().map(ToString::to_string));
        }
    }

    /// Rolls back to `snapshot`, keeping an id assigned since it was taken.
    pub(crate) fn restore(&mut self, snapshot: Self) {
        let id = self.id.take().or(snapshot.id.clone());
        *self = snapshot;
        self.id = id;
    }
}
