//! Flattening of internal (embedded) records into their top-level owner.
//!
//! Embedded records have no rows of their own. Their fields live in the
//! owner's record under path-shaped keys:
//!
//! ```text
//! /detail/weight          singular relationship, attribute `weight`
//! /lines                  array relationship, element count
//! /lines[0]               element marker, holds its own index
//! /lines[0]/qty           element field
//! /lines[0]/product       element reference to a top-level record
//! ```
//!
//! A write replaces the whole subtree under the relationship key: every
//! existing key below it is nulled first, then the new tree is written.

use crate::dao::Cascade;
use crate::error::CoreResult;
use crate::metadata::{AttributeType, EntityKey, EntityRelationship, Schema};
use crate::path::{child_key, element_key, is_under};
use crate::record::{EmbeddingLink, Record, RecordState};
use crate::types::StatusTags;
use std::collections::BTreeMap;
use std::rc::Rc;

/// An embedded record, flattened into leaves plus nested children.
struct Node {
    record: Record,
    leaves: Vec<(String, Option<String>)>,
    children: Vec<(String, Child)>,
}

enum Child {
    Single(EntityKey, Option<Node>),
    Array(Vec<Node>),
}

impl Child {
    fn records(&self) -> Vec<Record> {
        match self {
            Child::Single(_, node) => node.iter().map(|n| n.record.clone()).collect(),
            Child::Array(nodes) => nodes.iter().map(|n| n.record.clone()).collect(),
        }
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Reads the embedded record stored at `prefix`, if any of its keys holds a
/// value.
pub(crate) fn read_single(root: &Record, prefix: &str, entity: EntityKey) -> Option<Record> {
    let present = {
        let state = root.inner.borrow();
        let below = format!("{prefix}/");
        state
            .values
            .range(below.clone()..)
            .take_while(|(key, _)| key.starts_with(&below))
            .any(|(_, value)| value.is_some())
    };
    present.then(|| hydrate_embedded(root, entity, prefix))
}

/// Reads the embedded array stored at `prefix`. Elements whose marker was
/// nulled are skipped.
pub(crate) fn read_array(root: &Record, prefix: &str, entity: EntityKey) -> Vec<Record> {
    let keys: Vec<String> = {
        let state = root.inner.borrow();
        (0..state.array_len(prefix))
            .map(|i| element_key(prefix, i))
            .filter(|key| state.field(key).is_some())
            .collect()
    };
    keys.iter()
        .map(|key| hydrate_embedded(root, entity, key))
        .collect()
}

/// Builds a detached view of the embedded record at `path`, holding its own
/// attributes and references under relative keys. Nested embedded records
/// are read along with it, so the view stays complete once `root` is gone.
pub(crate) fn hydrate_embedded(root: &Record, entity: EntityKey, path: &str) -> Record {
    let meta = root.ctx.entity(entity);
    let mut values = BTreeMap::new();
    {
        let state = root.inner.borrow();
        let mut copy = |name: &str, array: bool| {
            let absolute = child_key(path, name);
            let Some(value) = state.values.get(&absolute) else {
                return;
            };
            values.insert(name.to_string(), value.clone());
            if array {
                for i in 0..state.array_len(&absolute) {
                    if let Some(element) = state.values.get(&element_key(&absolute, i)) {
                        values.insert(element_key(name, i), element.clone());
                    }
                }
            }
        };

        for attribute in meta.attributes() {
            copy(attribute.name(), matches!(attribute.ty(), AttributeType::Array(_)));
        }
        for rel in meta.relationships() {
            if rel.is_source_owned() && !root.ctx.entity(rel.target()).is_internal() {
                copy(rel.name(), rel.is_array());
            }
        }
    }

    let mut children = BTreeMap::new();
    for rel in meta.relationships() {
        if rel.is_source_owned() && root.ctx.entity(rel.target()).is_internal() {
            let records = read_embedded(root, &child_key(path, rel.name()), rel);
            children.insert(rel.name().to_string(), records);
        }
    }

    let state = RecordState::embedded(entity, values, children, link(root, path.to_string()));
    Record::from_state(Rc::clone(&root.ctx), state)
}

/// Reads the stored value of internal relationship `rel` at `prefix`.
pub(crate) fn read_embedded(root: &Record, prefix: &str, rel: &EntityRelationship) -> Vec<Record> {
    if rel.is_array() {
        read_array(root, prefix, rel.target())
    } else {
        read_single(root, prefix, rel.target()).into_iter().collect()
    }
}

fn link(owner: &Record, path: String) -> EmbeddingLink {
    let state = owner.inner.borrow();
    EmbeddingLink {
        owner: Rc::downgrade(&owner.inner),
        path,
        root: state.entity,
        root_id: state.id.clone(),
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Writes the buffered value of an internal relationship into `owner`,
/// replacing whatever was stored there, and attaches the written records.
pub(crate) fn serialize(
    cascade: &mut Cascade,
    owner: &Record,
    rel: &EntityRelationship,
) -> CoreResult<()> {
    let records = owner.buffered(rel.name()).unwrap_or_default();
    let child = materialize_child(cascade, rel, records)?;

    let prefix = child_key("", rel.name());
    let mut written = Vec::new();
    {
        let schema = &owner.ctx.schema;
        let mut state = owner.inner.borrow_mut();
        clear_under(&mut state, &prefix);
        write_child(schema, &mut state, &prefix, &child, &mut written);
        state.buffer.remove(rel.name());
    }

    for (path, record, children) in written {
        attach(owner, &record, path, children);
    }
    owner
        .inner
        .borrow_mut()
        .children
        .insert(rel.name().to_string(), child.records());
    Ok(())
}

fn materialize_child(
    cascade: &mut Cascade,
    rel: &EntityRelationship,
    records: Vec<Record>,
) -> CoreResult<Child> {
    if rel.is_array() {
        let nodes = records
            .into_iter()
            .map(|record| materialize(cascade, record))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Child::Array(nodes))
    } else {
        let node = records
            .into_iter()
            .next()
            .map(|record| materialize(cascade, record))
            .transpose()?;
        Ok(Child::Single(rel.target(), node))
    }
}

fn materialize(cascade: &mut Cascade, record: Record) -> CoreResult<Node> {
    cascade.touch(&record);
    let ctx = Rc::clone(&record.ctx);
    let meta = ctx.entity(record.entity_key());

    let mut children = Vec::new();
    for rel in meta.relationships() {
        if !rel.is_source_owned() {
            continue;
        }
        if ctx.entity(rel.target()).is_internal() {
            let current = match record.buffered(rel.name()) {
                Some(buffered) => buffered,
                None => record.resolve_stored(rel)?,
            };
            let child = materialize_child(cascade, rel, current)?;
            children.push((rel.name().to_string(), child));
        } else {
            cascade.save_source_owned(&record, rel)?;
        }
    }

    let leaves = record
        .inner
        .borrow()
        .values
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Ok(Node {
        record,
        leaves,
        children,
    })
}

/// Nulls every key at or beneath `prefix`.
fn clear_under(state: &mut RecordState, prefix: &str) {
    let keys: Vec<String> = state
        .values
        .iter()
        .filter(|(key, value)| value.is_some() && is_under(prefix, key))
        .map(|(key, _)| key.clone())
        .collect();
    for key in keys {
        state.set_field(key, None);
    }
}

type Written = Vec<(String, Record, BTreeMap<String, Vec<Record>>)>;

fn write_child(schema: &Schema, state: &mut RecordState, prefix: &str, child: &Child, written: &mut Written) {
    match child {
        Child::Single(entity, None) => write_nulls(schema, state, prefix, *entity),
        Child::Single(_, Some(node)) => write_node(schema, state, prefix, node, written),
        Child::Array(nodes) => {
            state.set_field(prefix, Some(nodes.len().to_string()));
            for (i, node) in nodes.iter().enumerate() {
                let base = element_key(prefix, i);
                state.set_field(base.clone(), Some(i.to_string()));
                write_node(schema, state, &base, node, written);
            }
        }
    }
}

fn write_node(schema: &Schema, state: &mut RecordState, base: &str, node: &Node, written: &mut Written) {
    for (key, value) in &node.leaves {
        state.set_field(child_key(base, key), value.clone());
    }
    for (name, child) in &node.children {
        write_child(schema, state, &child_key(base, name), child, written);
    }
    let children = node
        .children
        .iter()
        .map(|(name, child)| (name.clone(), child.records()))
        .collect();
    written.push((base.to_string(), node.record.clone(), children));
}

/// Writes an explicit null for every leaf a singular embedded record of
/// `entity` could occupy at `base`. Absent and null keys differ for
/// queries, which join on the key name.
fn write_nulls(schema: &Schema, state: &mut RecordState, base: &str, entity: EntityKey) {
    let meta = schema.entity(entity);
    for attribute in meta.attributes() {
        state.set_field(child_key(base, attribute.name()), None);
    }
    for rel in meta.relationships().iter().filter(|r| r.is_source_owned()) {
        let key = child_key(base, rel.name());
        if schema.entity(rel.target()).is_internal() && !rel.is_array() {
            write_nulls(schema, state, &key, rel.target());
        } else {
            state.set_field(key, None);
        }
    }
}

/// Links a written record to its owner and resets its edit state.
fn attach(owner: &Record, record: &Record, path: String, children: BTreeMap<String, Vec<Record>>) {
    let embedding = link(owner, path);
    let mut state = record.inner.borrow_mut();
    state.embedding = Some(embedding);
    state.children = children;
    state.buffer.clear();
    state.dirty.clear();
    state.status = StatusTags::empty();
}
