//! Query results.

use super::builder::LeafKind;
use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntityKey, ScalarKind};
use crate::record::Record;
use crate::types::RecordId;
use crate::value::Value;
use std::rc::Rc;
use std::vec;

/// One result of a select.
#[derive(Debug, Clone)]
pub enum Selected {
    /// A whole top-level record.
    Record(Record),
    /// An element of an embedded array: the owner's id and the element index.
    Position {
        /// Id of the top-level owner.
        owner: RecordId,
        /// Element index inside the owner's array.
        index: usize,
    },
    /// The single selected field.
    Value(Option<Value>),
    /// Every selected field, in select-list order.
    Tuple(Vec<Option<Value>>),
}

/// Turns raw result rows into [`Selected`] values.
pub(crate) struct Decoder {
    ctx: Rc<Context>,
    entity: EntityKey,
    internal: bool,
    /// Id columns preceding the field columns.
    leading: usize,
    /// Selected field paths and how they decode.
    fields: Vec<(String, LeafKind)>,
}

impl Decoder {
    pub(crate) fn new(
        ctx: Rc<Context>,
        entity: EntityKey,
        internal: bool,
        leading: usize,
        fields: Vec<(String, LeafKind)>,
    ) -> Self {
        Self {
            ctx,
            entity,
            internal,
            leading,
            fields,
        }
    }

    fn decode(&self, row: Vec<Option<String>>) -> CoreResult<Option<Selected>> {
        if self.fields.is_empty() {
            return self.decode_identity(row);
        }
        let mut values = Vec::with_capacity(self.fields.len());
        for (raw, (field, kind)) in row.into_iter().skip(self.leading).zip(&self.fields) {
            values.push(raw.map(|raw| self.value(field, *kind, raw)).transpose()?);
        }
        if values.len() == 1 {
            return Ok(values.pop().map(Selected::Value));
        }
        Ok(Some(Selected::Tuple(values)))
    }

    fn decode_identity(&self, row: Vec<Option<String>>) -> CoreResult<Option<Selected>> {
        let mut columns = row.into_iter();
        let Some(id) = columns.next().flatten().map(RecordId::from) else {
            return Ok(None);
        };
        if self.internal {
            let index = columns
                .next()
                .flatten()
                .and_then(|raw| raw.parse::<usize>().ok())
                .ok_or_else(|| CoreError::consistency(format!("element of {id} has no index")))?;
            return Ok(Some(Selected::Position { owner: id, index }));
        }
        Ok(self.ctx.load(self.entity, &id)?.map(Selected::Record))
    }

    fn value(&self, field: &str, kind: LeafKind, raw: String) -> CoreResult<Value> {
        let kind = match kind {
            LeafKind::Attribute(kind) => kind,
            LeafKind::Reference => ScalarKind::Text,
        };
        Value::parse(kind, &raw).ok_or_else(|| CoreError::ValueFormat {
            field: field.to_string(),
            entity: self.ctx.entity(self.entity).name().to_string(),
            id: None,
            raw,
            expected: kind.name().to_string(),
        })
    }
}

/// Forward-only iterator over query results.
///
/// Rows are fetched when the cursor is created; records are hydrated as
/// the cursor advances. Dropping the cursor releases everything.
pub struct Cursor {
    rows: vec::IntoIter<Vec<Option<String>>>,
    decoder: Decoder,
}

impl Cursor {
    pub(crate) fn new(rows: Vec<Vec<Option<String>>>, decoder: Decoder) -> Self {
        Self {
            rows: rows.into_iter(),
            decoder,
        }
    }

    /// Number of rows not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for Cursor {
    type Item = CoreResult<Selected>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = self.rows.next()?;
            match self.decoder.decode(row) {
                Ok(Some(selected)) => return Some(Ok(selected)),
                Ok(None) => {}
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
