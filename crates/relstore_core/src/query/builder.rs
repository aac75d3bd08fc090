//! Typed select builder.
//!
//! Selecting K fields of one logical record from an EAV channel takes K
//! self-joins, one per field row. [`JoinTree`] interns every field path a
//! statement mentions (select list, filters, ordering, restrictions) and
//! hands out one alias per distinct join, in first-use order.
//!
//! Two kinds of source are supported:
//!
//! - top-level entities, one result row per record, driven by the record's
//!   `$status` row;
//! - internal entities embedded in an array of a top-level entity, one
//!   result row per element, driven by the element markers. Field keys are
//!   computed from the element index (`'/lines[' || r.idx || ']/qty'`).

use super::cursor::{Cursor, Decoder, Selected};
use super::filter::{Cast, Collation, Filter};
use super::sql::{quote_literal, CompiledQuery, Fragment, KeySql, SqlAssembler};
use crate::context::{Context, STATUS_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{AttributeType, EntityKey, ScalarKind};
use crate::path::{child_key, decode_identifier, glob_escape, FieldPath};
use crate::record::Record;
use crate::types::RecordId;
use crate::value::Value;
use relstore_storage::SqlParam;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Where a select reads its rows from.
#[derive(Debug, Clone)]
pub(crate) enum Source {
    TopLevel,
    /// Elements of the embedded array at `prefix` inside records of `root`,
    /// optionally of one owner only.
    Internal {
        root: EntityKey,
        prefix: String,
        owner: Option<RecordId>,
    },
}

/// Base restriction replacing or narrowing the set of candidate records.
#[derive(Debug, Clone)]
pub(crate) enum Restriction {
    /// Only these ids.
    Ids(Vec<RecordId>),
    /// Only records whose `field` holds `id`.
    MappedBy { field: String, id: RecordId },
    /// Only records whose id, or `field`, is produced by `select`.
    SubSelect {
        field: Option<String>,
        select: Box<Select>,
    },
}

#[derive(Debug, Clone)]
struct Order {
    field: String,
    descending: bool,
    collation: Option<Collation>,
}

/// A select statement over one entity.
///
/// With no fields the results are whole records (or element positions for
/// embedded entities); with one field, single values; with more, tuples.
#[derive(Clone)]
pub struct Select {
    ctx: Rc<Context>,
    entity: EntityKey,
    source: Source,
    fields: Vec<String>,
    filters: Vec<Filter>,
    order: Vec<Order>,
    restrictions: Vec<Restriction>,
    distinct: bool,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl fmt::Debug for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("entity", &self.ctx.entity(self.entity).name())
            .field("source", &self.source)
            .field("fields", &self.fields)
            .field("filters", &self.filters.len())
            .field("distinct", &self.distinct)
            .finish_non_exhaustive()
    }
}

impl Select {
    pub(crate) fn new(ctx: Rc<Context>, entity: EntityKey, source: Source) -> Self {
        Self {
            ctx,
            entity,
            source,
            fields: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            restrictions: Vec::new(),
            distinct: false,
            limit: None,
            offset: None,
        }
    }

    pub(crate) fn restrict(mut self, restriction: Restriction) -> Self {
        self.restrictions.push(restriction);
        self
    }

    /// Adds a field to the select list.
    #[must_use]
    pub fn field(mut self, path: &str) -> Self {
        self.fields.push(path.to_string());
        self
    }

    /// Adds several fields to the select list.
    #[must_use]
    pub fn fields<'a>(mut self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        self.fields.extend(paths.into_iter().map(str::to_string));
        self
    }

    /// Adds a filter. Filters are combined with `AND`.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Orders ascending by `field`.
    #[must_use]
    pub fn order_by(self, field: &str) -> Self {
        self.order_with(field, false, None)
    }

    /// Orders descending by `field`.
    #[must_use]
    pub fn order_by_desc(self, field: &str) -> Self {
        self.order_with(field, true, None)
    }

    /// Orders by `field` with an explicit collation.
    #[must_use]
    pub fn order_with(mut self, field: &str, descending: bool, collation: Option<Collation>) -> Self {
        self.order.push(Order {
            field: field.to_string(),
            descending,
            collation,
        });
        self
    }

    /// Removes duplicate result rows.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Restricts to records whose id is produced by `select`, which must
    /// select no field (ids) or exactly one.
    #[must_use]
    pub fn where_id_in(self, select: Select) -> Self {
        self.restrict(Restriction::SubSelect {
            field: None,
            select: Box::new(select),
        })
    }

    /// Restricts to records whose `field` is produced by `select`.
    #[must_use]
    pub fn where_field_in(self, field: &str, select: Select) -> Self {
        self.restrict(Restriction::SubSelect {
            field: Some(field.to_string()),
            select: Box::new(select),
        })
    }

    /// Compiles the statement.
    pub fn compile(&self) -> CoreResult<CompiledQuery> {
        Ok(self.assemble(false)?.0)
    }

    /// Runs the statement.
    pub fn cursor(&self) -> CoreResult<Cursor> {
        let (compiled, decoder) = self.assemble(false)?;
        let rows = self.ctx.store.query(&compiled.sql, &compiled.params)?;
        Ok(Cursor::new(rows, decoder))
    }

    /// Runs the statement and collects whole records. Embedded elements are
    /// read back from their owners, nested children included. The owner
    /// handle itself is not kept, so [`Record::owner`] is `None` on them;
    /// back-references still reach it by reloading.
    pub fn records(&self) -> CoreResult<Vec<Record>> {
        self.require_fields(0)?;
        let mut records = Vec::new();
        for selected in self.cursor()? {
            match selected? {
                Selected::Record(record) => records.push(record),
                Selected::Position { owner, index } => {
                    if let Some(record) = self.element(&owner, index)? {
                        records.push(record);
                    }
                }
                Selected::Value(_) | Selected::Tuple(_) => {}
            }
        }
        Ok(records)
    }

    /// Runs the statement and collects `(owner, index)` element positions.
    pub fn positions(&self) -> CoreResult<Vec<(RecordId, usize)>> {
        self.require_fields(0)?;
        if matches!(self.source, Source::TopLevel) {
            return Err(CoreError::usage("positions are only defined for embedded entities"));
        }
        let mut positions = Vec::new();
        for selected in self.cursor()? {
            if let Selected::Position { owner, index } = selected? {
                positions.push((owner, index));
            }
        }
        Ok(positions)
    }

    /// Runs a one-field statement and collects its values.
    pub fn values(&self) -> CoreResult<Vec<Option<Value>>> {
        self.require_fields(1)?;
        let mut values = Vec::new();
        for selected in self.cursor()? {
            if let Selected::Value(value) = selected? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Runs a multi-field statement and collects its tuples.
    pub fn tuples(&self) -> CoreResult<Vec<Vec<Option<Value>>>> {
        if self.fields.len() < 2 {
            return Err(CoreError::usage("tuples need at least two fields"));
        }
        let mut tuples = Vec::new();
        for selected in self.cursor()? {
            if let Selected::Tuple(tuple) = selected? {
                tuples.push(tuple);
            }
        }
        Ok(tuples)
    }

    /// Counts the results.
    pub fn count(&self) -> CoreResult<usize> {
        let (inner, _) = self.assemble(false)?;
        let sql = format!("SELECT COUNT(*) FROM ({})", inner.sql);
        let rows = self.ctx.store.query(&sql, &inner.params)?;
        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_deref())
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        Ok(count)
    }

    fn require_fields(&self, count: usize) -> CoreResult<()> {
        if self.fields.len() != count {
            return Err(CoreError::usage(format!(
                "expected {count} selected field(s), found {}",
                self.fields.len()
            )));
        }
        Ok(())
    }

    fn element(&self, owner: &RecordId, index: usize) -> CoreResult<Option<Record>> {
        let Source::Internal { root, prefix, .. } = &self.source else {
            return Ok(None);
        };
        let Some(owner) = self.ctx.load(*root, owner)? else {
            return Ok(None);
        };
        let path = crate::path::element_key(prefix, index);
        Ok(Some(crate::codec::hydrate_embedded(&owner, self.entity, &path)))
    }

    /// Builds the statement. In sub-select mode exactly one column is
    /// produced: the id, or the single selected field.
    fn assemble(&self, sub_select: bool) -> CoreResult<(CompiledQuery, Decoder)> {
        let mut joins = JoinTree::new(&self.ctx, self.entity, &self.source)?;
        let mut sql = SqlAssembler::new(joins.from_fragment()?);
        let internal = !matches!(self.source, Source::TopLevel);

        let mut kinds = Vec::with_capacity(self.fields.len());
        let mut field_exprs = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let leaf = joins.field(field)?;
            kinds.push((field.clone(), leaf.kind));
            field_exprs.push(leaf.expr);
        }

        let id_columns = if internal {
            vec!["r.record_id", "r.idx"]
        } else {
            vec!["r.record_id"]
        };
        let mut leading = 0;
        if sub_select {
            match field_exprs.as_slice() {
                [] if !internal => sql.column("r.record_id"),
                [expr] => sql.column(expr.clone()),
                _ => {
                    return Err(CoreError::usage(
                        "a sub-select must select the id of a top-level entity or exactly one field",
                    ))
                }
            }
        } else if field_exprs.is_empty() {
            for column in &id_columns {
                sql.column(*column);
            }
        } else {
            if !self.distinct {
                for column in &id_columns {
                    sql.column(*column);
                }
                leading = id_columns.len();
            }
            for expr in &field_exprs {
                sql.column(expr.clone());
            }
        }

        for condition in joins.base_conditions() {
            sql.condition(condition);
        }
        for restriction in &self.restrictions {
            sql.condition(self.restriction(&mut joins, restriction)?);
        }
        for filter in &self.filters {
            sql.condition(filter.compile(&mut joins)?);
        }

        for order in &self.order {
            let leaf = joins.field(&order.field)?;
            let expr = match order.collation {
                Some(Collation::NoCase) => format!("{} COLLATE NOCASE", leaf.expr),
                Some(Collation::Cast(cast)) => cast.apply(&leaf.expr),
                None => leaf.default_cast().apply(&leaf.expr),
            };
            let direction = if order.descending { "DESC" } else { "ASC" };
            sql.order(format!("{expr} {direction}"));
        }
        if !self.distinct && !sub_select {
            for column in &id_columns {
                sql.order(*column);
            }
        }

        for join in joins.take_joins() {
            sql.join(join);
        }
        sql.distinct(self.distinct);
        sql.limit(self.limit, self.offset);

        let decoder = Decoder::new(
            Rc::clone(&self.ctx),
            self.entity,
            internal,
            leading,
            kinds,
        );
        Ok((sql.build(), decoder))
    }

    fn restriction(&self, joins: &mut JoinTree, restriction: &Restriction) -> CoreResult<Fragment> {
        match restriction {
            Restriction::Ids(ids) => {
                if ids.is_empty() {
                    return Ok(Fragment::new("0"));
                }
                let placeholders = vec!["?"; ids.len()].join(", ");
                Ok(Fragment::with_params(
                    format!("r.record_id IN ({placeholders})"),
                    ids.iter().map(|id| SqlParam::from(id.as_str())).collect(),
                ))
            }
            Restriction::MappedBy { field, id } => {
                let leaf = joins.field(field)?;
                Ok(Fragment::with_params(
                    format!("{} = ?", leaf.expr),
                    vec![SqlParam::from(id.as_str())],
                ))
            }
            Restriction::SubSelect { field, select } => {
                let expr = match field {
                    Some(field) => joins.field(field)?.expr,
                    None if matches!(self.source, Source::TopLevel) => "r.record_id".to_string(),
                    None => {
                        return Err(CoreError::usage(
                            "embedded entities have no id to restrict by",
                        ))
                    }
                };
                let (inner, _) = select.assemble(true)?;
                Ok(Fragment::with_params(format!("{expr} IN ({})", inner.sql), inner.params))
            }
        }
    }
}

// ============================================================================
// Join tree
// ============================================================================

/// How a resolved field decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeafKind {
    Attribute(ScalarKind),
    /// A reference to a top-level record; the value is its id.
    Reference,
}

pub(crate) struct Leaf {
    pub(crate) expr: String,
    pub(crate) kind: LeafKind,
}

impl Leaf {
    pub(crate) fn default_cast(&self) -> Cast {
        match self.kind {
            LeafKind::Attribute(kind) => Cast::for_kind(kind),
            LeafKind::Reference => Cast::Text,
        }
    }
}

/// Key prefix of the record a path segment is read from.
#[derive(Debug, Clone)]
enum Prefix {
    /// A top-level record: plain keys.
    Root,
    /// An embedded singular record at a fixed path.
    Literal(String),
    /// Inside the current array element of the source.
    Indexed { base: String, rest: String },
}

impl Prefix {
    fn key(&self, name: &str) -> KeySql {
        match self {
            Self::Root => KeySql::Literal(name.to_string()),
            Self::Literal(path) => KeySql::Literal(child_key(path, name)),
            Self::Indexed { base, rest } => KeySql::Indexed {
                prefix: base.clone(),
                suffix: child_key(rest, name),
            },
        }
    }

    fn descend(&self, name: &str) -> Self {
        match self {
            Self::Root => Self::Literal(child_key("", name)),
            Self::Literal(path) => Self::Literal(child_key(path, name)),
            Self::Indexed { base, rest } => Self::Indexed {
                base: base.clone(),
                rest: child_key(rest, name),
            },
        }
    }
}

/// The record a path segment is resolved against.
#[derive(Debug, Clone)]
struct Scope {
    entity: EntityKey,
    channel: String,
    /// SQL expression yielding the record id.
    record: String,
    prefix: Prefix,
}

pub(crate) struct JoinTree<'a> {
    ctx: &'a Context,
    base: Scope,
    source: &'a Source,
    joins: Vec<String>,
    aliases: HashMap<(String, KeySql), String>,
}

impl<'a> JoinTree<'a> {
    fn new(ctx: &'a Context, entity: EntityKey, source: &'a Source) -> CoreResult<Self> {
        let meta = ctx.entity(entity);
        let base = match source {
            Source::TopLevel => Scope {
                entity,
                channel: meta.channel()?.quoted(),
                record: "r.record_id".to_string(),
                prefix: Prefix::Root,
            },
            Source::Internal { root, prefix, .. } => Scope {
                entity,
                channel: ctx.entity(*root).channel()?.quoted(),
                record: "r.record_id".to_string(),
                prefix: Prefix::Indexed {
                    base: prefix.clone(),
                    rest: String::new(),
                },
            },
        };
        Ok(Self {
            ctx,
            base,
            source,
            joins: Vec::new(),
            aliases: HashMap::new(),
        })
    }

    fn from_fragment(&self) -> CoreResult<Fragment> {
        match self.source {
            Source::TopLevel => Ok(Fragment::new(format!("{} AS r", self.base.channel))),
            Source::Internal { prefix, owner, .. } => {
                let len = prefix.chars().count();
                let escaped = glob_escape(prefix);
                let mut sql = format!(
                    "(SELECT record_id, CAST(substr(name, {start}, length(name) - {start}) AS INTEGER) AS idx \
                     FROM {channel} WHERE name GLOB {element} AND name NOT GLOB {nested} AND value IS NOT NULL",
                    start = len + 2,
                    channel = self.base.channel,
                    element = quote_literal(&format!("{escaped}[[][0-9]*]")),
                    nested = quote_literal(&format!("{escaped}[[]*[^0-9]*]")),
                );
                let mut params = Vec::new();
                if let Some(owner) = owner {
                    sql.push_str(" AND record_id = ?");
                    params.push(SqlParam::from(owner.as_str()));
                }
                sql.push_str(") AS r");
                Ok(Fragment::with_params(sql, params))
            }
        }
    }

    fn base_conditions(&self) -> Vec<Fragment> {
        match self.source {
            Source::TopLevel => vec![Fragment::new(format!("r.name = {}", quote_literal(STATUS_FIELD)))],
            Source::Internal { .. } => Vec::new(),
        }
    }

    /// Expression holding the record's status bits.
    pub(crate) fn status_expr(&self) -> CoreResult<&'static str> {
        match self.source {
            Source::TopLevel => Ok("r.value"),
            Source::Internal { .. } => Err(CoreError::usage(
                "embedded entities carry no synchronization status",
            )),
        }
    }

    /// Resolves a dotted field path to the value expression of its row.
    pub(crate) fn field(&mut self, dotted: &str) -> CoreResult<Leaf> {
        let path = FieldPath::parse(&decode_identifier(dotted))?;
        let segments = path.segments();
        let ctx = self.ctx;
        let mut scope = self.base.clone();

        for (position, segment) in segments.iter().enumerate() {
            let last = position + 1 == segments.len();
            if segment.index.is_some() {
                return Err(CoreError::path(dotted, "element indices cannot be selected"));
            }
            let meta = ctx.entity(scope.entity);
            let name = segment.name.as_str();

            if let Some(attribute) = meta.attribute(name) {
                let AttributeType::Scalar(kind) = attribute.ty() else {
                    return Err(CoreError::path(dotted, format!("{name} is an array attribute")));
                };
                if !last {
                    return Err(CoreError::path(dotted, format!("{name} is an attribute")));
                }
                let alias = self.join(&scope, scope.prefix.key(name));
                return Ok(Leaf {
                    expr: format!("{alias}.value"),
                    kind: LeafKind::Attribute(kind),
                });
            }

            let rel = meta.require_relationship(name)?;
            if rel.mapped_by().is_some() {
                return Err(CoreError::path(dotted, format!("{name} is mapped by its target")));
            }
            if rel.is_array() {
                return Err(CoreError::path(dotted, format!("{name} is an array relationship")));
            }
            let target = ctx.entity(rel.target());
            if target.is_internal() {
                if last {
                    return Err(CoreError::path(dotted, format!("{name} is an embedded record")));
                }
                scope.prefix = scope.prefix.descend(name);
                scope.entity = rel.target();
                continue;
            }

            let alias = self.join(&scope, scope.prefix.key(name));
            if last {
                return Ok(Leaf {
                    expr: format!("{alias}.value"),
                    kind: LeafKind::Reference,
                });
            }
            scope = Scope {
                entity: rel.target(),
                channel: target.channel()?.quoted(),
                record: format!("{alias}.value"),
                prefix: Prefix::Root,
            };
        }
        Err(CoreError::path(dotted, "empty field path"))
    }

    fn join(&mut self, scope: &Scope, key: KeySql) -> String {
        let id = (scope.record.clone(), key);
        if let Some(alias) = self.aliases.get(&id) {
            return alias.clone();
        }
        let alias = format!("t{}", self.aliases.len() + 1);
        self.joins.push(format!(
            "LEFT JOIN {channel} AS {alias} ON {alias}.record_id = {record} AND {alias}.name = {key}",
            channel = scope.channel,
            record = scope.record,
            key = id.1.render(),
        ));
        self.aliases.insert(id, alias.clone());
        alias
    }

    fn take_joins(&mut self) -> Vec<String> {
        std::mem::take(&mut self.joins)
    }
}
