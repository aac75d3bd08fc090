//! Low-level SQL assembly.
//!
//! [`SqlAssembler`] knows nothing about entities. It collects a column
//! list, a `FROM` fragment, joins, conditions and ordering, and renders one
//! statement with its parameters in placeholder order:
//!
//! - parameters of the `FROM` fragment
//! - parameters of each condition, in insertion order
//!
//! Joins and ordering terms carry no parameters; keys inside them are
//! inlined with [`quote_literal`].

use relstore_storage::SqlParam;
use std::fmt;

/// A compiled statement plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub(crate) sql: String,
    pub(crate) params: Vec<SqlParam>,
}

impl CompiledQuery {
    /// Returns the statement text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the bound parameters.
    #[must_use]
    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A piece of SQL with the parameters its placeholders consume.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Fragment {
    pub(crate) sql: String,
    pub(crate) params: Vec<SqlParam>,
}

impl Fragment {
    pub(crate) fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub(crate) fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Joins fragments with `separator`, keeping parameter order.
    pub(crate) fn join(parts: Vec<Fragment>, separator: &str) -> Self {
        let mut sql = Vec::with_capacity(parts.len());
        let mut params = Vec::new();
        for part in parts {
            sql.push(part.sql);
            params.extend(part.params);
        }
        Self {
            sql: sql.join(separator),
            params,
        }
    }

    /// Wraps the SQL in parentheses.
    pub(crate) fn parenthesized(self) -> Self {
        Self {
            sql: format!("({})", self.sql),
            params: self.params,
        }
    }
}

/// How a field key is named in SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeySql {
    /// A fixed key.
    Literal(String),
    /// A key inside one element of an embedded array, where the element
    /// index comes from the `r.idx` column: `prefix[idx]suffix`.
    Indexed { prefix: String, suffix: String },
}

impl KeySql {
    pub(crate) fn render(&self) -> String {
        match self {
            Self::Literal(key) => quote_literal(key),
            Self::Indexed { prefix, suffix } => format!(
                "{} || r.idx || {}",
                quote_literal(&format!("{prefix}[")),
                quote_literal(&format!("]{suffix}"))
            ),
        }
    }
}

/// Quotes `text` as an SQL string literal.
#[must_use]
pub(crate) fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Collects the parts of one `SELECT` statement.
#[derive(Debug, Default)]
pub(crate) struct SqlAssembler {
    distinct: bool,
    columns: Vec<String>,
    from: Fragment,
    joins: Vec<String>,
    conditions: Vec<Fragment>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SqlAssembler {
    pub(crate) fn new(from: Fragment) -> Self {
        Self {
            from,
            ..Self::default()
        }
    }

    pub(crate) fn distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    pub(crate) fn column(&mut self, expr: impl Into<String>) {
        self.columns.push(expr.into());
    }

    pub(crate) fn join(&mut self, join: impl Into<String>) {
        self.joins.push(join.into());
    }

    pub(crate) fn condition(&mut self, condition: Fragment) {
        self.conditions.push(condition);
    }

    pub(crate) fn order(&mut self, term: impl Into<String>) {
        self.order.push(term.into());
    }

    pub(crate) fn limit(&mut self, limit: Option<u64>, offset: Option<u64>) {
        self.limit = limit;
        self.offset = offset;
    }

    pub(crate) fn build(self) -> CompiledQuery {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.columns.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&self.from.sql);
        let mut params = self.from.params;

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.conditions.is_empty() {
            let conditions = Fragment::join(self.conditions, " AND ");
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.sql);
            params.extend(conditions.params);
        }

        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        CompiledQuery { sql, params }
    }
}
