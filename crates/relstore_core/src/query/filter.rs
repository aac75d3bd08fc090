//! Filter predicates.
//!
//! Filters name fields by dotted path (`manager.name`, `address.city`) and
//! compile into conditions over the joined field rows. Comparisons cast the
//! stored text according to the attribute kind (integers as `INTEGER`,
//! decimals as `REAL`, everything else as text) unless an explicit
//! [`Cast`] is given.

use super::builder::JoinTree;
use super::sql::Fragment;
use crate::error::CoreResult;
use crate::metadata::ScalarKind;
use crate::types::StatusTags;
use crate::value::Value;
use relstore_storage::SqlParam;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`; fields holding null never match.
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Type a stored value is cast to before comparing or ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    /// `CAST(.. AS INTEGER)`
    Integer,
    /// `CAST(.. AS REAL)`
    Real,
    /// Compare the stored text as is.
    Text,
}

impl Cast {
    /// Default cast for an attribute kind.
    #[must_use]
    pub const fn for_kind(kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::Integer => Self::Integer,
            ScalarKind::Decimal => Self::Real,
            _ => Self::Text,
        }
    }

    pub(crate) fn apply(self, expr: &str) -> String {
        match self {
            Self::Integer => format!("CAST({expr} AS INTEGER)"),
            Self::Real => format!("CAST({expr} AS REAL)"),
            Self::Text => expr.to_string(),
        }
    }

    pub(crate) fn param(self, value: &Value) -> SqlParam {
        match (self, value) {
            (Self::Integer, Value::Integer(v)) => SqlParam::Integer(*v),
            (Self::Real, Value::Decimal(v)) => SqlParam::Real(*v),
            #[allow(clippy::cast_precision_loss)]
            (Self::Real, Value::Integer(v)) => SqlParam::Real(*v as f64),
            _ => SqlParam::Text(value.to_text()),
        }
    }
}

/// Ordering collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collation {
    /// Order by the cast value.
    Cast(Cast),
    /// Order text case-insensitively (ASCII only).
    NoCase,
}

/// Text matching modes, compiled to `LIKE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    /// Value starts with the pattern.
    Prefix,
    /// Value ends with the pattern.
    Suffix,
    /// Value contains the pattern.
    Contains,
}

/// Synchronization state tested by [`Filter::SyncStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Local changes not yet pushed.
    Desynchronized,
    /// A push is in progress.
    Synchronizing,
    /// Neither of the above.
    Synchronized,
}

/// A boolean-composable predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field op value`.
    Compare {
        /// Dotted field path.
        field: String,
        /// Operator.
        op: CompareOp,
        /// Right-hand side.
        value: Value,
        /// Cast override; `None` uses the attribute's default.
        cast: Option<Cast>,
    },
    /// `field IN (values)`. An empty list matches nothing.
    In {
        /// Dotted field path.
        field: String,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// `field BETWEEN low AND high`.
    Between {
        /// Dotted field path.
        field: String,
        /// Lower bound, inclusive.
        low: Value,
        /// Upper bound, inclusive.
        high: Value,
        /// Cast override; `None` uses the attribute's default.
        cast: Option<Cast>,
    },
    /// Prefix, suffix or substring match.
    Text {
        /// Dotted field path.
        field: String,
        /// Match mode.
        mode: TextMatch,
        /// Literal text; `%` and `_` have no special meaning.
        pattern: String,
    },
    /// `field IS NULL`, or `IS NOT NULL` when negated. Absent fields are null.
    IsNull {
        /// Dotted field path.
        field: String,
        /// Test for presence instead.
        negated: bool,
    },
    /// Tests the record's synchronization bits.
    SyncStatus(SyncState),
    /// Explicit parentheses.
    Group(Box<Filter>),
    /// All of the filters. Empty matches everything.
    And(Vec<Filter>),
    /// Any of the filters. Empty matches nothing.
    Or(Vec<Filter>),
    /// Negation.
    Not(Box<Filter>),
}

impl Filter {
    fn compare(field: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
            cast: None,
        }
    }

    /// `field = value`
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// `field <> value`
    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    /// `field < value`
    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    /// `field <= value`
    pub fn le(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    /// `field > value`
    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    /// `field >= value`
    pub fn ge(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    /// `field IN (values)`
    pub fn in_list<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field BETWEEN low AND high`
    pub fn between(field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::Between {
            field: field.to_string(),
            low: low.into(),
            high: high.into(),
            cast: None,
        }
    }

    /// Value starts with `pattern`.
    pub fn starts_with(field: &str, pattern: &str) -> Self {
        Self::text(field, TextMatch::Prefix, pattern)
    }

    /// Value ends with `pattern`.
    pub fn ends_with(field: &str, pattern: &str) -> Self {
        Self::text(field, TextMatch::Suffix, pattern)
    }

    /// Value contains `pattern`.
    pub fn contains(field: &str, pattern: &str) -> Self {
        Self::text(field, TextMatch::Contains, pattern)
    }

    fn text(field: &str, mode: TextMatch, pattern: &str) -> Self {
        Self::Text {
            field: field.to_string(),
            mode,
            pattern: pattern.to_string(),
        }
    }

    /// `field IS NULL`
    pub fn is_null(field: &str) -> Self {
        Self::IsNull {
            field: field.to_string(),
            negated: false,
        }
    }

    /// `field IS NOT NULL`
    pub fn is_not_null(field: &str) -> Self {
        Self::IsNull {
            field: field.to_string(),
            negated: true,
        }
    }

    /// Synchronization state test.
    pub fn sync_status(state: SyncState) -> Self {
        Self::SyncStatus(state)
    }

    /// Wraps in parentheses.
    #[must_use]
    pub fn group(self) -> Self {
        Self::Group(Box::new(self))
    }

    /// Both `self` and `other`.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut all) => {
                all.push(other);
                Self::And(all)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Either `self` or `other`.
    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut any) => {
                any.push(other);
                Self::Or(any)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Negation. Also available as `!filter`.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Overrides the cast of a comparison or range. Other filters are
    /// returned unchanged.
    #[must_use]
    pub fn cast(self, to: Cast) -> Self {
        match self {
            Self::Compare { field, op, value, .. } => Self::Compare {
                field,
                op,
                value,
                cast: Some(to),
            },
            Self::Between { field, low, high, .. } => Self::Between {
                field,
                low,
                high,
                cast: Some(to),
            },
            other => other,
        }
    }

    pub(crate) fn compile(&self, joins: &mut JoinTree) -> CoreResult<Fragment> {
        Ok(match self {
            Self::Compare {
                field,
                op,
                value,
                cast,
            } => {
                let leaf = joins.field(field)?;
                let cast = cast.unwrap_or_else(|| leaf.default_cast());
                Fragment::with_params(
                    format!("{} {} ?", cast.apply(&leaf.expr), op.sql()),
                    vec![cast.param(value)],
                )
            }
            Self::In { field, values } => {
                if values.is_empty() {
                    return Ok(Fragment::new("0"));
                }
                let leaf = joins.field(field)?;
                let cast = leaf.default_cast();
                let placeholders = vec!["?"; values.len()].join(", ");
                Fragment::with_params(
                    format!("{} IN ({placeholders})", cast.apply(&leaf.expr)),
                    values.iter().map(|v| cast.param(v)).collect(),
                )
            }
            Self::Between {
                field,
                low,
                high,
                cast,
            } => {
                let leaf = joins.field(field)?;
                let cast = cast.unwrap_or_else(|| leaf.default_cast());
                Fragment::with_params(
                    format!("{} BETWEEN ? AND ?", cast.apply(&leaf.expr)),
                    vec![cast.param(low), cast.param(high)],
                )
            }
            Self::Text {
                field,
                mode,
                pattern,
            } => {
                let leaf = joins.field(field)?;
                let escaped = escape_like(pattern);
                let pattern = match mode {
                    TextMatch::Prefix => format!("{escaped}%"),
                    TextMatch::Suffix => format!("%{escaped}"),
                    TextMatch::Contains => format!("%{escaped}%"),
                };
                Fragment::with_params(
                    format!("{} LIKE ? ESCAPE '\\'", leaf.expr),
                    vec![SqlParam::Text(pattern)],
                )
            }
            Self::IsNull { field, negated } => {
                let leaf = joins.field(field)?;
                let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
                Fragment::new(format!("{} {test}", leaf.expr))
            }
            Self::SyncStatus(state) => {
                let status = joins.status_expr()?;
                let sql = match state {
                    SyncState::Desynchronized => format!(
                        "(CAST({status} AS INTEGER) & {}) <> 0",
                        StatusTags::DESYNCHRONIZED_BIT
                    ),
                    SyncState::Synchronizing => format!(
                        "(CAST({status} AS INTEGER) & {}) <> 0",
                        StatusTags::SYNCHRONIZING_BIT
                    ),
                    SyncState::Synchronized => format!(
                        "(CAST({status} AS INTEGER) & {}) = 0",
                        StatusTags::DESYNCHRONIZED_BIT | StatusTags::SYNCHRONIZING_BIT
                    ),
                };
                Fragment::new(sql)
            }
            Self::Group(inner) => inner.compile(joins)?.parenthesized(),
            Self::And(all) => {
                if all.is_empty() {
                    return Ok(Fragment::new("1"));
                }
                let parts = all
                    .iter()
                    .map(|f| f.compile(joins))
                    .collect::<CoreResult<Vec<_>>>()?;
                Fragment::join(parts, " AND ").parenthesized()
            }
            Self::Or(any) => {
                if any.is_empty() {
                    return Ok(Fragment::new("0"));
                }
                let parts = any
                    .iter()
                    .map(|f| f.compile(joins))
                    .collect::<CoreResult<Vec<_>>>()?;
                Fragment::join(parts, " OR ").parenthesized()
            }
            Self::Not(inner) => {
                let inner = inner.compile(joins)?;
                Fragment::with_params(format!("NOT ({})", inner.sql), inner.params)
            }
        })
    }
}

impl std::ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        self.negate()
    }
}

/// Escapes `LIKE` metacharacters with a backslash.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
