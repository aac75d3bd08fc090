//! Attribute metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The nine scalar kinds an attribute can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// 64-bit signed integer.
    Integer,
    /// Double precision decimal.
    Decimal,
    /// UTF-8 text.
    Text,
    /// `true` or `false`.
    Boolean,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time without zone.
    DateTime,
    /// A single character.
    Character,
    /// Binary image, stored base64-encoded.
    Image,
}

impl ScalarKind {
    const ALL: [Self; 9] = [
        Self::Integer,
        Self::Decimal,
        Self::Text,
        Self::Boolean,
        Self::Date,
        Self::Time,
        Self::DateTime,
        Self::Character,
        Self::Image,
    ];

    /// Returns the kind's name as used in schema files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Character => "character",
            Self::Image => "image",
        }
    }

    /// Looks a kind up by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar kind or an array of it.
///
/// Serialized as the kind name, with a `[]` suffix for arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AttributeType {
    /// One value.
    Scalar(ScalarKind),
    /// An ordered list of values.
    Array(ScalarKind),
}

impl AttributeType {
    /// Returns the element kind.
    #[must_use]
    pub const fn kind(self) -> ScalarKind {
        match self {
            Self::Scalar(k) | Self::Array(k) => k,
        }
    }

    /// Returns true for array types.
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(self, Self::Array(_))
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(k) => write!(f, "{k}"),
            Self::Array(k) => write!(f, "{k}[]"),
        }
    }
}

impl FromStr for AttributeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, array) = match s.strip_suffix("[]") {
            Some(name) => (name, true),
            None => (s, false),
        };
        let kind = ScalarKind::from_name(name).ok_or_else(|| format!("unknown attribute type {s:?}"))?;
        Ok(if array {
            Self::Array(kind)
        } else {
            Self::Scalar(kind)
        })
    }
}

impl TryFrom<String> for AttributeType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AttributeType> for String {
    fn from(value: AttributeType) -> Self {
        value.to_string()
    }
}

/// A named, typed attribute of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAttribute {
    pub(crate) name: String,
    pub(crate) ty: AttributeType,
}

impl EntityAttribute {
    /// Returns the attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the attribute type.
    #[must_use]
    pub fn ty(&self) -> AttributeType {
        self.ty
    }
}
