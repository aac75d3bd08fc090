//! Scalar values and their text encoding.
//!
//! Every attribute is stored as text. Each scalar kind has exactly one
//! canonical text form, produced by [`Scalar::format`] and accepted by
//! [`Scalar::parse`]. Date and time forms sort lexicographically in
//! chronological order, which the query builder relies on for range filters.

use crate::metadata::ScalarKind;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Binary image content, stored base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image(pub Vec<u8>);

impl Image {
    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A Rust type that maps onto one [`ScalarKind`].
pub trait Scalar: Sized + Clone {
    /// The attribute kind this type reads and writes.
    const KIND: ScalarKind;

    /// Parses the stored text form.
    fn parse(raw: &str) -> Option<Self>;

    /// Produces the stored text form.
    fn format(&self) -> String;
}

impl Scalar for i64 {
    const KIND: ScalarKind = ScalarKind::Integer;

    fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn format(&self) -> String {
        self.to_string()
    }
}

impl Scalar for f64 {
    const KIND: ScalarKind = ScalarKind::Decimal;

    fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    fn format(&self) -> String {
        self.to_string()
    }
}

impl Scalar for String {
    const KIND: ScalarKind = ScalarKind::Text;

    fn parse(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn format(&self) -> String {
        self.clone()
    }
}

impl Scalar for bool {
    const KIND: ScalarKind = ScalarKind::Boolean;

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    fn format(&self) -> String {
        if *self { "true" } else { "false" }.to_string()
    }
}

impl Scalar for NaiveDate {
    const KIND: ScalarKind = ScalarKind::Date;

    fn parse(raw: &str) -> Option<Self> {
        NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
    }

    fn format(&self) -> String {
        self.format(DATE_FORMAT).to_string()
    }
}

impl Scalar for NaiveTime {
    const KIND: ScalarKind = ScalarKind::Time;

    fn parse(raw: &str) -> Option<Self> {
        NaiveTime::parse_from_str(raw, TIME_FORMAT).ok()
    }

    fn format(&self) -> String {
        self.format(TIME_FORMAT).to_string()
    }
}

impl Scalar for NaiveDateTime {
    const KIND: ScalarKind = ScalarKind::DateTime;

    fn parse(raw: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).ok()
    }

    fn format(&self) -> String {
        self.format(DATETIME_FORMAT).to_string()
    }
}

impl Scalar for char {
    const KIND: ScalarKind = ScalarKind::Character;

    fn parse(raw: &str) -> Option<Self> {
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }

    fn format(&self) -> String {
        self.to_string()
    }
}

impl Scalar for Image {
    const KIND: ScalarKind = ScalarKind::Image;

    fn parse(raw: &str) -> Option<Self> {
        STANDARD.decode(raw).ok().map(Image)
    }

    fn format(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

/// A dynamically typed scalar, as produced by queries and used in filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer value.
    Integer(i64),
    /// Decimal value.
    Decimal(f64),
    /// Text value, also used for record ids.
    Text(String),
    /// Boolean value.
    Boolean(bool),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// Date and time.
    DateTime(NaiveDateTime),
    /// Single character.
    Character(char),
    /// Binary image.
    Image(Image),
}

impl Value {
    /// Parses stored text as `kind`.
    #[must_use]
    pub fn parse(kind: ScalarKind, raw: &str) -> Option<Self> {
        Some(match kind {
            ScalarKind::Integer => Self::Integer(i64::parse(raw)?),
            ScalarKind::Decimal => Self::Decimal(f64::parse(raw)?),
            ScalarKind::Text => Self::Text(raw.to_string()),
            ScalarKind::Boolean => Self::Boolean(bool::parse(raw)?),
            ScalarKind::Date => Self::Date(NaiveDate::parse(raw)?),
            ScalarKind::Time => Self::Time(NaiveTime::parse(raw)?),
            ScalarKind::DateTime => Self::DateTime(NaiveDateTime::parse(raw)?),
            ScalarKind::Character => Self::Character(char::parse(raw)?),
            ScalarKind::Image => Self::Image(Image::parse(raw)?),
        })
    }

    /// Returns the stored text form.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Integer(v) => v.format(),
            Self::Decimal(v) => Scalar::format(v),
            Self::Text(v) => v.clone(),
            Self::Boolean(v) => v.format(),
            Self::Date(v) => Scalar::format(v),
            Self::Time(v) => Scalar::format(v),
            Self::DateTime(v) => Scalar::format(v),
            Self::Character(v) => v.format(),
            Self::Image(v) => v.format(),
        }
    }

    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Integer(_) => ScalarKind::Integer,
            Self::Decimal(_) => ScalarKind::Decimal,
            Self::Text(_) => ScalarKind::Text,
            Self::Boolean(_) => ScalarKind::Boolean,
            Self::Date(_) => ScalarKind::Date,
            Self::Time(_) => ScalarKind::Time,
            Self::DateTime(_) => ScalarKind::DateTime,
            Self::Character(_) => ScalarKind::Character,
            Self::Image(_) => ScalarKind::Image,
        }
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    i64 => Integer,
    f64 => Decimal,
    String => Text,
    bool => Boolean,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    char => Character,
    Image => Image,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<&crate::RecordId> for Value {
    fn from(id: &crate::RecordId) -> Self {
        Self::Text(id.as_str().to_string())
    }
}
