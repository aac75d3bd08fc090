//! Path grammar for embedded entity keys.
//!
//! Fields of internal entities are flattened into their owner's key space:
//!
//! ```text
//! segment      := "/" fieldName
//! list-segment := "/" fieldName "[" index "]"
//! path         := (segment | list-segment)+
//! ```
//!
//! `/items[2]/detail/weight` addresses attribute `weight` of the singular
//! `detail` sub-object of the third entry of array relationship `items`.
//!
//! Templates use `[*]` in place of an index and match any entry. Paths also
//! have an identifier-safe encoding (`/a/b` <-> `a.b`) used by query views.

use crate::error::{CoreError, CoreResult};
use relstore_storage::is_identifier;
use std::fmt;

/// Index wildcard used in path templates.
pub const ANY_INDEX: &str = "[*]";

/// One `/name` or `/name[index]` step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    /// Field name.
    pub name: String,
    /// Entry index for list segments.
    pub index: Option<usize>,
}

/// A parsed path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Creates an empty path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `/a/b[1]/c`.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let Some(body) = text.strip_prefix('/') else {
            return Err(CoreError::path(text, "must start with '/'"));
        };
        let mut segments = Vec::new();
        for part in body.split('/') {
            segments.push(parse_segment(text, part)?);
        }
        Ok(Self { segments })
    }

    /// Appends `/name`.
    #[must_use]
    pub fn child(mut self, name: &str) -> Self {
        self.segments.push(PathSegment {
            name: name.to_string(),
            index: None,
        });
        self
    }

    /// Appends `/name[index]`.
    #[must_use]
    pub fn entry(mut self, name: &str, index: usize) -> Self {
        self.segments.push(PathSegment {
            name: name.to_string(),
            index: Some(index),
        });
        self
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns true for the empty path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment.name)?;
            if let Some(index) = segment.index {
                write!(f, "[{index}]")?;
            }
        }
        Ok(())
    }
}

fn parse_segment(full: &str, part: &str) -> CoreResult<PathSegment> {
    let (name, index) = match part.find('[') {
        Some(open) => {
            let Some(digits) = part[open + 1..].strip_suffix(']') else {
                return Err(CoreError::path(full, format!("unterminated index in {part:?}")));
            };
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CoreError::path(full, format!("bad index in {part:?}")));
            }
            let index = digits
                .parse::<usize>()
                .map_err(|e| CoreError::path(full, e.to_string()))?;
            (&part[..open], Some(index))
        }
        None => (part, None),
    };
    if !is_identifier(name) {
        return Err(CoreError::path(full, format!("bad field name {name:?}")));
    }
    Ok(PathSegment {
        name: name.to_string(),
        index,
    })
}

/// Returns `prefix/name`.
#[must_use]
pub fn child_key(prefix: &str, name: &str) -> String {
    format!("{prefix}/{name}")
}

/// Returns `base[index]`.
#[must_use]
pub fn element_key(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}

/// Returns true if `key` is `prefix` itself or lies beneath it.
///
/// `/line` does not cover `/lines`; it covers `/line`, `/line/..` and `/line[..`.
#[must_use]
pub fn is_under(prefix: &str, key: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('['),
        None => false,
    }
}

/// Encodes a path as an identifier-safe name: `/a/b` becomes `a.b`.
#[must_use]
pub fn encode_identifier(path: &str) -> String {
    path.trim_start_matches('/').replace('/', ".")
}

/// Decodes an identifier-safe name: `a.b` becomes `/a/b`.
#[must_use]
pub fn decode_identifier(name: &str) -> String {
    format!("/{}", name.replace('.', "/"))
}

/// Escapes GLOB metacharacters so `text` matches only itself.
#[must_use]
pub fn glob_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '[' => out.push_str("[[]"),
            '*' => out.push_str("[*]"),
            '?' => out.push_str("[?]"),
            _ => out.push(c),
        }
    }
    out
}

/// Turns a template into a GLOB pattern.
///
/// The pattern over-approximates: `[*]` becomes `[[]*]`, which also spans
/// nested segments. Confirm candidates with [`matches_template`].
#[must_use]
pub fn template_glob(template: &str) -> String {
    template
        .split(ANY_INDEX)
        .map(glob_escape)
        .collect::<Vec<_>>()
        .join("[[]*]")
}

/// Returns true if `key` is an instance of `template`.
#[must_use]
pub fn matches_template(template: &str, key: &str) -> bool {
    let mut t = template.split('/');
    let mut k = key.split('/');
    loop {
        match (t.next(), k.next()) {
            (None, None) => return true,
            (Some(ts), Some(ks)) => {
                if !segment_matches(ts, ks) {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

fn segment_matches(template: &str, key: &str) -> bool {
    match template.strip_suffix(ANY_INDEX) {
        Some(name) => match key.strip_prefix(name).and_then(|r| r.strip_prefix('[')) {
            Some(rest) => rest
                .strip_suffix(']')
                .is_some_and(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit())),
            None => false,
        },
        None => template == key,
    }
}
