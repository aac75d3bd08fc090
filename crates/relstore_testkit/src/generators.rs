//! Property-based test generators using proptest.
//!
//! Strategies produce values that are valid for the sample schema, so a
//! property can save whatever it is handed.

use proptest::prelude::*;

/// Strategy for generating valid field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating embedded field paths such as `/lines[2]/detail`.
pub fn field_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec((field_name_strategy(), prop::option::of(0usize..50)), 1..5).prop_map(
        |segments| {
            segments
                .into_iter()
                .map(|(name, index)| match index {
                    Some(i) => format!("/{name}[{i}]"),
                    None => format!("/{name}"),
                })
                .collect()
        },
    )
}

/// Strategy for text values, including quotes and LIKE metacharacters.
pub fn text_value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 '%_\\\\-]{0,24}").expect("Invalid regex")
}

/// Field values for one `Person`.
#[derive(Debug, Clone)]
pub struct PersonSpec {
    /// `name`
    pub name: Option<String>,
    /// `age`
    pub age: Option<i64>,
    /// `active`
    pub active: Option<bool>,
    /// `nicknames`
    pub nicknames: Option<Vec<String>>,
}

/// Strategy for arbitrary `Person` field values.
pub fn person_strategy() -> impl Strategy<Value = PersonSpec> {
    (
        prop::option::of(text_value_strategy()),
        prop::option::of(any::<i64>()),
        prop::option::of(any::<bool>()),
        prop::option::of(prop::collection::vec(text_value_strategy(), 0..4)),
    )
        .prop_map(|(name, age, active, nicknames)| PersonSpec {
            name,
            age,
            active,
            nicknames,
        })
}

/// One embedded line: its amount and the `(code, qty)` of each part.
pub type LineSpec = (i64, Vec<(String, i64)>);

/// Strategy for the lines of an invoice, each with nested parts.
pub fn lines_strategy() -> impl Strategy<Value = Vec<LineSpec>> {
    prop::collection::vec(
        (
            -1_000i64..1_000,
            prop::collection::vec(
                (
                    prop::string::string_regex("[A-Z]{1,4}").expect("Invalid regex"),
                    0i64..100,
                ),
                0..3,
            ),
        ),
        0..4,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use relstore_core::FieldPath;

    proptest! {
        #[test]
        fn generated_paths_parse(path in field_path_strategy()) {
            let parsed = FieldPath::parse(&path).unwrap();
            prop_assert!(!parsed.is_empty());
            prop_assert_eq!(parsed.to_string(), path);
        }
    }
}
