//! Test fixtures and data manager helpers.
//!
//! The sample schema has one entity per relationship shape:
//!
//! | Entity | Shape |
//! |---|---|
//! | `Person` | scalar and array attributes, singular associations `manager`, `team`, `club` |
//! | `Team` | composition array `members`, mapped by `Person.team` |
//! | `Club` | association array `members`, mapped by `Person.club` |
//! | `Product` | plain top-level record referenced from embedded lines |
//! | `Invoice` | composition array `lines` of internal `LineItem` |
//! | `LineItem` | internal; singular `detail`, array `parts`, reference `product`, back-reference `invoice` |
//! | `Detail`, `Part` | internal leaves |

use relstore_core::{
    AttributeType, Config, DataManager, EntityDefinition, Record, ReferencePolicy,
    RelationshipDefinition, ScalarKind, Schema, SchemaDefinition,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn scalar(kind: ScalarKind) -> AttributeType {
    AttributeType::Scalar(kind)
}

fn array(kind: ScalarKind) -> AttributeType {
    AttributeType::Array(kind)
}

/// Returns the definition of the sample schema.
pub fn sample_definition() -> SchemaDefinition {
    SchemaDefinition {
        entities: vec![
            EntityDefinition::new("Person")
                .attribute("name", scalar(ScalarKind::Text))
                .attribute("age", scalar(ScalarKind::Integer))
                .attribute("active", scalar(ScalarKind::Boolean))
                .attribute("nicknames", array(ScalarKind::Text))
                .relationship(RelationshipDefinition::association("manager", "Person"))
                .relationship(RelationshipDefinition::association("team", "Team"))
                .relationship(RelationshipDefinition::association("club", "Club")),
            EntityDefinition::new("Team")
                .attribute("name", scalar(ScalarKind::Text))
                .relationship(
                    RelationshipDefinition::composition("members", "Person")
                        .array()
                        .mapped_by("team"),
                ),
            EntityDefinition::new("Club")
                .attribute("name", scalar(ScalarKind::Text))
                .relationship(
                    RelationshipDefinition::association("members", "Person")
                        .array()
                        .mapped_by("club"),
                ),
            EntityDefinition::new("Product")
                .attribute("name", scalar(ScalarKind::Text))
                .attribute("price", scalar(ScalarKind::Decimal)),
            EntityDefinition::new("Invoice")
                .attribute("number", scalar(ScalarKind::Integer))
                .attribute("issued", scalar(ScalarKind::Date))
                .relationship(RelationshipDefinition::composition("lines", "LineItem").array()),
            EntityDefinition::new("LineItem")
                .internal()
                .attribute("amount", scalar(ScalarKind::Integer))
                .attribute("label", scalar(ScalarKind::Text))
                .attribute("tags", array(ScalarKind::Text))
                .relationship(RelationshipDefinition::composition("detail", "Detail"))
                .relationship(RelationshipDefinition::composition("parts", "Part").array())
                .relationship(RelationshipDefinition::association("product", "Product"))
                .relationship(
                    RelationshipDefinition::association("invoice", "Invoice").mapped_by("lines"),
                ),
            EntityDefinition::new("Detail")
                .internal()
                .attribute("weight", scalar(ScalarKind::Decimal))
                .attribute("note", scalar(ScalarKind::Text)),
            EntityDefinition::new("Part")
                .internal()
                .attribute("code", scalar(ScalarKind::Text))
                .attribute("qty", scalar(ScalarKind::Integer)),
        ],
    }
}

/// Builds the sample schema.
pub fn sample_schema() -> Arc<Schema> {
    Arc::new(Schema::from_definition(sample_definition()).expect("sample schema is valid"))
}

/// Returns the sample schema as a JSON document.
pub fn sample_schema_json() -> String {
    serde_json::to_string_pretty(&sample_definition()).expect("definition serializes")
}

/// Configuration that fails reads of dangling references.
pub fn strict_config() -> Config {
    Config::default().reference_policy(ReferencePolicy::Strict)
}

/// Configuration that treats dangling references as absent.
pub fn lenient_config() -> Config {
    Config::default().reference_policy(ReferencePolicy::Lenient)
}

/// A data manager over the sample schema with automatic cleanup.
pub struct TestManager {
    /// The manager instance.
    pub manager: DataManager,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
    path: Option<PathBuf>,
}

impl TestManager {
    /// Creates an in-memory manager with strict reference checks.
    pub fn memory() -> Self {
        Self::memory_with(strict_config())
    }

    /// Creates an in-memory manager with `config`.
    pub fn memory_with(config: Config) -> Self {
        Self {
            manager: DataManager::open_in_memory(sample_schema(), config)
                .expect("Failed to open in-memory manager"),
            _temp_dir: None,
            path: None,
        }
    }

    /// Creates a file-backed manager in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("relstore.db");
        let manager = DataManager::open(&path, sample_schema(), strict_config())
            .expect("Failed to open file manager");
        Self {
            manager,
            _temp_dir: Some(temp_dir),
            path: Some(path),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.path.clone()
    }

    /// Opens a second, independent manager over the same file.
    pub fn reopen(&self) -> DataManager {
        let path = self.path.as_ref().expect("only file managers can be reopened");
        DataManager::open(path, sample_schema(), strict_config()).expect("Failed to reopen manager")
    }
}

impl std::ops::Deref for TestManager {
    type Target = DataManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

/// Runs a test with a temporary in-memory manager.
///
/// # Example
///
/// ```rust,ignore
/// use relstore_testkit::with_temp_manager;
///
/// #[test]
/// fn my_test() {
///     with_temp_manager(|manager| {
///         assert_eq!(manager.dao("Person").unwrap().count().unwrap(), 0);
///     });
/// }
/// ```
pub fn with_temp_manager<F, R>(f: F) -> R
where
    F: FnOnce(&DataManager) -> R,
{
    let manager = TestManager::memory();
    f(&manager)
}

/// Creates an unsaved person.
pub fn new_person(manager: &DataManager, name: &str) -> Record {
    let person = manager.dao("Person").expect("Person DAO").create();
    person
        .set_text("name", Some(name.to_string()))
        .expect("name is a text attribute");
    person
}

/// Creates and saves a person.
pub fn saved_person(manager: &DataManager, name: &str) -> Record {
    let person = new_person(manager, name);
    assert!(manager.save(&person, false).expect("save person"));
    person
}

/// Creates an unsaved line item.
pub fn new_line(manager: &DataManager, amount: i64) -> Record {
    let line = manager.dao("LineItem").expect("LineItem DAO").create();
    line.set_integer("amount", Some(amount))
        .expect("amount is an integer attribute");
    line
}

/// Creates an unsaved part.
pub fn new_part(manager: &DataManager, code: &str, qty: i64) -> Record {
    let part = manager.dao("Part").expect("Part DAO").create();
    part.set_text("code", Some(code.to_string())).expect("code");
    part.set_integer("qty", Some(qty)).expect("qty");
    part
}

/// Creates an unsaved invoice holding one line per amount.
pub fn new_invoice(manager: &DataManager, number: i64, amounts: &[i64]) -> Record {
    let invoice = manager.dao("Invoice").expect("Invoice DAO").create();
    invoice.set_integer("number", Some(number)).expect("number");
    let lines = amounts.iter().map(|a| new_line(manager, *a)).collect();
    invoice
        .set_relationship_array("lines", lines)
        .expect("lines is an array relationship");
    invoice
}
