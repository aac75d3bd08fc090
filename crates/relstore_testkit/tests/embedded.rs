//! Internal entities flattened into their owners.

use proptest::prelude::*;
use relstore_core::{CoreError, DataManager, Record};
use relstore_testkit::prelude::*;

fn reload(manager: &DataManager, invoice: &Record) -> Record {
    manager
        .dao("Invoice")
        .unwrap()
        .get(&invoice.id().unwrap())
        .unwrap()
        .unwrap()
}

fn amounts(invoice: &Record) -> Vec<Option<i64>> {
    invoice
        .relationship_array("lines")
        .unwrap()
        .iter()
        .map(|line| line.integer("amount").unwrap())
        .collect()
}

fn live_keys_under(record: &Record, prefix: &str) -> Vec<String> {
    record
        .raw_fields()
        .into_iter()
        .filter(|(key, value)| key.starts_with(prefix) && value.is_some())
        .map(|(key, _)| key)
        .collect()
}

#[test]
fn invoice_lines_live_inside_the_invoice() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 1, &[10, 20]);
    assert!(test.save(&invoice, false).unwrap());

    let channels = test.store().channels().unwrap();
    assert!(!channels.iter().any(|c| c == "LineItem"));
    assert_eq!(amounts(&reload(&test, &invoice)), vec![Some(10), Some(20)]);

    let stored = reload(&test, &invoice).raw_fields();
    assert_eq!(stored["/lines"].as_deref(), Some("2"));
    assert_eq!(stored["/lines[0]"].as_deref(), Some("0"));
    assert_eq!(stored["/lines[1]/amount"].as_deref(), Some("20"));
}

#[test]
fn saved_lines_are_attached_to_their_owner() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 2, &[5]);
    let line = invoice.relationship_array("lines").unwrap().remove(0);
    assert!(line.owner().is_none());

    assert!(test.save(&invoice, false).unwrap());
    assert!(line.owner().unwrap().same_as(&invoice));
    assert_eq!(line.owner_path().as_deref(), Some("/lines[0]"));
    assert!(!line.is_dirty());
    assert!(line.relationship("invoice").unwrap().unwrap().same_as(&invoice));
}

#[test]
fn embedded_records_cannot_be_saved_alone() {
    let test = TestManager::memory();
    let line = new_line(&test, 1);
    assert!(matches!(test.save(&line, false), Err(CoreError::Usage { .. })));
    assert!(matches!(test.delete(&line, false), Err(CoreError::Usage { .. })));
}

#[test]
fn nested_arrays_round_trip_in_order() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 3, &[1, 2]);
    let lines = invoice.relationship_array("lines").unwrap();
    lines[0]
        .set_relationship_array(
            "parts",
            vec![new_part(&test, "A", 1), new_part(&test, "B", 2)],
        )
        .unwrap();
    lines[1]
        .set_relationship_array("parts", vec![new_part(&test, "C", 3)])
        .unwrap();
    let detail = test.dao("Detail").unwrap().create();
    detail.set_decimal("weight", Some(2.5)).unwrap();
    lines[1].set_relationship("detail", Some(&detail)).unwrap();
    assert!(test.save(&invoice, false).unwrap());

    let loaded = reload(&test, &invoice);
    let lines = loaded.relationship_array("lines").unwrap();
    let codes = |line: &Record| -> Vec<(Option<String>, Option<i64>)> {
        line.relationship_array("parts")
            .unwrap()
            .iter()
            .map(|p| (p.text("code").unwrap(), p.integer("qty").unwrap()))
            .collect()
    };
    assert_eq!(
        codes(&lines[0]),
        vec![(Some("A".into()), Some(1)), (Some("B".into()), Some(2))]
    );
    assert_eq!(codes(&lines[1]), vec![(Some("C".into()), Some(3))]);
    assert!(lines[0].relationship("detail").unwrap().is_none());
    let detail = lines[1].relationship("detail").unwrap().unwrap();
    assert_eq!(detail.decimal("weight").unwrap(), Some(2.5));
    assert_eq!(detail.owner_path().as_deref(), Some("/lines[1]/detail"));
}

#[test]
fn lines_outlive_the_invoice_they_were_read_from() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 4, &[1, 2]);
    invoice.relationship_array("lines").unwrap()[0]
        .set_relationship_array("parts", vec![new_part(&test, "A", 1), new_part(&test, "B", 2)])
        .unwrap();
    assert!(test.save(&invoice, false).unwrap());

    let lines = reload(&test, &invoice).relationship_array("lines").unwrap();
    assert!(lines[0].owner().is_none());
    assert_eq!(lines[0].relationship_array("parts").unwrap().len(), 2);
    assert!(lines[0].relationship("invoice").unwrap().unwrap().same_as(&invoice));

    let other = test.dao("Invoice").unwrap().create();
    other.set_integer("number", Some(5)).unwrap();
    other.set_relationship_array("lines", lines).unwrap();
    assert!(test.save(&other, false).unwrap());

    let stored = reload(&test, &other).raw_fields();
    assert_eq!(stored["/lines"].as_deref(), Some("2"));
    assert_eq!(stored["/lines[0]/parts"].as_deref(), Some("2"));
    assert_eq!(stored["/lines[0]/parts[1]/code"].as_deref(), Some("B"));
}

#[test]
fn selected_lines_keep_their_parts_and_invoice() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 6, &[7]);
    invoice.relationship_array("lines").unwrap()[0]
        .set_relationship_array("parts", vec![new_part(&test, "P", 3)])
        .unwrap();
    assert!(test.save(&invoice, false).unwrap());

    let lines = test.select("LineItem").unwrap().records().unwrap();
    assert_eq!(lines.len(), 1);
    let parts = lines[0].relationship_array("parts").unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].text("code").unwrap().as_deref(), Some("P"));
    assert!(lines[0].relationship("invoice").unwrap().unwrap().same_as(&invoice));
}

#[test]
fn stored_lines_can_be_removed() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 8, &[1, 2]);
    assert!(test.save(&invoice, false).unwrap());

    let loaded = reload(&test, &invoice);
    let lines = loaded.relationship_array("lines").unwrap();
    assert!(lines[0].same_as(&loaded.relationship_array("lines").unwrap()[0]));
    assert!(loaded.remove_relationship("lines", &lines[0]).unwrap());
    assert_eq!(amounts(&loaded), vec![Some(2)]);

    assert!(test.save(&loaded, false).unwrap());
    assert_eq!(amounts(&reload(&test, &invoice)), vec![Some(2)]);
}

#[test]
fn clearing_lines_leaves_no_readable_leaves() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 4, &[7, 8, 9]);
    let lines = invoice.relationship_array("lines").unwrap();
    lines[2]
        .set_relationship_array("parts", vec![new_part(&test, "Z", 1)])
        .unwrap();
    assert!(test.save(&invoice, false).unwrap());

    let loaded = reload(&test, &invoice);
    loaded.set_relationship_array("lines", Vec::new()).unwrap();
    assert!(test.save(&loaded, false).unwrap());

    let cleared = reload(&test, &invoice);
    assert!(cleared.relationship_array("lines").unwrap().is_empty());
    assert_eq!(live_keys_under(&cleared, "/lines["), Vec::<String>::new());
    assert_eq!(cleared.raw_fields()["/lines"].as_deref(), Some("0"));
}

#[test]
fn shrinking_lines_nulls_the_tail() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 5, &[1, 2, 3]);
    assert!(test.save(&invoice, false).unwrap());

    let loaded = reload(&test, &invoice);
    let mut lines = loaded.relationship_array("lines").unwrap();
    lines.truncate(1);
    lines[0].set_integer("amount", Some(100)).unwrap();
    loaded.set_relationship_array("lines", lines).unwrap();
    assert!(test.save(&loaded, false).unwrap());

    let stored = reload(&test, &invoice);
    assert_eq!(amounts(&stored), vec![Some(100)]);
    assert_eq!(live_keys_under(&stored, "/lines[1"), Vec::<String>::new());
    assert_eq!(live_keys_under(&stored, "/lines[2"), Vec::<String>::new());
}

#[test]
fn clearing_a_singular_child_nulls_every_leaf() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 6, &[1]);
    let line = invoice.relationship_array("lines").unwrap().remove(0);
    let detail = test.dao("Detail").unwrap().create();
    detail.set_decimal("weight", Some(1.0)).unwrap();
    detail.set_text("note", Some("fragile".into())).unwrap();
    line.set_relationship("detail", Some(&detail)).unwrap();
    assert!(test.save(&invoice, false).unwrap());

    let loaded = reload(&test, &invoice);
    let lines = loaded.relationship_array("lines").unwrap();
    lines[0].set_relationship("detail", None).unwrap();
    loaded.set_relationship_array("lines", lines).unwrap();
    assert!(test.save(&loaded, false).unwrap());

    let stored = reload(&test, &invoice);
    let line = stored.relationship_array("lines").unwrap().remove(0);
    assert!(line.relationship("detail").unwrap().is_none());
    let fields = stored.raw_fields();
    assert_eq!(fields.get("/lines[0]/detail/weight"), Some(&None));
    assert_eq!(fields.get("/lines[0]/detail/note"), Some(&None));
}

#[test]
fn embedded_references_save_their_targets() {
    let test = TestManager::memory();
    let product = test.dao("Product").unwrap().create();
    product.set_text("name", Some("Bolt".into())).unwrap();
    let invoice = new_invoice(&test, 7, &[1]);
    let line = invoice.relationship_array("lines").unwrap().remove(0);
    line.set_relationship("product", Some(&product)).unwrap();
    assert!(test.save(&invoice, false).unwrap());

    let product_id = product.id().expect("product saved by the cascade");
    let stored = reload(&test, &invoice);
    assert_eq!(
        stored.raw_fields()["/lines[0]/product"].as_deref(),
        Some(product_id.as_str())
    );
    let line = stored.relationship_array("lines").unwrap().remove(0);
    let target = line.relationship("product").unwrap().unwrap();
    assert_eq!(target.text("name").unwrap().as_deref(), Some("Bolt"));
}

#[test]
fn embedded_references_protect_their_targets() {
    let test = TestManager::memory();
    let product = test.dao("Product").unwrap().create();
    assert!(test.save(&product, false).unwrap());
    let invoice = new_invoice(&test, 8, &[1]);
    let line = invoice.relationship_array("lines").unwrap().remove(0);
    line.set_relationship("product", Some(&product)).unwrap();
    assert!(test.save(&invoice, false).unwrap());

    match test.delete(&product, false) {
        Err(CoreError::ReferenceViolation { referenced_by, .. }) => {
            assert_eq!(referenced_by, vec!["LineItem".to_string()]);
        }
        other => panic!("expected a reference violation, got {other:?}"),
    }

    assert!(test.delete(&invoice, false).unwrap());
    assert!(test.delete(&product, false).unwrap());
}

#[test]
fn embedded_edits_apply_when_reassigned() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 9, &[1]);
    assert!(test.save(&invoice, false).unwrap());

    let loaded = reload(&test, &invoice);
    let line = loaded.relationship_array("lines").unwrap().remove(0);
    line.set_integer("amount", Some(50)).unwrap();
    assert!(test.save(&loaded, false).unwrap());
    assert_eq!(amounts(&reload(&test, &invoice)), vec![Some(1)]);

    loaded.set_relationship_array("lines", vec![line]).unwrap();
    assert!(test.save(&loaded, false).unwrap());
    assert_eq!(amounts(&reload(&test, &invoice)), vec![Some(50)]);
}

#[test]
fn deleting_an_owner_removes_every_embedded_leaf() {
    let test = TestManager::memory();
    let invoice = new_invoice(&test, 10, &[1, 2]);
    assert!(test.save(&invoice, false).unwrap());
    assert!(test.delete(&invoice, false).unwrap());

    let channel = test.schema().require("Invoice").unwrap().channel().unwrap().clone();
    assert_eq!(test.store().row_count(&channel).unwrap(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_line_tree_round_trips(specs in lines_strategy()) {
        let test = TestManager::memory();
        let invoice = test.dao("Invoice").unwrap().create();
        let lines: Vec<Record> = specs
            .iter()
            .map(|(amount, parts)| {
                let line = new_line(&test, *amount);
                let parts = parts.iter().map(|(code, qty)| new_part(&test, code, *qty)).collect();
                line.set_relationship_array("parts", parts).unwrap();
                line
            })
            .collect();
        invoice.set_relationship_array("lines", lines).unwrap();
        prop_assert!(test.save(&invoice, false).unwrap());

        let loaded = reload(&test, &invoice);
        let read: Vec<(i64, Vec<(String, i64)>)> = loaded
            .relationship_array("lines")
            .unwrap()
            .iter()
            .map(|line| {
                let parts = line
                    .relationship_array("parts")
                    .unwrap()
                    .iter()
                    .map(|p| (p.text("code").unwrap().unwrap(), p.integer("qty").unwrap().unwrap()))
                    .collect();
                (line.integer("amount").unwrap().unwrap(), parts)
            })
            .collect();
        prop_assert_eq!(read, specs);
    }
}
