//! Save then load reproduces what was written.

use chrono::NaiveDate;
use proptest::prelude::*;
use relstore_core::{CoreError, Filter, Record, RecordId};
use relstore_testkit::prelude::*;

fn apply(person: &Record, spec: &PersonSpec) {
    person.set_text("name", spec.name.clone()).unwrap();
    person.set_integer("age", spec.age).unwrap();
    person.set_boolean("active", spec.active).unwrap();
    person.set_text_array("nicknames", spec.nicknames.clone()).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn dirty_fields_equal_reloaded_fields(spec in person_strategy()) {
        let test = TestManager::memory();
        let people = test.dao("Person").unwrap();
        let person = people.create();
        apply(&person, &spec);

        let written: Vec<(String, Option<String>)> = person
            .dirty_fields()
            .into_iter()
            .map(|field| {
                let value = person.raw_fields().get(&field).cloned().flatten();
                (field, value)
            })
            .collect();
        prop_assert!(people.save(&person, false).unwrap());

        let loaded = people.get(&person.id().unwrap()).unwrap().unwrap();
        let stored = loaded.raw_fields();
        for (field, value) in written {
            prop_assert_eq!(stored.get(&field).cloned().flatten(), value, "field {}", field);
        }
        prop_assert_eq!(loaded.text("name").unwrap(), spec.name);
        prop_assert_eq!(loaded.integer("age").unwrap(), spec.age);
        prop_assert_eq!(loaded.boolean("active").unwrap(), spec.active);
        prop_assert_eq!(loaded.text_array("nicknames").unwrap(), spec.nicknames);
    }
}

#[test]
fn false_is_persisted_even_when_unchanged() {
    let test = TestManager::memory();
    let people = test.dao("Person").unwrap();
    let person = new_person(&test, "Eve");
    person.set_boolean("active", Some(false)).unwrap();
    assert!(people.save(&person, false).unwrap());

    let loaded = people.get(&person.id().unwrap()).unwrap().unwrap();
    loaded.set_boolean("active", Some(false)).unwrap();
    assert!(loaded.is_dirty());
    assert!(people.save(&loaded, false).unwrap());
    assert_eq!(
        people.get(&person.id().unwrap()).unwrap().unwrap().boolean("active").unwrap(),
        Some(false)
    );
}

#[test]
fn get_hydrates_a_fresh_handle_every_time() {
    let test = TestManager::memory();
    let people = test.dao("Person").unwrap();
    let person = saved_person(&test, "Ann");
    let id = person.id().unwrap();

    let a = people.get(&id).unwrap().unwrap();
    let b = people.get(&id).unwrap().unwrap();
    a.set_text("name", Some("Anna".into())).unwrap();
    assert_eq!(b.text("name").unwrap().as_deref(), Some("Ann"));
    assert!(!a.same_as(&b));
}

#[test]
fn ids_are_assigned_once() {
    let test = TestManager::memory();
    let person = new_person(&test, "Ida");
    assert!(person.id().is_none());
    assert!(person.is_new());
    assert!(test.save(&person, false).unwrap());
    let id = person.id().unwrap();
    assert!(!person.is_new());
    assert!(!person.is_dirty());

    person.set_integer("age", Some(30)).unwrap();
    assert!(test.save(&person, false).unwrap());
    assert_eq!(person.id(), Some(id));
}

#[test]
fn remote_ids_are_kept() {
    let test = TestManager::memory();
    let people = test.dao("Person").unwrap();
    let person = people.create_with_id("srv-42").unwrap();
    person.set_text("name", Some("Remote".into())).unwrap();
    assert!(people.save(&person, true).unwrap());
    assert!(people.get(&RecordId::from("srv-42")).unwrap().is_some());
}

#[test]
fn unparsable_values_name_the_field() {
    let test = TestManager::memory();
    let people = test.dao("Person").unwrap();
    let person = saved_person(&test, "Bad");
    let id = person.id().unwrap();
    let channel = test.schema().require("Person").unwrap().channel().unwrap().clone();
    test.store()
        .write_fields(&channel, id.as_str(), &[("age".into(), Some("old".into()))])
        .unwrap();

    let loaded = people.get(&id).unwrap().unwrap();
    match loaded.integer("age") {
        Err(CoreError::ValueFormat {
            field, entity, raw, ..
        }) => {
            assert_eq!(field, "age");
            assert_eq!(entity, "Person");
            assert_eq!(raw, "old");
        }
        other => panic!("expected a value format error, got {other:?}"),
    }
}

#[test]
fn refresh_drops_unsaved_edits() {
    let test = TestManager::memory();
    let people = test.dao("Person").unwrap();
    let person = saved_person(&test, "Rae");
    person.set_text("name", Some("Changed".into())).unwrap();
    assert!(people.refresh(&person).unwrap());
    assert_eq!(person.text("name").unwrap().as_deref(), Some("Rae"));
    assert!(!person.is_dirty());

    let unsaved = new_person(&test, "New");
    assert!(matches!(people.refresh(&unsaved), Err(CoreError::Usage { .. })));
}

#[test]
fn file_store_survives_reopening() {
    let test = TestManager::file();
    let invoice = new_invoice(&test, 7, &[3, 4]);
    assert!(test.save(&invoice, false).unwrap());

    let reopened = test.reopen();
    let loaded = reopened
        .dao("Invoice")
        .unwrap()
        .get(&invoice.id().unwrap())
        .unwrap()
        .unwrap();
    let amounts: Vec<_> = loaded
        .relationship_array("lines")
        .unwrap()
        .iter()
        .map(|l| l.integer("amount").unwrap())
        .collect();
    assert_eq!(amounts, vec![Some(3), Some(4)]);
}

#[test]
fn dates_are_stored_as_iso_text() {
    let test = TestManager::memory();
    let early = new_invoice(&test, 1, &[]);
    let late = new_invoice(&test, 2, &[]);
    let new_year = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    early.set_date("issued", Some(new_year)).unwrap();
    late.set_date("issued", NaiveDate::from_ymd_opt(2024, 11, 30)).unwrap();
    assert!(test.save(&early, false).unwrap());
    assert!(test.save(&late, false).unwrap());

    let loaded = test.dao("Invoice").unwrap().get(&early.id().unwrap()).unwrap().unwrap();
    assert_eq!(loaded.date("issued").unwrap(), Some(new_year));
    assert_eq!(loaded.raw_fields()["issued"].as_deref(), Some("2024-01-05"));

    let before = test
        .select("Invoice")
        .unwrap()
        .filter(Filter::lt("issued", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()))
        .records()
        .unwrap();
    assert_eq!(before.len(), 1);
    assert!(before[0].same_as(&early));
}
