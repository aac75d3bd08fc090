//! Selects over top-level and embedded entities.

use relstore_core::{Cast, Collation, CoreError, DataManager, Filter, Record, Selected, SyncState, Value};
use relstore_testkit::prelude::*;

struct People {
    alice: Record,
    bob: Record,
    carol: Record,
    dave: Record,
}

/// Bob manages Alice and Carol; Dave has no manager and no age.
fn people(manager: &DataManager) -> People {
    let bob = new_person(manager, "Bob");
    bob.set_integer("age", Some(52)).unwrap();
    bob.set_boolean("active", Some(true)).unwrap();
    assert!(manager.save(&bob, false).unwrap());

    let alice = new_person(manager, "Alice");
    alice.set_integer("age", Some(9)).unwrap();
    alice.set_boolean("active", Some(true)).unwrap();
    alice.set_relationship("manager", Some(&bob)).unwrap();
    assert!(manager.save(&alice, false).unwrap());

    let carol = new_person(manager, "carol");
    carol.set_integer("age", Some(30)).unwrap();
    carol.set_boolean("active", Some(false)).unwrap();
    carol.set_relationship("manager", Some(&bob)).unwrap();
    assert!(manager.save(&carol, false).unwrap());

    let dave = saved_person(manager, "Dave_100%");

    People {
        alice,
        bob,
        carol,
        dave,
    }
}

fn names(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.text("name").unwrap().unwrap_or_default())
        .collect()
}

fn sorted_names(manager: &DataManager, filter: Filter) -> Vec<String> {
    let mut found = names(&manager.select("Person").unwrap().filter(filter).records().unwrap());
    found.sort();
    found
}

#[test]
fn managed_people_are_found_by_manager_id() {
    let test = TestManager::memory();
    let bob = saved_person(&test, "Bob");
    let alice = new_person(&test, "Alice");
    alice.set_relationship("manager", Some(&bob)).unwrap();
    assert!(test.save(&alice, false).unwrap());

    let found = test
        .select("Person")
        .unwrap()
        .filter(Filter::eq("manager", &bob.id().unwrap()))
        .records()
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].same_as(&alice));
}

#[test]
fn filtering_by_reference_id() {
    let test = TestManager::memory();
    let p = people(&test);
    let bob_id = p.bob.id().unwrap();
    assert_eq!(
        sorted_names(&test, Filter::eq("manager", &bob_id)),
        vec!["Alice", "carol"]
    );
    let managed = test
        .select("Person")
        .unwrap()
        .filter(Filter::eq("manager", &bob_id))
        .filter(Filter::lt("age", 20))
        .records()
        .unwrap();
    assert_eq!(managed.len(), 1);
    assert!(managed[0].same_as(&p.alice));
}

#[test]
fn comparisons_cast_to_the_attribute_type() {
    let test = TestManager::memory();
    people(&test);
    // 9 < 30 numerically but not as text
    assert_eq!(sorted_names(&test, Filter::lt("age", 30)), vec!["Alice"]);
    assert_eq!(sorted_names(&test, Filter::ge("age", 30)), vec!["Bob", "carol"]);
    assert_eq!(
        sorted_names(&test, Filter::between("age", 9, 30)),
        vec!["Alice", "carol"]
    );
    // "30" < "5" < "52" < "9" as text
    assert_eq!(
        sorted_names(&test, Filter::lt("age", 5).cast(Cast::Text)),
        vec!["carol"]
    );
}

#[test]
fn null_and_membership_tests() {
    let test = TestManager::memory();
    people(&test);
    assert_eq!(sorted_names(&test, Filter::is_null("age")), vec!["Dave_100%"]);
    assert_eq!(sorted_names(&test, Filter::is_null("manager")), vec!["Bob", "Dave_100%"]);
    assert_eq!(
        sorted_names(&test, Filter::in_list("age", [9, 52])),
        vec!["Alice", "Bob"]
    );
    assert!(sorted_names(&test, Filter::in_list("age", Vec::<i64>::new())).is_empty());
    // NULL never compares unequal
    assert_eq!(sorted_names(&test, Filter::ne("age", 9)), vec!["Bob", "carol"]);
    assert_eq!(sorted_names(&test, Filter::eq("active", false)), vec!["carol"]);
}

#[test]
fn text_matching_escapes_metacharacters() {
    let test = TestManager::memory();
    people(&test);
    assert_eq!(sorted_names(&test, Filter::starts_with("name", "c")), vec!["carol"]);
    assert_eq!(sorted_names(&test, Filter::starts_with("name", "C")), vec!["carol"]);
    assert_eq!(sorted_names(&test, Filter::ends_with("name", "0%")), vec!["Dave_100%"]);
    assert_eq!(sorted_names(&test, Filter::contains("name", "_")), vec!["Dave_100%"]);
    assert_eq!(sorted_names(&test, Filter::contains("name", "%")), vec!["Dave_100%"]);
    assert_eq!(sorted_names(&test, Filter::contains("name", "o")), vec!["Bob", "carol"]);
}

#[test]
fn boolean_composition() {
    let test = TestManager::memory();
    people(&test);
    let young_or_inactive = Filter::lt("age", 10).or(Filter::eq("active", false));
    assert_eq!(sorted_names(&test, young_or_inactive.clone()), vec!["Alice", "carol"]);
    assert_eq!(
        sorted_names(&test, young_or_inactive.group().and(Filter::is_not_null("manager"))),
        vec!["Alice", "carol"]
    );
    assert_eq!(
        sorted_names(&test, !Filter::starts_with("name", "D")),
        vec!["Alice", "Bob", "carol"]
    );
}

#[test]
fn hops_follow_singular_references() {
    let test = TestManager::memory();
    people(&test);
    assert_eq!(
        sorted_names(&test, Filter::eq("manager.name", "Bob")),
        vec!["Alice", "carol"]
    );
    let manager_ages = test
        .select("Person")
        .unwrap()
        .field("manager.age")
        .filter(Filter::is_not_null("manager"))
        .distinct()
        .values()
        .unwrap();
    assert_eq!(manager_ages, vec![Some(Value::Integer(52))]);
}

#[test]
fn ordering_and_paging() {
    let test = TestManager::memory();
    people(&test);
    let by_age = test
        .select("Person")
        .unwrap()
        .field("name")
        .filter(Filter::is_not_null("age"))
        .order_by("age")
        .values()
        .unwrap();
    assert_eq!(
        by_age,
        vec![
            Some(Value::Text("Alice".into())),
            Some(Value::Text("carol".into())),
            Some(Value::Text("Bob".into())),
        ]
    );

    let page = test
        .select("Person")
        .unwrap()
        .field("name")
        .order_with("name", false, Some(Collation::NoCase))
        .limit(2)
        .offset(1)
        .values()
        .unwrap();
    assert_eq!(
        page,
        vec![Some(Value::Text("Bob".into())), Some(Value::Text("carol".into()))]
    );

    let oldest = test
        .select("Person")
        .unwrap()
        .filter(Filter::is_not_null("age"))
        .order_by_desc("age")
        .limit(1)
        .records()
        .unwrap();
    assert_eq!(names(&oldest), vec!["Bob"]);
}

#[test]
fn tuples_keep_select_order() {
    let test = TestManager::memory();
    people(&test);
    let rows = test
        .select("Person")
        .unwrap()
        .fields(["name", "age", "manager.name"])
        .filter(Filter::eq("name", "Alice"))
        .tuples()
        .unwrap();
    assert_eq!(
        rows,
        vec![vec![
            Some(Value::Text("Alice".into())),
            Some(Value::Integer(9)),
            Some(Value::Text("Bob".into())),
        ]]
    );
}

#[test]
fn counting_and_cursors() {
    let test = TestManager::memory();
    people(&test);
    let select = test.select("Person").unwrap().filter(Filter::is_not_null("age"));
    assert_eq!(select.count().unwrap(), 3);

    let mut cursor = select.cursor().unwrap();
    assert_eq!(cursor.remaining(), 3);
    assert!(matches!(cursor.next(), Some(Ok(Selected::Record(_)))));
    assert_eq!(cursor.remaining(), 2);
    assert_eq!(cursor.count(), 2);
}

#[test]
fn sub_selects_restrict_ids() {
    let test = TestManager::memory();
    let p = people(&test);
    let managers = test.select("Person").unwrap().field("manager");
    let found = test.select("Person").unwrap().where_id_in(managers).records().unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].same_as(&p.bob));

    let adults = test.select("Person").unwrap().filter(Filter::ge("age", 18));
    let managed_by_adults = test
        .select("Person")
        .unwrap()
        .where_field_in("manager", adults)
        .records()
        .unwrap();
    let mut got = names(&managed_by_adults);
    got.sort();
    assert_eq!(got, vec!["Alice", "carol"]);
}

#[test]
fn sync_state_filters() {
    let test = TestManager::memory();
    let local = saved_person(&test, "local");
    let people = test.dao("Person").unwrap();
    let remote = people.create_with_id("r-1").unwrap();
    remote.set_text("name", Some("remote".into())).unwrap();
    assert!(people.save(&remote, true).unwrap());
    let pushing = saved_person(&test, "pushing");
    assert!(people.mark_synchronizing(&pushing).unwrap());

    assert_eq!(
        sorted_names(&test, Filter::sync_status(SyncState::Desynchronized)),
        vec!["local"]
    );
    assert_eq!(
        sorted_names(&test, Filter::sync_status(SyncState::Synchronizing)),
        vec!["pushing"]
    );
    assert_eq!(
        sorted_names(&test, Filter::sync_status(SyncState::Synchronized)),
        vec!["remote"]
    );
    assert!(local.status().is_local());
}

#[test]
fn invalid_paths_are_rejected() {
    let test = TestManager::memory();
    let select = |field: &str| test.select("Person").unwrap().field(field).values();
    assert!(matches!(select("nicknames"), Err(CoreError::Path { .. })));
    assert!(matches!(select("name.first"), Err(CoreError::Path { .. })));
    assert!(matches!(select("manager[0].name"), Err(CoreError::Path { .. })));
    assert!(select("nope").is_err());

    let team = |field: &str| test.select("Team").unwrap().field(field).values();
    assert!(matches!(team("members"), Err(CoreError::Path { .. })));
    assert!(matches!(team("members.name"), Err(CoreError::Path { .. })));

    let lines = |field: &str| test.select("LineItem").unwrap().field(field).values();
    assert!(matches!(lines("detail"), Err(CoreError::Path { .. })));
    assert!(matches!(lines("parts"), Err(CoreError::Path { .. })));
    assert!(matches!(lines("invoice"), Err(CoreError::Path { .. })));
}

#[test]
fn result_shape_must_match_the_select_list() {
    let test = TestManager::memory();
    let select = test.select("Person").unwrap();
    assert!(matches!(select.values(), Err(CoreError::Usage { .. })));
    assert!(matches!(select.positions(), Err(CoreError::Usage { .. })));
    let one = select.clone().field("name");
    assert!(matches!(one.records(), Err(CoreError::Usage { .. })));
    assert!(matches!(one.tuples(), Err(CoreError::Usage { .. })));
}

#[test]
fn embedded_elements_can_be_selected() {
    let test = TestManager::memory();
    let first = new_invoice(&test, 1, &[10, 20]);
    let second = new_invoice(&test, 2, &[30]);
    let detail = test.dao("Detail").unwrap().create();
    detail.set_decimal("weight", Some(4.5)).unwrap();
    second.relationship_array("lines").unwrap()[0]
        .set_relationship("detail", Some(&detail))
        .unwrap();
    assert!(test.save(&first, false).unwrap());
    assert!(test.save(&second, false).unwrap());

    let lines = test.select("LineItem").unwrap();
    assert_eq!(lines.count().unwrap(), 3);

    let big = lines.clone().filter(Filter::ge("amount", 20)).positions().unwrap();
    let mut expected = vec![(first.id().unwrap(), 1), (second.id().unwrap(), 0)];
    expected.sort();
    let mut big_sorted = big.clone();
    big_sorted.sort();
    assert_eq!(big_sorted, expected);

    let heavy = lines
        .clone()
        .filter(Filter::gt("detail.weight", 1.0))
        .records()
        .unwrap();
    assert_eq!(heavy.len(), 1);
    assert_eq!(heavy[0].integer("amount").unwrap(), Some(30));
    assert_eq!(heavy[0].owner_path().as_deref(), Some("/lines[0]"));

    let mut amounts = lines.field("amount").values().unwrap();
    amounts.sort_by_key(|v| match v {
        Some(Value::Integer(n)) => *n,
        _ => i64::MIN,
    });
    assert_eq!(
        amounts,
        vec![
            Some(Value::Integer(10)),
            Some(Value::Integer(20)),
            Some(Value::Integer(30)),
        ]
    );
}

#[test]
fn only_top_level_arrays_can_be_selected() {
    let test = TestManager::memory();
    assert!(matches!(test.select("Part"), Err(CoreError::Usage { .. })));
    assert!(matches!(test.select("Detail"), Err(CoreError::Usage { .. })));
    let lines = test.select("LineItem").unwrap();
    assert!(matches!(
        lines.filter(Filter::sync_status(SyncState::Synchronized)).count(),
        Err(CoreError::Usage { .. })
    ));
}

#[test]
fn views_follow_each_relationship_shape() {
    let test = TestManager::memory();
    let p = people(&test);

    // source-owned
    let view = test.select_view(&p.alice, "manager").unwrap().records().unwrap();
    assert_eq!(names(&view), vec!["Bob"]);

    // mapped by the target
    let team = test.dao("Team").unwrap().create();
    team.set_text("name", Some("Core".into())).unwrap();
    team.set_relationship_array("members", vec![p.alice.clone(), p.carol.clone()])
        .unwrap();
    assert!(test.save(&team, false).unwrap());
    let members = test
        .select_view(&team, "members")
        .unwrap()
        .filter(Filter::lt("age", 20))
        .records()
        .unwrap();
    assert_eq!(names(&members), vec!["Alice"]);

    // embedded elements of one owner
    let invoice = new_invoice(&test, 3, &[1, 2, 3]);
    let other = new_invoice(&test, 4, &[4]);
    assert!(test.save(&invoice, false).unwrap());
    assert!(test.save(&other, false).unwrap());
    let positions = test
        .select_view(&invoice, "lines")
        .unwrap()
        .filter(Filter::gt("amount", 1))
        .positions()
        .unwrap();
    let id = invoice.id().unwrap();
    assert_eq!(positions, vec![(id.clone(), 1), (id, 2)]);
}

#[test]
fn views_reflect_storage_not_pending_edits() {
    let test = TestManager::memory();
    let p = people(&test);
    p.alice.set_relationship("manager", Some(&p.dave)).unwrap();
    let view = test.select_view(&p.alice, "manager").unwrap().records().unwrap();
    assert_eq!(names(&view), vec!["Bob"]);

    let unsaved = new_invoice(&test, 9, &[1]);
    assert!(test.select_view(&unsaved, "lines").unwrap().records().unwrap().is_empty());
    assert!(matches!(
        test.select_view(&p.alice, "name"),
        Err(CoreError::Usage { .. })
    ));
}
