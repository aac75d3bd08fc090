//! Save and delete cascades across top-level records.

use relstore_core::{CoreError, DataManager, Record, RecordId};
use relstore_testkit::prelude::*;

fn reload(manager: &DataManager, entity: &str, id: &RecordId) -> Option<Record> {
    manager.dao(entity).unwrap().get(id).unwrap()
}

fn team_with(manager: &DataManager, members: Vec<Record>) -> Record {
    let team = manager.dao("Team").unwrap().create();
    team.set_text("name", Some("Core".into())).unwrap();
    team.set_relationship_array("members", members).unwrap();
    assert!(manager.save(&team, false).unwrap());
    team
}

#[test]
fn source_owned_targets_are_saved_first() {
    let test = TestManager::memory();
    let alice = new_person(&test, "Alice");
    let bob = new_person(&test, "Bob");
    alice.set_relationship("manager", Some(&bob)).unwrap();
    assert!(test.save(&alice, false).unwrap());

    let bob_id = bob.id().expect("bob saved by the cascade");
    assert!(!bob.is_new());
    let stored = reload(&test, "Person", &alice.id().unwrap()).unwrap();
    assert_eq!(stored.raw_fields()["manager"].as_deref(), Some(bob_id.as_str()));
    assert!(!alice.has_buffered("manager"));
}

#[test]
fn deleting_a_referenced_record_is_refused() {
    let test = TestManager::memory();
    let bob = saved_person(&test, "Bob");
    let alice = new_person(&test, "Alice");
    alice.set_relationship("manager", Some(&bob)).unwrap();
    assert!(test.save(&alice, false).unwrap());

    let err = test.delete(&bob, false).unwrap_err();
    match &err {
        CoreError::ReferenceViolation {
            entity,
            referenced_by,
            ..
        } => {
            assert_eq!(entity, "Person");
            assert_eq!(referenced_by, &vec!["Person".to_string()]);
        }
        other => panic!("expected a reference violation, got {other:?}"),
    }
    assert!(!bob.is_deleted());
    assert!(reload(&test, "Person", &bob.id().unwrap()).is_some());

    alice.set_relationship("manager", None).unwrap();
    assert!(test.save(&alice, false).unwrap());
    assert!(test.delete(&bob, false).unwrap());
    assert!(bob.is_deleted());
    assert!(reload(&test, "Person", &bob.id().unwrap()).is_none());
}

#[test]
fn a_record_may_reference_itself() {
    let test = TestManager::memory();
    let boss = saved_person(&test, "Boss");
    boss.set_relationship("manager", Some(&boss)).unwrap();
    assert!(test.save(&boss, false).unwrap());
    assert!(test.delete(&boss, false).unwrap());
}

#[test]
fn deleting_a_composition_owner_deletes_its_children() {
    let test = TestManager::memory();
    let alice = new_person(&test, "Alice");
    let bob = new_person(&test, "Bob");
    let team = team_with(&test, vec![alice.clone(), bob.clone()]);

    let stored = reload(&test, "Person", &alice.id().unwrap()).unwrap();
    assert_eq!(stored.raw_fields()["team"].as_deref(), Some(team.id().unwrap().as_str()));

    assert!(test.delete(&team, false).unwrap());
    assert!(reload(&test, "Team", &team.id().unwrap()).is_none());
    assert!(reload(&test, "Person", &alice.id().unwrap()).is_none());
    assert!(reload(&test, "Person", &bob.id().unwrap()).is_none());
}

#[test]
fn deleting_an_association_owner_clears_back_references() {
    let test = TestManager::memory();
    let alice = new_person(&test, "Alice");
    let club = test.dao("Club").unwrap().create();
    club.set_relationship_array("members", vec![alice.clone()]).unwrap();
    assert!(test.save(&club, false).unwrap());

    assert!(test.delete(&club, false).unwrap());
    let stored = reload(&test, "Person", &alice.id().unwrap()).expect("alice survives");
    assert!(stored.relationship("club").unwrap().is_none());
    assert_eq!(stored.raw_fields()["club"], None);
}

#[test]
fn replacing_composition_members_deletes_the_dropped_ones() {
    let test = TestManager::memory();
    let alice = new_person(&test, "Alice");
    let team = team_with(&test, vec![alice.clone()]);

    let bob = new_person(&test, "Bob");
    team.set_relationship_array("members", vec![bob.clone()]).unwrap();
    assert!(test.save(&team, false).unwrap());

    assert!(reload(&test, "Person", &alice.id().unwrap()).is_none());
    let stored_bob = reload(&test, "Person", &bob.id().unwrap()).unwrap();
    assert!(stored_bob.relationship("team").unwrap().unwrap().same_as(&team));

    let members = team.relationship_array("members").unwrap();
    assert_eq!(members.len(), 1);
    assert!(members[0].same_as(&bob));
}

#[test]
fn replacing_association_members_releases_the_dropped_ones() {
    let test = TestManager::memory();
    let alice = new_person(&test, "Alice");
    let club = test.dao("Club").unwrap().create();
    club.set_relationship_array("members", vec![alice.clone()]).unwrap();
    assert!(test.save(&club, false).unwrap());

    let bob = new_person(&test, "Bob");
    club.set_relationship_array("members", vec![bob.clone()]).unwrap();
    assert!(test.save(&club, false).unwrap());

    let stored_alice = reload(&test, "Person", &alice.id().unwrap()).expect("alice survives");
    assert!(stored_alice.relationship("club").unwrap().is_none());
    let stored_bob = reload(&test, "Person", &bob.id().unwrap()).unwrap();
    assert!(stored_bob.relationship("club").unwrap().unwrap().same_as(&club));
}

#[test]
fn association_targets_keep_their_own_pending_edits() {
    let test = TestManager::memory();
    let carol = saved_person(&test, "Carol");
    carol.set_integer("age", Some(99)).unwrap();

    let club = test.dao("Club").unwrap().create();
    club.set_relationship_array("members", vec![carol.clone()]).unwrap();
    assert!(test.save(&club, false).unwrap());

    let stored = reload(&test, "Person", &carol.id().unwrap()).unwrap();
    assert_eq!(stored.integer("age").unwrap(), None);
    assert!(stored.relationship("club").unwrap().unwrap().same_as(&club));
    assert!(carol.is_dirty());
    assert_eq!(carol.integer("age").unwrap(), Some(99));
}

#[test]
fn add_and_remove_compose_against_stored_members() {
    let test = TestManager::memory();
    let alice = new_person(&test, "Alice");
    let club = test.dao("Club").unwrap().create();
    club.set_relationship_array("members", vec![alice.clone()]).unwrap();
    assert!(test.save(&club, false).unwrap());

    let stored = reload(&test, "Club", &club.id().unwrap()).unwrap();
    let bob = saved_person(&test, "Bob");
    stored.add_relationship("members", &bob).unwrap();
    assert_eq!(stored.relationship_array("members").unwrap().len(), 2);
    assert!(stored.remove_relationship("members", &alice).unwrap());
    assert!(!stored.remove_relationship("members", &alice).unwrap());
    assert!(test.save(&stored, false).unwrap());

    let members = reload(&test, "Club", &club.id().unwrap())
        .unwrap()
        .relationship_array("members")
        .unwrap();
    assert_eq!(members.len(), 1);
    assert!(members[0].same_as(&bob));
}

#[test]
fn deleted_records_are_read_only() {
    let test = TestManager::memory();
    let person = saved_person(&test, "Gone");
    assert!(test.delete(&person, false).unwrap());
    assert!(matches!(
        person.set_text("name", Some("x".into())),
        Err(CoreError::Usage { .. })
    ));
    assert!(matches!(test.save(&person, false), Err(CoreError::Usage { .. })));
    // Deleting twice is a no-op.
    assert!(test.delete(&person, false).unwrap());
}

#[test]
fn deleting_an_unsaved_record_touches_nothing() {
    let test = TestManager::memory();
    let person = new_person(&test, "Draft");
    assert!(test.delete(&person, false).unwrap());
    assert!(person.is_deleted());
    assert_eq!(test.dao("Person").unwrap().count().unwrap(), 0);
}

#[test]
fn a_rejected_commit_rolls_everything_back() {
    let test = TestManager::memory();
    let alice = new_person(&test, "Alice");
    let bob = new_person(&test, "Bob");
    alice.set_relationship("manager", Some(&bob)).unwrap();

    test.store().set_commit_guard(|| false);
    assert!(!test.save(&alice, false).unwrap());
    test.store().clear_commit_guard();

    assert_eq!(test.dao("Person").unwrap().count().unwrap(), 0);
    assert!(alice.is_new());
    assert!(alice.is_dirty());
    assert!(alice.has_buffered("manager"));
    assert!(bob.is_new());
    assert!(bob.is_dirty());

    // Ids handed out during the failed attempt are reused.
    let alice_id = alice.id();
    assert!(alice_id.is_some());
    assert!(test.save(&alice, false).unwrap());
    assert_eq!(alice.id(), alice_id);
    assert_eq!(test.dao("Person").unwrap().count().unwrap(), 2);
}

#[test]
fn a_failed_cascade_rolls_everything_back() {
    let test = TestManager::memory();
    let bob = saved_person(&test, "Bob");
    let alice = new_person(&test, "Alice");
    alice.set_relationship("manager", Some(&bob)).unwrap();
    assert!(test.save(&alice, false).unwrap());

    // Replacing a team member deletes the old one, which alice still
    // references, so the whole save fails.
    let team = team_with(&test, vec![bob.clone()]);
    let carol = new_person(&test, "Carol");
    team.set_relationship_array("members", vec![carol.clone()]).unwrap();
    let err = test.save(&team, false).unwrap_err();
    assert!(err.is_reference_violation());

    assert!(reload(&test, "Person", &bob.id().unwrap()).is_some());
    assert!(carol.is_new());
    assert!(team.has_buffered("members"));
    let members = reload(&test, "Team", &team.id().unwrap())
        .unwrap()
        .relationship_array("members")
        .unwrap();
    assert_eq!(members.len(), 1);
    assert!(members[0].same_as(&bob));
}
