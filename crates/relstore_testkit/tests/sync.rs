//! Synchronization status, tombstones, dangling references and purges.

use relstore_core::{
    CancelToken, CoreError, PurgeOutcome, PurgeStage, RecordId, StatusTag, StatusTags, STATUS_FIELD,
};
use relstore_testkit::prelude::*;

#[test]
fn local_records_move_through_push_states() {
    let test = TestManager::memory();
    let people = test.dao("Person").unwrap();
    let alice = new_person(&test, "Alice");
    assert_eq!(alice.status(), StatusTags::created_locally());

    assert!(people.save(&alice, false).unwrap());
    assert_eq!(alice.status().bits(), 6);
    assert!(!alice.is_new());
    let id = alice.id().unwrap();
    let stored = test.store().read_record(people.entity().channel().unwrap(), id.as_str()).unwrap();
    assert_eq!(stored[STATUS_FIELD].as_deref(), Some("6"));

    assert!(people.mark_synchronizing(&alice).unwrap());
    assert!(alice.status().contains(StatusTag::Synchronizing));
    assert!(!alice.status().contains(StatusTag::Desynchronized));
    assert!(!people.mark_synchronizing(&alice).unwrap());
    let reloaded = people.get(&id).unwrap().unwrap();
    assert!(reloaded.status().contains(StatusTag::Synchronizing));

    assert!(people.save(&alice, true).unwrap());
    assert_eq!(alice.status(), StatusTags::empty());
    assert_eq!(people.get(&id).unwrap().unwrap().status().bits(), 0);
}

#[test]
fn remote_records_keep_their_ids() {
    let test = TestManager::memory();
    let people = test.dao("Person").unwrap();
    let bob = people.create_with_id("srv-7").unwrap();
    assert_eq!(bob.status(), StatusTags::created_remotely());
    assert!(bob.is_new());
    bob.set_text("name", Some("Bob".into())).unwrap();
    assert!(people.save(&bob, true).unwrap());
    assert_eq!(bob.id(), Some(RecordId::from("srv-7")));
    assert!(!bob.status().is_local());

    bob.set_integer("age", Some(3)).unwrap();
    assert!(people.save(&bob, false).unwrap());
    assert!(bob.status().contains(StatusTag::Desynchronized));
    assert!(!bob.status().is_local());
}

#[test]
fn unsaved_records_cannot_start_a_push() {
    let test = TestManager::memory();
    let alice = new_person(&test, "Alice");
    assert!(matches!(
        test.dao("Person").unwrap().mark_synchronizing(&alice),
        Err(CoreError::Usage { .. })
    ));
}

#[test]
fn only_remote_deletions_leave_tombstones() {
    let test = TestManager::memory();
    let people = test.dao("Person").unwrap();

    let local = saved_person(&test, "local");
    assert!(people.delete(&local, false).unwrap());
    assert!(test.pending_deletions("Person").unwrap().is_empty());

    let remote = people.create_with_id("srv-1").unwrap();
    assert!(people.save(&remote, true).unwrap());
    assert!(people.delete(&remote, true).unwrap());
    assert!(test.pending_deletions("Person").unwrap().is_empty());

    let pushed = people.create_with_id("srv-2").unwrap();
    assert!(people.save(&pushed, true).unwrap());
    assert!(people.delete(&pushed, false).unwrap());
    let pending = test.pending_deletions("Person").unwrap();
    assert_eq!(pending, vec![RecordId::from("srv-2")]);

    assert!(test.acknowledge_deletion("Person", &pending[0]).unwrap());
    assert!(!test.acknowledge_deletion("Person", &pending[0]).unwrap());
    assert!(test.pending_deletions("Person").unwrap().is_empty());
}

#[test]
fn strict_policy_fails_on_dangling_references() {
    let test = TestManager::memory_with(strict_config());
    let alice = saved_person(&test, "Alice");
    let channel = alice.entity().channel().unwrap().clone();
    test.store()
        .write_fields(
            &channel,
            alice.id().unwrap().as_str(),
            &[("manager".to_string(), Some("ghost".to_string()))],
        )
        .unwrap();

    let loaded = test.dao("Person").unwrap().get(&alice.id().unwrap()).unwrap().unwrap();
    match loaded.relationship("manager") {
        Err(CoreError::DanglingReference { relationship, id, .. }) => {
            assert_eq!(relationship, "manager");
            assert_eq!(id, "ghost");
        }
        other => panic!("expected a dangling reference, got {other:?}"),
    }
}

#[test]
fn lenient_policy_treats_dangling_references_as_absent() {
    let test = TestManager::memory_with(lenient_config());
    let alice = saved_person(&test, "Alice");
    let channel = alice.entity().channel().unwrap().clone();
    test.store()
        .write_fields(
            &channel,
            alice.id().unwrap().as_str(),
            &[("manager".to_string(), Some("ghost".to_string()))],
        )
        .unwrap();

    let loaded = test.dao("Person").unwrap().get(&alice.id().unwrap()).unwrap().unwrap();
    assert!(loaded.relationship("manager").unwrap().is_none());
}

#[test]
fn purge_removes_every_row_of_a_channel() {
    let test = TestManager::file();
    saved_person(&test, "Alice");
    saved_person(&test, "Bob");
    let team = test.dao("Team").unwrap().create();
    assert!(test.save(&team, false).unwrap());

    let handle = test.purge_in_background("Person").unwrap();
    match handle.join().unwrap() {
        PurgeOutcome::Completed {
            rows_removed,
            cancel_ignored,
        } => {
            assert!(rows_removed >= 4);
            assert!(!cancel_ignored);
        }
        other => panic!("expected a completed purge, got {other:?}"),
    }
    assert_eq!(test.dao("Person").unwrap().count().unwrap(), 0);
    assert_eq!(test.dao("Team").unwrap().count().unwrap(), 1);
}

#[test]
fn cancelled_purge_removes_nothing() {
    let test = TestManager::file();
    saved_person(&test, "Alice");

    let token = CancelToken::new();
    token.cancel();
    let handle = test.purge_with_token("Person", token).unwrap();
    assert_eq!(
        handle.join().unwrap(),
        PurgeOutcome::Cancelled {
            stage: PurgeStage::Opening
        }
    );
    assert_eq!(test.dao("Person").unwrap().count().unwrap(), 1);
}

#[test]
fn internal_entities_cannot_be_purged() {
    let test = TestManager::memory();
    assert!(test.purge_in_background("LineItem").is_err());
    assert!(test.pending_deletions("Part").is_err());
}
