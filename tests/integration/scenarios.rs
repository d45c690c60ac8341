//! Lifecycle scenarios through the public facade
//!
//! Each test walks one entity through the state machine and checks both
//! the returned rows and what the resolver sees afterwards.

use crate::common::*;
use annal::Lookup;

#[test]
fn scenario_create_extend_tombstone_restore() {
    let store = VersionStore::<Account>::in_memory();

    let v1 = store.create(account("X")).unwrap();
    assert_eq!(v1.version().as_u64(), 1);
    assert!(!v1.is_tombstone());

    let v2 = store.extend(&v1, Changes::new().set("name", "Y")).unwrap();
    assert_eq!(v2.version().as_u64(), 2);
    assert_eq!(v2.fields().name, "Y");

    let v3 = store.tombstone(&v1).unwrap();
    assert_eq!(v3.version().as_u64(), 3);
    assert!(v3.deleted_at().is_some());
    assert_eq!(v3.fields().name, "Y");

    let v4 = store.restore(&v1, None).unwrap();
    assert_eq!(v4.version().as_u64(), 4);
    assert!(v4.deleted_at().is_none());
    assert_eq!(v4.fields().name, "Y");

    // One entity id, four distinct rows
    let ids: Vec<EntityId> = [&v1, &v2, &v3, &v4].iter().map(|r| r.entity_id()).collect();
    assert!(ids.iter().all(|id| *id == v1.entity_id()));
    assert_eq!(assert_chain_consistent(&store, v1.entity_id()), 4);
}

#[test]
fn scenario_extend_unknown_entity_is_not_found() {
    let store = VersionStore::<Account>::in_memory();
    let ghost = EntityId::new();
    let err = store.extend(ghost, Changes::new().set("name", "Y")).unwrap_err();
    assert!(matches!(err, Error::NotFound { entity_id } if entity_id == ghost));
    assert_eq!(store.storage().len(), 0);
}

#[test]
fn scenario_double_tombstone_is_deleted() {
    let store = VersionStore::<Account>::in_memory();
    let v1 = store.create(account("X")).unwrap();
    store.tombstone(&v1).unwrap();

    let err = store.tombstone(&v1).unwrap_err();
    assert!(err.is_deleted());
    assert_eq!(assert_chain_consistent(&store, v1.entity_id()), 2);
}

#[test]
fn scenario_restore_active_is_not_deleted() {
    let store = VersionStore::<Account>::in_memory();
    let v1 = store.create(account("X")).unwrap();

    let err = store.restore(&v1, None).unwrap_err();
    assert!(err.is_not_deleted());
    assert_eq!(assert_chain_consistent(&store, v1.entity_id()), 1);
}

#[test]
fn scenario_deleted_and_unknown_are_distinguishable() {
    let store = VersionStore::<Account>::in_memory();
    let v1 = store.create(account("X")).unwrap();
    store.tombstone(&v1).unwrap();

    let deleted = store.fetch_current(&v1).unwrap();
    let unknown = store.fetch_current(EntityId::new()).unwrap();
    assert!(matches!(deleted, Lookup::Deleted(id) if id == v1.entity_id()));
    assert!(matches!(unknown, Lookup::NotFound(_)));

    assert!(deleted.into_result().unwrap_err().is_deleted());
    assert!(unknown.into_result().unwrap_err().is_not_found());
}

#[test]
fn extend_on_deleted_entity_appends_nothing() {
    let store = VersionStore::<Account>::in_memory();
    let v1 = store.create(account("X")).unwrap();
    store.tombstone(&v1).unwrap();

    let err = store.extend(&v1, Changes::new().set("name", "Z")).unwrap_err();
    assert!(err.is_deleted());
    assert_eq!(store.storage().len(), 2);
}

#[test]
fn tombstone_then_restore_adds_exactly_two_versions() {
    let store = VersionStore::<Account>::in_memory();
    let v1 = store.create(account("X")).unwrap();
    let v2 = store.extend(&v1, Changes::new().set("balance", 7)).unwrap();

    let t = store.tombstone(&v1).unwrap();
    let r = store.restore(&v1, None).unwrap();
    assert_eq!(t.version().as_u64(), v2.version().as_u64() + 1);
    assert_eq!(r.version().as_u64(), v2.version().as_u64() + 2);
    assert_eq!(r.fields(), v2.fields());
}

#[test]
fn restore_with_changes_overlays_fields() {
    let store = VersionStore::<Account>::in_memory();
    let v1 = store.create(account("X")).unwrap();
    store.tombstone(&v1).unwrap();

    let r = store
        .restore(&v1, Some(Changes::new().set("name", "Back")))
        .unwrap();
    assert_eq!(r.fields().name, "Back");
    assert_eq!(r.version().as_u64(), 3);
}

#[test]
fn untrusted_keys_are_dropped_one_by_one() {
    let store = VersionStore::<Account>::in_memory();
    let v1 = store.create(account("X")).unwrap();

    let changes = Changes::from_json(serde_json::json!({
        "name": "Y",
        "version": 99,
        "entity_id": "forged",
        "no_such_field": true,
    }))
    .unwrap();
    let v2 = store.extend(&v1, changes).unwrap();

    assert_eq!(v2.fields().name, "Y");
    assert_eq!(v2.version().as_u64(), 2);
    assert_eq!(v2.entity_id(), v1.entity_id());
}

#[test]
fn invalid_payload_is_rejected_without_a_row() {
    let store = VersionStore::<Account>::in_memory();
    let v1 = store.create(account("X")).unwrap();

    let err = store.extend(&v1, Changes::new().set("name", "  ")).unwrap_err();
    assert!(err.validation_errors().unwrap().has_field("name"));
    assert!(store.create(account("")).unwrap_err().is_validation());
    assert_eq!(store.storage().len(), 1);
}

#[test]
fn rolled_back_transaction_leaves_no_rows() {
    let store = VersionStore::<Account>::in_memory();
    let a = store.create(account("A")).unwrap();
    let b = store.create(account("B")).unwrap();
    store.tombstone(&b).unwrap();

    // Second step fails, so the first must not land either
    let err = store
        .transaction(|txn| {
            store.extend_in(txn, &a, Changes::new().set("balance", 10))?;
            store.extend_in(txn, &b, Changes::new().set("balance", 10))
        })
        .unwrap_err();
    assert!(err.is_deleted());
    assert_eq!(assert_chain_consistent(&store, a.entity_id()), 1);
    assert_eq!(store.lock_coordinator().active_keys(), 0);
}
