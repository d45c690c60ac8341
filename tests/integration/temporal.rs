//! As-of and history queries against a manually driven clock

use crate::common::*;

/// v1 at T0, v2 at T0+10ms, tombstone at T0+20ms, restore at T0+30ms
fn timeline() -> (TestStore<Account>, EntityId, Vec<Timestamp>) {
    let t = TestStore::<Account>::new();
    let mut stamps = vec![t.now()];
    let v1 = t.store.create(account("X")).unwrap();

    stamps.push(t.tick(10));
    t.store.extend(&v1, Changes::new().set("name", "Y")).unwrap();
    stamps.push(t.tick(10));
    t.store.tombstone(&v1).unwrap();
    stamps.push(t.tick(10));
    t.store.restore(&v1, None).unwrap();

    (t, v1.entity_id(), stamps)
}

fn version_at(t: &TestStore<Account>, id: EntityId, at: Timestamp) -> Option<u64> {
    t.store
        .resolver()
        .at_time(at)
        .entities([id])
        .first()
        .unwrap()
        .map(|r| r.version().as_u64())
}

#[test]
fn at_time_boundary_is_inclusive() {
    let (t, id, stamps) = timeline();
    for (i, stamp) in stamps.iter().enumerate() {
        assert_eq!(version_at(&t, id, *stamp), Some(i as u64 + 1));
        let before = stamp.prev_tick();
        let expected = if i == 0 { None } else { Some(i as u64) };
        assert_eq!(version_at(&t, id, before), expected);
    }
}

#[test]
fn at_time_returns_tombstone_and_active_at_hides_it() {
    let (t, id, stamps) = timeline();
    let deleted_at = stamps[2];

    let row = t.store.resolver().at_time(deleted_at).first().unwrap().unwrap();
    assert_eq!(row.entity_id(), id);
    assert!(row.is_tombstone());

    assert_eq!(t.store.resolver().active_at(deleted_at).count().unwrap(), 0);
    assert_eq!(t.store.resolver().active_at(stamps[3]).count().unwrap(), 1);
}

#[test]
fn current_has_at_most_one_row_per_entity() {
    let t = TestStore::<Account>::new();
    let ids: Vec<EntityId> = (0..5)
        .map(|i| t.store.create(account(&format!("a{i}"))).unwrap().entity_id())
        .collect();
    for (i, id) in ids.iter().enumerate() {
        for _ in 0..i {
            t.tick(1);
            t.store.extend_with(*id, |a| a.balance += 1).unwrap();
        }
    }
    t.store.tombstone(ids[4]).unwrap();

    let rows = t.store.resolver().current().fetch().unwrap();
    assert_eq!(rows.len(), 4);
    let mut seen: Vec<EntityId> = rows.iter().map(|r| r.entity_id()).collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 4);
    for row in &rows {
        let latest = t.store.resolver().history(row.entity_id()).fetch().unwrap();
        assert_eq!(row.row_id(), latest.last().unwrap().row_id());
    }

    assert_eq!(t.store.resolver().include_deleted().count().unwrap(), 5);
}

#[test]
fn history_is_repeatable() {
    let (t, id, _) = timeline();
    let first: Vec<_> = t
        .store
        .resolver()
        .history(id)
        .fetch()
        .unwrap()
        .iter()
        .map(|r| r.row_id())
        .collect();
    let second: Vec<_> = t
        .store
        .resolver()
        .history(id)
        .fetch()
        .unwrap()
        .iter()
        .map(|r| r.row_id())
        .collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}

#[test]
fn stalled_clock_still_yields_increasing_valid_from() {
    let t = TestStore::<Account>::new();
    let v1 = t.store.create(account("X")).unwrap();
    for _ in 0..3 {
        t.store.extend_with(&v1, |a| a.balance += 1).unwrap();
    }
    // Clock jumps backwards
    t.clock.set(Timestamp::from_micros(10));
    t.store.extend_with(&v1, |a| a.balance += 1).unwrap();

    assert_eq!(assert_chain_consistent(&t.store, v1.entity_id()), 5);
}

#[test]
fn all_versions_orders_by_entity_then_version() {
    let (t, _, _) = timeline();
    t.store.create(account("Other")).unwrap();

    let rows = t.store.resolver().all_versions().fetch().unwrap();
    assert_eq!(rows.len(), 5);
    for pair in rows.windows(2) {
        let a = (pair[0].entity_id(), pair[0].version());
        let b = (pair[1].entity_id(), pair[1].version());
        assert!(a < b);
    }
}
