//! Property tests over random operation sequences
//!
//! Whatever mix of create / extend / tombstone / restore is applied, each
//! chain stays gap-free and the resolver agrees with a simple model of
//! which entities are live.

use crate::common::*;
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Op {
    Create,
    Extend(usize, i64),
    Tombstone(usize),
    Restore(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Create),
        3 => (any::<usize>(), -100i64..100).prop_map(|(i, d)| Op::Extend(i, d)),
        2 => any::<usize>().prop_map(Op::Tombstone),
        2 => any::<usize>().prop_map(Op::Restore),
    ]
}

/// Expected state per entity: (versions, deleted, balance)
type Model = HashMap<EntityId, (u64, bool, i64)>;

fn apply(store: &VersionStore<Account>, ids: &mut Vec<EntityId>, model: &mut Model, op: &Op) {
    match *op {
        Op::Create => {
            let row = store.create(account("p")).unwrap();
            ids.push(row.entity_id());
            model.insert(row.entity_id(), (1, false, 0));
        }
        _ if ids.is_empty() => {}
        Op::Extend(i, delta) => {
            let id = ids[i % ids.len()];
            let entry = model.get_mut(&id).unwrap();
            match store.extend_with(id, |a| a.balance += delta) {
                Ok(row) => {
                    assert!(!entry.1);
                    entry.0 += 1;
                    entry.2 += delta;
                    assert_eq!(row.version().as_u64(), entry.0);
                }
                Err(e) => assert!(entry.1 && e.is_deleted()),
            }
        }
        Op::Tombstone(i) => {
            let id = ids[i % ids.len()];
            let entry = model.get_mut(&id).unwrap();
            match store.tombstone(id) {
                Ok(row) => {
                    assert!(!entry.1);
                    entry.0 += 1;
                    entry.1 = true;
                    assert_eq!(row.fields().balance, entry.2);
                }
                Err(e) => assert!(entry.1 && e.is_deleted()),
            }
        }
        Op::Restore(i) => {
            let id = ids[i % ids.len()];
            let entry = model.get_mut(&id).unwrap();
            match store.restore(id, None) {
                Ok(_) => {
                    assert!(entry.1);
                    entry.0 += 1;
                    entry.1 = false;
                }
                Err(e) => assert!(!entry.1 && e.is_not_deleted()),
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_chains_stay_gap_free(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let store = VersionStore::<Account>::in_memory();
        let mut ids = Vec::new();
        let mut model = Model::new();
        for op in &ops {
            apply(&store, &mut ids, &mut model, op);
        }

        let mut total = 0u64;
        for (id, (versions, _, _)) in &model {
            prop_assert_eq!(assert_chain_consistent(&store, *id) as u64, *versions);
            total += versions;
        }
        prop_assert_eq!(store.storage().len() as u64, total);
    }

    #[test]
    fn prop_current_matches_model(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let store = VersionStore::<Account>::in_memory();
        let mut ids = Vec::new();
        let mut model = Model::new();
        for op in &ops {
            apply(&store, &mut ids, &mut model, op);
        }

        let current = store.resolver().current().fetch().unwrap();
        let live = model.values().filter(|(_, deleted, _)| !deleted).count();
        prop_assert_eq!(current.len(), live);
        for row in current {
            let (versions, deleted, balance) = model[&row.entity_id()];
            prop_assert!(!deleted);
            prop_assert_eq!(row.version().as_u64(), versions);
            prop_assert_eq!(row.fields().balance, balance);
        }
    }
}
