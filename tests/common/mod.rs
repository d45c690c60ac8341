//! Shared test utilities for the integration suites.
//!
//! Import via `mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

pub use annal::{
    Changes, Entity, EntityId, Error, ManualClock, Timestamp, ValidationErrors, VersionRow,
    VersionStore,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub balance: i64,
}

impl Entity for Account {
    const TABLE: &'static str = "accounts";

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.name.trim().is_empty() {
            errors.add("name", "can't be blank");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub title: String,
    pub author_id: Option<EntityId>,
}

impl Entity for Post {
    const TABLE: &'static str = "posts";
}

pub fn account(name: &str) -> Account {
    Account {
        name: name.to_string(),
        balance: 0,
    }
}

// ============================================================================
// TestStore - store on a manual clock
// ============================================================================

/// Store whose `valid_from` values are driven by hand.
pub struct TestStore<T: Entity> {
    pub store: VersionStore<T>,
    pub clock: Arc<ManualClock>,
}

impl<T: Entity> TestStore<T> {
    /// Store with its clock at 1_000_000µs.
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_micros(1_000_000)));
        let store = VersionStore::<T>::in_memory().with_clock(clock.clone());
        TestStore { store, clock }
    }

    pub fn now(&self) -> Timestamp {
        use annal::Clock;
        self.clock.now()
    }

    pub fn tick(&self, millis: u64) -> Timestamp {
        self.clock.advance(Duration::from_millis(millis))
    }
}

// ============================================================================
// Assertions
// ============================================================================

/// Versions of `id` are exactly 1..=n with strictly increasing `valid_from`.
pub fn assert_chain_consistent<T: Entity>(store: &VersionStore<T>, id: EntityId) -> usize {
    let history = store.resolver().history(id).fetch().unwrap();
    for (i, row) in history.iter().enumerate() {
        assert_eq!(row.version().as_u64(), i as u64 + 1, "gap at position {i}");
        assert_eq!(row.entity_id(), id);
    }
    for pair in history.windows(2) {
        assert!(pair[0].valid_from() < pair[1].valid_from());
        assert_ne!(pair[0].row_id(), pair[1].row_id());
    }
    history.len()
}
