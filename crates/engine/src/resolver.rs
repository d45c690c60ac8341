//! Read-side projections of a versioned table
//!
//! `QueryResolver<T>` has no state beyond a handle to the rows. Each
//! method returns a fresh `Query<T>` that callers refine further:
//!
//! | Method | Rows |
//! |--------|------|
//! | `current` | latest per entity, tombstones removed |
//! | `include_deleted` | latest per entity, tombstones kept |
//! | `history(id)` | every version of one entity, ascending |
//! | `at_time(t)` | latest with `valid_from <= t` per entity, tombstones kept |
//! | `active_at(t)` | `at_time(t)` without tombstones |
//! | `all_versions` | everything |
//!
//! `at_time` keeps tombstones: an entity deleted as of `t` shows up as its
//! tombstone row, which is what an audit trail needs. `active_at` is the
//! "what was live at `t`" variant.

use crate::query::{Lookup, Query, Source};
use annal_core::{EntityRef, Result, RowStorage, Timestamp};
use std::fmt;
use std::sync::Arc;

/// Factory for queries over one table
pub struct QueryResolver<T> {
    storage: Arc<dyn RowStorage<T>>,
}

impl<T> Clone for QueryResolver<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<T: Send + Sync + 'static> QueryResolver<T> {
    /// Resolver over `storage`
    pub fn new(storage: Arc<dyn RowStorage<T>>) -> Self {
        Self { storage }
    }

    /// Current rows: latest version per entity, not tombstoned
    pub fn current(&self) -> Query<T> {
        Query::new(Arc::clone(&self.storage), Source::Current)
    }

    /// Every version of one entity, ascending by version
    ///
    /// Empty for an unknown entity.
    pub fn history(&self, entity: impl EntityRef) -> Query<T> {
        Query::new(
            Arc::clone(&self.storage),
            Source::History(entity.entity_id()),
        )
    }

    /// Rows as of `at`, tombstones included
    ///
    /// A row with `valid_from == at` is visible.
    pub fn at_time(&self, at: Timestamp) -> Query<T> {
        Query::new(Arc::clone(&self.storage), Source::AtTime(at))
    }

    /// Rows active as of `at`
    pub fn active_at(&self, at: Timestamp) -> Query<T> {
        Query::new(Arc::clone(&self.storage), Source::ActiveAt(at))
    }

    /// Every row of every entity
    pub fn all_versions(&self) -> Query<T> {
        Query::new(Arc::clone(&self.storage), Source::AllVersions)
    }

    /// Latest row per entity whether or not it is a tombstone
    pub fn include_deleted(&self) -> Query<T> {
        Query::new(Arc::clone(&self.storage), Source::IncludeDeleted)
    }

    /// Tri-state lookup of one entity's current row
    ///
    /// # Errors
    ///
    /// Propagates storage read errors.
    pub fn fetch_current(&self, entity: impl EntityRef) -> Result<Lookup<T>> {
        let entity_id = entity.entity_id();
        Ok(match self.storage.latest(entity_id)? {
            None => Lookup::NotFound(entity_id),
            Some(row) if row.is_tombstone() => Lookup::Deleted(entity_id),
            Some(row) => Lookup::Found(row),
        })
    }
}

impl<T> fmt::Debug for QueryResolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResolver")
            .field("rows", &self.storage.len())
            .finish()
    }
}
