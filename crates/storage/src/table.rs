//! In-memory versioned table
//!
//! `VersionTable<T>` is an append-only relation of `VersionRow<T>`:
//!
//! - a heap of rows in append order (`Vec<Arc<VersionRow<T>>>`)
//! - a chain index per entity (the `(entity_id, version)` unique index)
//! - a row-id map (the `row_id` primary key)
//!
//! All three live behind one `RwLock`, so an append of several rows is
//! atomic and a scan sees either all of it or none of it. Rows are handed
//! out as `Arc`s and never mutated after insertion.
//!
//! # Constraints
//!
//! `append` rejects a batch with `Error::ChainConflict` when any row
//! - duplicates an existing `(entity_id, version)`,
//! - would leave a gap in its chain, or
//! - reuses a `row_id`.
//!
//! The constraint is the last line of defence; the lock coordinator is what
//! makes concurrent writers queue instead of colliding here.

use crate::chain::ChainIndex;
use annal_core::{EntityId, Error, Result, RowId, RowStorage, Version, VersionRow};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug)]
struct TableData<T> {
    rows: Vec<Arc<VersionRow<T>>>,
    chains: FxHashMap<EntityId, ChainIndex>,
    row_ids: FxHashMap<RowId, usize>,
}

impl<T> Default for TableData<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            chains: FxHashMap::default(),
            row_ids: FxHashMap::default(),
        }
    }
}

/// Append-only table of version rows for one entity type
#[derive(Debug)]
pub struct VersionTable<T> {
    name: String,
    data: RwLock<TableData<T>>,
}

impl<T> VersionTable<T> {
    /// Create an empty table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(TableData::default()),
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of distinct entities (live or deleted)
    pub fn entity_count(&self) -> usize {
        self.data.read().chains.len()
    }

    /// Row with the given row id
    pub fn get_row(&self, row_id: RowId) -> Option<Arc<VersionRow<T>>> {
        let data = self.data.read();
        let pos = *data.row_ids.get(&row_id)?;
        data.rows.get(pos).cloned()
    }

    /// A specific version of an entity
    pub fn get_version(&self, entity_id: EntityId, version: Version) -> Option<Arc<VersionRow<T>>> {
        let data = self.data.read();
        let pos = data.chains.get(&entity_id)?.at(version)?;
        data.rows.get(pos).cloned()
    }

    /// Check a batch against the constraints without writing anything
    fn check_batch(data: &TableData<T>, rows: &[VersionRow<T>]) -> Result<()> {
        let mut expected: FxHashMap<EntityId, Version> = FxHashMap::default();
        let mut batch_ids: FxHashSet<RowId> = FxHashSet::default();

        for row in rows {
            let entity_id = row.entity_id();
            let next = match expected.get(&entity_id) {
                Some(v) => *v,
                None => data
                    .chains
                    .get(&entity_id)
                    .map(ChainIndex::next_version)
                    .unwrap_or(Version::FIRST),
            };

            if row.version() != next {
                return Err(Error::ChainConflict {
                    entity_id,
                    expected: next,
                    actual: row.version(),
                });
            }
            if data.row_ids.contains_key(&row.row_id()) || !batch_ids.insert(row.row_id()) {
                return Err(Error::ChainConflict {
                    entity_id,
                    expected: next,
                    actual: row.version(),
                });
            }
            expected.insert(entity_id, next.next());
        }
        Ok(())
    }
}

impl<T: Send + Sync> RowStorage<T> for VersionTable<T> {
    fn latest(&self, entity_id: EntityId) -> Result<Option<Arc<VersionRow<T>>>> {
        let data = self.data.read();
        Ok(data
            .chains
            .get(&entity_id)
            .and_then(ChainIndex::latest)
            .and_then(|pos| data.rows.get(pos).cloned()))
    }

    fn chain(&self, entity_id: EntityId) -> Result<Vec<Arc<VersionRow<T>>>> {
        let data = self.data.read();
        Ok(match data.chains.get(&entity_id) {
            Some(chain) => chain
                .positions()
                .iter()
                .filter_map(|&pos| data.rows.get(pos).cloned())
                .collect(),
            None => Vec::new(),
        })
    }

    fn scan(&self) -> Result<Vec<Arc<VersionRow<T>>>> {
        Ok(self.data.read().rows.clone())
    }

    fn append(&self, rows: Vec<VersionRow<T>>) -> Result<Vec<Arc<VersionRow<T>>>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut data = self.data.write();
        Self::check_batch(&data, &rows)?;

        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            let row = Arc::new(row);
            let pos = data.rows.len();
            data.row_ids.insert(row.row_id(), pos);
            data.chains.entry(row.entity_id()).or_default().push(pos);
            data.rows.push(Arc::clone(&row));
            trace!(
                target: "annal::storage",
                table = %self.name,
                entity_id = %row.entity_id(),
                version = row.version().as_u64(),
                "row appended"
            );
            written.push(row);
        }
        Ok(written)
    }

    fn len(&self) -> usize {
        self.data.read().rows.len()
    }
}
