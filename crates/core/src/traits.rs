//! Storage abstraction for versioned tables
//!
//! `RowStorage` is the seam between the version store and whatever engine
//! actually holds the rows. The in-memory `VersionTable` in `annal-storage`
//! is the reference implementation; a SQL-backed table would implement the
//! same trait with an `(entity_id, version)` unique index.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (requires Send + Sync).

use crate::contract::VersionRow;
use crate::error::Result;
use crate::types::EntityId;
use std::sync::Arc;

/// Append-only row store for one entity type
pub trait RowStorage<T>: Send + Sync {
    /// Row with the highest version for an entity, tombstone or not
    ///
    /// Returns `None` if the entity has no rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn latest(&self, entity_id: EntityId) -> Result<Option<Arc<VersionRow<T>>>>;

    /// Every row of one entity, ascending by version
    ///
    /// Empty if the entity has no rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn chain(&self, entity_id: EntityId) -> Result<Vec<Arc<VersionRow<T>>>>;

    /// Point-in-time copy of every row in the table
    ///
    /// The result reflects a single consistent state: an append that is in
    /// flight is either fully included or fully excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn scan(&self) -> Result<Vec<Arc<VersionRow<T>>>>;

    /// Atomically append rows
    ///
    /// Either every row is written or none is. Each row must carry the
    /// next version of its chain (1 for a new entity) and a row id that
    /// has never been used.
    ///
    /// # Errors
    ///
    /// Returns `Error::ChainConflict` if any row violates the unique or
    /// contiguity constraint; the table is left unchanged.
    fn append(&self, rows: Vec<VersionRow<T>>) -> Result<Vec<Arc<VersionRow<T>>>>;

    /// Total number of rows across all entities
    fn len(&self) -> usize;

    /// Whether the table has no rows
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
