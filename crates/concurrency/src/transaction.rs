//! Transaction scope for version-chain mutations
//!
//! A `Transaction<T>` is the unit of atomicity for the version store:
//!
//! - entity locks acquired through it are held until it ends
//! - rows staged in it are buffered and invisible to other readers
//! - reads through it see its own staged rows on top of storage
//!
//! ## Lifecycle
//!
//! ```text
//! begin ──► lock / stage ... ──► commit ──► append all rows ──► release locks
//!                         │
//!                         └──► rollback / drop ──► discard rows ──► release locks
//! ```
//!
//! Commit writes every staged row in one `RowStorage::append`, so either
//! all of them become visible or none do. Locks are released after the
//! append returns, whatever the outcome. A transaction dropped without
//! commit rolls back.

use crate::lock::{lock_key, LockCoordinator, LockGuard};
use annal_core::{EntityId, Result, RowStorage, VersionRow};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can lock and stage rows
    Active,
    /// Staged rows were appended
    Committed,
    /// Staged rows were discarded
    RolledBack,
}

/// A transaction over one versioned table
pub struct Transaction<T> {
    id: u64,
    storage: Arc<dyn RowStorage<T>>,
    coordinator: Arc<LockCoordinator>,
    lock_timeout: Option<Duration>,
    held: FxHashMap<i64, LockGuard>,
    pending: Vec<Arc<VersionRow<T>>>,
    status: TransactionStatus,
}

impl<T: Clone + Send + Sync + 'static> Transaction<T> {
    /// Begin a transaction
    ///
    /// `lock_timeout` bounds every lock wait inside this transaction;
    /// `None` blocks until the lock is free.
    pub fn begin(
        storage: Arc<dyn RowStorage<T>>,
        coordinator: Arc<LockCoordinator>,
        lock_timeout: Option<Duration>,
    ) -> Self {
        let id = NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed);
        debug!(target: "annal::txn", txn_id = id, "Transaction started");
        Self {
            id,
            storage,
            coordinator,
            lock_timeout,
            held: FxHashMap::default(),
            pending: Vec::new(),
            status: TransactionStatus::Active,
        }
    }

    /// Transaction id (process-unique; also the lock owner id)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current state
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Acquire the lock for `entity_id` for the rest of the transaction
    ///
    /// Re-locking an entity this transaction already holds returns
    /// immediately.
    ///
    /// # Errors
    ///
    /// - `Error::Deadlock` if the holder is, directly or through other
    ///   transactions, waiting for a lock this transaction holds
    /// - `Error::LockTimeout` if a timeout is configured and expires
    ///
    /// Either way the locks already held stay held; roll back to release
    /// them.
    pub fn lock(&mut self, entity_id: EntityId) -> Result<()> {
        let key = lock_key(entity_id);
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let guard = self.coordinator.acquire(entity_id, self.id, self.lock_timeout)?;
        self.held.insert(key, guard);
        Ok(())
    }

    /// Run `f` while holding the lock for `entity_id`
    ///
    /// The lock is not released when `f` returns; it is held until the
    /// transaction commits or rolls back.
    pub fn with_lock<R, F>(&mut self, entity_id: EntityId, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        self.lock(entity_id)?;
        f(self)
    }

    /// Whether this transaction holds the lock for `entity_id`
    pub fn holds_lock(&self, entity_id: EntityId) -> bool {
        self.held.contains_key(&lock_key(entity_id))
    }

    /// Latest row for an entity, including rows staged in this transaction
    pub fn latest(&self, entity_id: EntityId) -> Result<Option<Arc<VersionRow<T>>>> {
        if let Some(row) = self
            .pending
            .iter()
            .rev()
            .find(|r| r.entity_id() == entity_id)
        {
            return Ok(Some(Arc::clone(row)));
        }
        self.storage.latest(entity_id)
    }

    /// Full chain for an entity, including rows staged in this transaction
    pub fn chain(&self, entity_id: EntityId) -> Result<Vec<Arc<VersionRow<T>>>> {
        let mut rows = self.storage.chain(entity_id)?;
        rows.extend(
            self.pending
                .iter()
                .filter(|r| r.entity_id() == entity_id)
                .cloned(),
        );
        Ok(rows)
    }

    /// Buffer a row for commit
    ///
    /// Rows extending an existing chain must be staged under that entity's
    /// lock; the storage constraints reject anything else at commit.
    pub fn stage(&mut self, row: VersionRow<T>) -> Arc<VersionRow<T>> {
        debug_assert!(
            row.version().is_first() || self.holds_lock(row.entity_id()),
            "successor row staged without the entity lock"
        );
        let row = Arc::new(row);
        self.pending.push(Arc::clone(&row));
        row
    }

    /// Rows staged so far, in staging order
    pub fn pending(&self) -> &[Arc<VersionRow<T>>] {
        &self.pending
    }

    /// Append every staged row atomically, then release all locks
    ///
    /// # Errors
    ///
    /// Propagates the storage error (typically `Error::ChainConflict`); in
    /// that case nothing was written and the transaction is rolled back.
    pub fn commit(mut self) -> Result<Vec<Arc<VersionRow<T>>>> {
        let rows: Vec<VersionRow<T>> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|row| Arc::try_unwrap(row).unwrap_or_else(|shared| (*shared).clone()))
            .collect();
        let count = rows.len();

        let result = self.storage.append(rows);
        self.release();

        match &result {
            Ok(_) => {
                self.status = TransactionStatus::Committed;
                debug!(target: "annal::txn", txn_id = self.id, rows = count, "Transaction committed");
            }
            Err(e) => {
                self.status = TransactionStatus::RolledBack;
                debug!(target: "annal::txn", txn_id = self.id, error = %e, "Transaction aborted");
            }
        }
        result
    }

    /// Discard staged rows and release all locks
    pub fn rollback(mut self) {
        self.abort("rollback");
    }
}

impl<T> Transaction<T> {
    fn release(&mut self) {
        // Dropping a guard unlocks it
        self.held.clear();
    }

    fn abort(&mut self, reason: &str) {
        let discarded = self.pending.len();
        self.pending.clear();
        self.release();
        self.status = TransactionStatus::RolledBack;
        debug!(
            target: "annal::txn",
            txn_id = self.id,
            discarded,
            reason,
            "Transaction rolled back"
        );
    }
}

impl<T> Drop for Transaction<T> {
    fn drop(&mut self) {
        if self.status == TransactionStatus::Active {
            self.abort("dropped");
        }
    }
}

impl<T> fmt::Debug for Transaction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("locks", &self.held.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
