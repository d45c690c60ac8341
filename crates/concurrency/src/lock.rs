//! Per-entity mutual exclusion
//!
//! Every mutation of an existing chain follows "read latest, append
//! latest + 1". Two writers doing that concurrently for the same entity
//! would both compute the same next version, so the store serializes them
//! on a lock keyed by the entity.
//!
//! ## Lock keys
//!
//! Entity ids are 128-bit UUIDs; the lock table is keyed by `i64`, the
//! native key space of transaction-scoped advisory locks in relational
//! engines. `lock_key` reduces an id to that space with SHA-256.
//!
//! ## Lifecycle
//!
//! ```text
//! acquire(entity, owner) ──► entry(key) ──► clone Arc<Mutex> ──► try lock
//!                                                                  │ busy
//!                                     cycle? ◄── walk wait-for graph ◄┘
//!                                       │ yes ──► Error::Deadlock
//!                                       │ no  ──► block (or time out)
//! LockGuard dropped ◄───────────────────┘
//!        │
//!        └──► unlock ──► remove entry if nobody else holds or waits
//! ```
//!
//! Locks for different keys never contend. The table only contains
//! entries for keys that are held or awaited.
//!
//! ## Deadlock detection
//!
//! Every acquisition names an owner (a transaction id). The coordinator
//! records which owner holds each key and which key each blocked owner is
//! waiting for. Before blocking, `acquire` follows the chain
//! `key -> holder -> key it waits for -> holder ...`; if the chain leads
//! back to the caller, blocking would never end, so the caller gets
//! `Error::Deadlock` instead and the other owners in the cycle keep
//! waiting. An owner must only be used from one thread at a time.

use annal_core::{EntityId, Error, Result};
use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Reduce an entity id to a 64-bit lock key
///
/// Takes the first eight bytes (big-endian) of SHA-256 over the sixteen
/// bytes of the UUID. The mapping is deterministic across processes.
///
/// # Collisions
///
/// Two distinct entities share a key with probability about 2^-64 per
/// pair. A collision only makes those two entities serialize against each
/// other; it can never let two writers of the same entity run together,
/// so version numbering stays correct either way.
pub fn lock_key(entity_id: EntityId) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(entity_id.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(prefix)
}

/// Who holds which key, and who is blocked on which key
#[derive(Default)]
struct WaitGraph {
    holders: FxHashMap<i64, u64>,
    waiting: FxHashMap<u64, i64>,
}

impl WaitGraph {
    /// Whether `owner` waiting for `key` would close a cycle
    fn closes_cycle(&self, owner: u64, key: i64) -> bool {
        let mut next = key;
        // Each step consumes one waiter, so the walk is bounded
        for _ in 0..=self.waiting.len() {
            let Some(&holder) = self.holders.get(&next) else {
                return false;
            };
            if holder == owner {
                return true;
            }
            match self.waiting.get(&holder) {
                Some(&key) => next = key,
                None => return false,
            }
        }
        false
    }
}

/// Table of per-key mutexes
///
/// Shared by every transaction of a store (`Arc<LockCoordinator>`).
#[derive(Default)]
pub struct LockCoordinator {
    locks: DashMap<i64, Arc<Mutex<()>>>,
    graph: Mutex<WaitGraph>,
}

impl LockCoordinator {
    /// Create an empty coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock for `entity_id` is held by `owner`
    ///
    /// With `timeout = None` this waits until the holder lets go. The lock
    /// is released when the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// - `Error::Deadlock` if waiting would close a cycle through `owner`
    /// - `Error::LockTimeout` if `timeout` expires first
    pub fn acquire(
        self: &Arc<Self>,
        entity_id: EntityId,
        owner: u64,
        timeout: Option<Duration>,
    ) -> Result<LockGuard> {
        let key = lock_key(entity_id);
        let mutex = self.mutex_for(key);
        let started = Instant::now();

        if let Some(guard) = mutex.try_lock_arc() {
            return Ok(self.granted(entity_id, key, owner, guard, started));
        }

        {
            let mut graph = self.graph.lock();
            if graph.closes_cycle(owner, key) {
                drop(graph);
                drop(mutex);
                self.cleanup(key);
                warn!(
                    target: "annal::lock",
                    entity_id = %entity_id,
                    key,
                    owner,
                    "Deadlock detected"
                );
                return Err(Error::Deadlock { entity_id });
            }
            graph.waiting.insert(owner, key);
        }

        // The graph mutex is never held while blocking here
        let acquired = match timeout {
            None => Some(mutex.lock_arc()),
            Some(limit) => mutex.try_lock_arc_for(limit),
        };

        match acquired {
            Some(guard) => Ok(self.granted(entity_id, key, owner, guard, started)),
            None => {
                self.graph.lock().waiting.remove(&owner);
                drop(mutex);
                self.cleanup(key);
                let waited = started.elapsed();
                warn!(
                    target: "annal::lock",
                    entity_id = %entity_id,
                    key,
                    waited_ms = waited.as_millis() as u64,
                    "Lock wait timed out"
                );
                Err(Error::LockTimeout { entity_id, waited })
            }
        }
    }

    /// Try to take the lock for `owner` without blocking
    ///
    /// Returns `None` if another guard currently holds the key.
    pub fn try_acquire(self: &Arc<Self>, entity_id: EntityId, owner: u64) -> Option<LockGuard> {
        let key = lock_key(entity_id);
        let mutex = self.mutex_for(key);

        match mutex.try_lock_arc() {
            Some(guard) => Some(self.granted(entity_id, key, owner, guard, Instant::now())),
            None => {
                drop(mutex);
                self.cleanup(key);
                None
            }
        }
    }

    /// Whether the lock for `entity_id` is currently held by anyone
    pub fn is_locked(&self, entity_id: EntityId) -> bool {
        self.locks
            .get(&lock_key(entity_id))
            .map(|m| m.is_locked())
            .unwrap_or(false)
    }

    /// Number of keys currently held or awaited
    pub fn active_keys(&self) -> usize {
        self.locks.len()
    }

    /// Number of owners currently blocked in `acquire`
    pub fn waiting_owners(&self) -> usize {
        self.graph.lock().waiting.len()
    }

    /// Clone the mutex for `key` out of the table, creating it if needed
    ///
    /// The shard lock is released before the caller blocks on the mutex.
    fn mutex_for(&self, key: i64) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn granted(
        self: &Arc<Self>,
        entity_id: EntityId,
        key: i64,
        owner: u64,
        guard: ArcMutexGuard<RawMutex, ()>,
        started: Instant,
    ) -> LockGuard {
        {
            let mut graph = self.graph.lock();
            graph.waiting.remove(&owner);
            graph.holders.insert(key, owner);
        }
        trace!(
            target: "annal::lock",
            entity_id = %entity_id,
            key,
            owner,
            waited_us = started.elapsed().as_micros() as u64,
            "Lock acquired"
        );
        LockGuard {
            coordinator: Arc::clone(self),
            entity_id,
            key,
            owner,
            guard: Some(guard),
        }
    }

    /// Drop the entry for `key` if the map holds the only reference
    ///
    /// `remove_if` runs under the shard's write lock, the same lock
    /// `acquire` needs to clone the mutex out, so a count of one means no
    /// guard and no waiter exists.
    fn cleanup(&self, key: i64) {
        self.locks.remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("active_keys", &self.locks.len())
            .field("waiting_owners", &self.waiting_owners())
            .finish()
    }
}

/// A held entity lock
///
/// Unlocks on drop and removes the table entry once unused.
pub struct LockGuard {
    coordinator: Arc<LockCoordinator>,
    entity_id: EntityId,
    key: i64,
    owner: u64,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl LockGuard {
    /// Entity this guard was acquired for
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Lock key (see `lock_key`)
    pub fn key(&self) -> i64 {
        self.key
    }

    /// Owner the lock was acquired for
    pub fn owner(&self) -> u64 {
        self.owner
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Forget the holder before unlocking, so a new holder's record is
        // never removed by this guard
        {
            let mut graph = self.coordinator.graph.lock();
            if graph.holders.get(&self.key) == Some(&self.owner) {
                graph.holders.remove(&self.key);
            }
        }
        // The guard owns one reference to the mutex
        self.guard.take();
        self.coordinator.cleanup(self.key);
        trace!(
            target: "annal::lock",
            entity_id = %self.entity_id,
            key = self.key,
            "Lock released"
        );
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("entity_id", &self.entity_id)
            .field("key", &self.key)
            .field("owner", &self.owner)
            .finish()
    }
}
