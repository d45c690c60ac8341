//! VersionStore: append-only version chains for one entity type
//!
//! ## State machine (per entity)
//!
//! ```text
//! Absent ──create──► Active(1)
//! Active(n) ──extend──► Active(n+1)
//! Active(n) ──tombstone──► Deleted(n+1)
//! Deleted(n) ──restore──► Active(n+1)
//! ```
//!
//! `tombstone` on a deleted entity and `restore` on an active one are
//! rejected. Every successful operation appends exactly one row and never
//! touches an existing one.
//!
//! ## API
//!
//! Each operation has a self-contained form (`extend`) that runs in its own
//! transaction, and an `_in` form (`extend_in`) that joins a caller's
//! transaction so several mutations commit together:
//!
//! ```rust,ignore
//! store.transaction(|txn| {
//!     store.extend_in(txn, &from, Changes::new().set("balance", 90))?;
//!     store.extend_in(txn, &to, Changes::new().set("balance", 110))
//! })?;
//! ```
//!
//! ## Version allocation
//!
//! `extend`, `tombstone` and `restore` take the entity lock, re-read the
//! latest row under it, and stage `latest.version + 1`. The lock is held
//! until the transaction ends, so the next writer reads the row this one
//! appended. `create` allocates a fresh entity and takes no lock.
//!
//! `valid_from` is `max(now, latest.valid_from + 1µs)`, strictly increasing
//! along a chain even if the clock stalls or steps back.

use crate::config::StoreConfig;
use crate::query::Lookup;
use crate::resolver::QueryResolver;
use annal_concurrency::{LockCoordinator, Transaction};
use annal_core::changes::to_object;
use annal_core::{
    AcceptAll, Changes, Clock, DroppedKey, Entity, EntityId, EntityRef, Error, Result, RowStorage,
    SystemClock, Timestamp, ValidationErrors, Validator, VersionRow,
};
use annal_storage::VersionTable;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Mutation operation, for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Create,
    Extend,
    Tombstone,
    Restore,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Create => "create",
            Op::Extend => "extend",
            Op::Tombstone => "tombstone",
            Op::Restore => "restore",
        })
    }
}

/// Versioned entity store
///
/// Cheap to clone; clones share storage, locks and configuration.
pub struct VersionStore<T: Entity> {
    storage: Arc<dyn RowStorage<T>>,
    locks: Arc<LockCoordinator>,
    clock: Arc<dyn Clock>,
    validator: Arc<dyn Validator<T>>,
    config: StoreConfig,
}

impl<T: Entity> VersionStore<T> {
    /// Store over existing storage with default configuration
    pub fn new(storage: Arc<dyn RowStorage<T>>) -> Self {
        Self {
            storage,
            locks: Arc::new(LockCoordinator::new()),
            clock: Arc::new(SystemClock),
            validator: Arc::new(AcceptAll),
            config: StoreConfig::default(),
        }
    }

    /// Store over a fresh in-memory table named `T::TABLE`
    pub fn in_memory() -> Self {
        Self::new(Arc::new(VersionTable::<T>::new(T::TABLE)))
    }

    /// Replace the configuration
    ///
    /// # Errors
    ///
    /// `Error::Config` if `config` fails `StoreConfig::validate`.
    pub fn with_config(mut self, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Load configuration from `path`, writing the default file first if
    /// none exists
    ///
    /// # Errors
    ///
    /// `Error::Io` if the file cannot be written or read, `Error::Config`
    /// if its contents are invalid.
    pub fn with_config_file(self, path: &Path) -> Result<Self> {
        StoreConfig::write_default_if_missing(path)?;
        let config = StoreConfig::from_file(path)?;
        self.with_config(config)
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install a validator that runs after `Entity::validate`
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Validator<T> + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    /// Share a lock coordinator with other stores
    pub fn with_lock_coordinator(mut self, locks: Arc<LockCoordinator>) -> Self {
        self.locks = locks;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Underlying row storage
    pub fn storage(&self) -> &Arc<dyn RowStorage<T>> {
        &self.storage
    }

    /// Lock coordinator used by this store
    pub fn lock_coordinator(&self) -> &Arc<LockCoordinator> {
        &self.locks
    }

    /// Query factory over this store's rows
    pub fn resolver(&self) -> QueryResolver<T> {
        QueryResolver::new(Arc::clone(&self.storage))
    }

    /// Tri-state lookup of one entity (see `QueryResolver::fetch_current`)
    pub fn fetch_current(&self, entity: impl EntityRef) -> Result<Lookup<T>> {
        self.resolver().fetch_current(entity)
    }

    // ========== Transactions ==========

    /// Begin a transaction that uses this store's locks and lock timeout
    pub fn begin(&self) -> Transaction<T> {
        Transaction::begin(
            Arc::clone(&self.storage),
            Arc::clone(&self.locks),
            self.config.lock_timeout(),
        )
    }

    /// Run `f` in a transaction
    ///
    /// Commits if `f` returns `Ok`, rolls back if it returns `Err`. Locks
    /// taken inside are released when the transaction ends either way.
    ///
    /// # Errors
    ///
    /// The error returned by `f`, or the commit error.
    pub fn transaction<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<T>) -> Result<R>,
    {
        let mut txn = self.begin();
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.rollback();
                Err(e)
            }
        }
    }

    // ========== Create ==========

    /// Start a new entity at version 1
    ///
    /// # Errors
    ///
    /// `Error::Validation` if `payload` fails validation.
    pub fn create(&self, payload: T) -> Result<Arc<VersionRow<T>>> {
        self.transaction(|txn| self.create_in(txn, payload))
    }

    /// `create` inside a caller's transaction
    pub fn create_in(&self, txn: &mut Transaction<T>, payload: T) -> Result<Arc<VersionRow<T>>> {
        let fields = self.check(payload)?;
        let row = txn.stage(VersionRow::first(fields, self.clock.now()));
        self.log_applied(Op::Create, &row);
        Ok(row)
    }

    /// Start a new entity from an untrusted field map
    ///
    /// Keys are normalized like change payloads (protected and, when the
    /// entity declares `known_fields`, unknown keys are dropped one by
    /// one); the rest must deserialize into a complete `T`.
    ///
    /// # Errors
    ///
    /// `Error::Validation` if the remaining fields do not form a valid `T`.
    pub fn create_from(&self, fields: Changes) -> Result<Arc<VersionRow<T>>> {
        let normalized = match T::known_fields() {
            Some(known) => fields.normalize(|k| known.contains(&k)),
            None => fields.normalize(|_| true),
        };
        self.log_dropped(None, &normalized.dropped);

        let object = serde_json::to_value(&normalized.changes)?;
        let payload: T = serde_json::from_value(object).map_err(|e| {
            Error::Validation(ValidationErrors::single("_payload", e.to_string()))
        })?;
        self.create(payload)
    }

    // ========== Extend ==========

    /// Append a version with `changes` overlaid on the latest fields
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if the entity has no rows
    /// - `Error::Deleted` if the latest row is a tombstone
    /// - `Error::Validation` if the resulting payload is invalid
    pub fn extend(&self, entity: impl EntityRef, changes: Changes) -> Result<Arc<VersionRow<T>>> {
        self.transaction(|txn| self.extend_in(txn, entity, changes))
    }

    /// `extend` inside a caller's transaction
    pub fn extend_in(
        &self,
        txn: &mut Transaction<T>,
        entity: impl EntityRef,
        changes: Changes,
    ) -> Result<Arc<VersionRow<T>>> {
        let entity_id = entity.entity_id();
        txn.with_lock(entity_id, |txn| {
            let latest = active_latest(txn, entity_id)?;
            let changes = self.normalize(&latest, changes)?;
            let fields = self.check(changes.apply_to(latest.fields())?)?;
            let row = latest.successor(fields, self.next_valid_from(&latest), false);
            Ok(txn.stage(row))
        })
        .map(|row| {
            self.log_applied(Op::Extend, &row);
            row
        })
    }

    /// Append a version produced by editing a copy of the latest payload
    ///
    /// The typed counterpart of `extend`: `edit` receives the latest fields
    /// and mutates them in place. Same errors as `extend`.
    pub fn extend_with<F>(&self, entity: impl EntityRef, edit: F) -> Result<Arc<VersionRow<T>>>
    where
        F: FnOnce(&mut T),
    {
        let entity_id = entity.entity_id();
        self.transaction(|txn| {
            txn.with_lock(entity_id, |txn| {
                let latest = active_latest(txn, entity_id)?;
                let mut fields = latest.fields().clone();
                edit(&mut fields);
                let fields = self.check(fields)?;
                let row = latest.successor(fields, self.next_valid_from(&latest), false);
                Ok(txn.stage(row))
            })
        })
        .map(|row| {
            self.log_applied(Op::Extend, &row);
            row
        })
    }

    // ========== Tombstone / Restore ==========

    /// Mark the entity deleted by appending a tombstone
    ///
    /// The tombstone carries every field of the latest row.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if the entity has no rows
    /// - `Error::Deleted` if it is already deleted
    pub fn tombstone(&self, entity: impl EntityRef) -> Result<Arc<VersionRow<T>>> {
        self.transaction(|txn| self.tombstone_in(txn, entity))
    }

    /// `tombstone` inside a caller's transaction
    pub fn tombstone_in(
        &self,
        txn: &mut Transaction<T>,
        entity: impl EntityRef,
    ) -> Result<Arc<VersionRow<T>>> {
        let entity_id = entity.entity_id();
        txn.with_lock(entity_id, |txn| {
            let latest = active_latest(txn, entity_id)?;
            let row = latest.successor(
                latest.fields().clone(),
                self.next_valid_from(&latest),
                true,
            );
            Ok(txn.stage(row))
        })
        .map(|row| {
            self.log_applied(Op::Tombstone, &row);
            row
        })
    }

    /// Reactivate a deleted entity, optionally overlaying `changes`
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if the entity has no rows
    /// - `Error::NotDeleted` if the latest row is not a tombstone
    /// - `Error::Validation` if the restored payload is invalid
    pub fn restore(
        &self,
        entity: impl EntityRef,
        changes: Option<Changes>,
    ) -> Result<Arc<VersionRow<T>>> {
        self.transaction(|txn| self.restore_in(txn, entity, changes))
    }

    /// `restore` inside a caller's transaction
    pub fn restore_in(
        &self,
        txn: &mut Transaction<T>,
        entity: impl EntityRef,
        changes: Option<Changes>,
    ) -> Result<Arc<VersionRow<T>>> {
        let entity_id = entity.entity_id();
        txn.with_lock(entity_id, |txn| {
            let latest = txn
                .latest(entity_id)?
                .ok_or(Error::NotFound { entity_id })?;
            if !latest.is_tombstone() {
                return Err(Error::NotDeleted { entity_id });
            }

            let fields = match changes {
                Some(changes) => self.normalize(&latest, changes)?.apply_to(latest.fields())?,
                None => latest.fields().clone(),
            };
            let fields = self.check(fields)?;
            let row = latest.successor(fields, self.next_valid_from(&latest), false);
            Ok(txn.stage(row))
        })
        .map(|row| {
            self.log_applied(Op::Restore, &row);
            row
        })
    }

    // ========== Helpers ==========

    /// Entity-level then collaborator validation
    ///
    /// Both run so the caller sees every field error at once.
    fn check(&self, candidate: T) -> Result<T> {
        let mut errs = candidate.validate().err().unwrap_or_default();
        match self.validator.validate(candidate) {
            Ok(valid) if errs.is_empty() => Ok(valid),
            Ok(_) => Err(Error::Validation(errs)),
            Err(more) => {
                errs.extend(more);
                Err(Error::Validation(errs))
            }
        }
    }

    fn next_valid_from(&self, latest: &VersionRow<T>) -> Timestamp {
        self.clock.now().max(latest.valid_from().next_tick())
    }

    /// Normalize change keys against the fields `T` accepts
    fn normalize(&self, latest: &VersionRow<T>, changes: Changes) -> Result<Changes> {
        let normalized = match T::known_fields() {
            Some(known) => changes.normalize(|k| known.contains(&k)),
            None => {
                let object = to_object(latest.fields())?;
                changes.normalize(|k| object.contains_key(k))
            }
        };
        self.log_dropped(Some(latest.entity_id()), &normalized.dropped);
        Ok(normalized.changes)
    }

    fn log_dropped(&self, entity_id: Option<EntityId>, dropped: &[DroppedKey]) {
        if !self.config.log_dropped_keys {
            return;
        }
        for key in dropped {
            warn!(
                target: "annal::store",
                table = T::TABLE,
                entity_id = ?entity_id,
                key = %key.key,
                reason = %key.reason,
                "Dropped change key"
            );
        }
    }

    fn log_applied(&self, op: Op, row: &VersionRow<T>) {
        debug!(
            target: "annal::store",
            table = T::TABLE,
            op = %op,
            entity_id = %row.entity_id(),
            version = row.version().as_u64(),
            valid_from = row.valid_from().as_micros(),
            "Version staged"
        );
    }
}

/// Latest row, required to exist and not be a tombstone
fn active_latest<T: Entity>(
    txn: &Transaction<T>,
    entity_id: EntityId,
) -> Result<Arc<VersionRow<T>>> {
    let latest = txn
        .latest(entity_id)?
        .ok_or(Error::NotFound { entity_id })?;
    if latest.is_tombstone() {
        return Err(Error::Deleted { entity_id });
    }
    Ok(latest)
}

impl<T: Entity> Clone for VersionStore<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            locks: Arc::clone(&self.locks),
            clock: Arc::clone(&self.clock),
            validator: Arc::clone(&self.validator),
            config: self.config.clone(),
        }
    }
}

impl<T: Entity> fmt::Debug for VersionStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionStore")
            .field("table", &T::TABLE)
            .field("rows", &self.storage.len())
            .field("locks", &self.locks)
            .field("config", &self.config)
            .finish()
    }
}

