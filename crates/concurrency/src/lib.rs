//! Concurrency layer for Annal
//!
//! This crate implements the mutual-exclusion side of the version store:
//! - lock_key: SHA-256 reduction of an entity id to a 64-bit lock key
//! - LockCoordinator: per-key blocking locks with optional timeout
//! - Transaction: transaction-scoped locks plus buffered rows, committed
//!   atomically through `RowStorage::append`
//!
//! Writers of the same entity are totally ordered by lock acquisition.
//! Writers of different entities never touch the same lock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lock;
pub mod transaction;

pub use lock::{lock_key, LockCoordinator, LockGuard};
pub use transaction::{Transaction, TransactionStatus};
