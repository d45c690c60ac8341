//! Annal - append-only versioned entity store
//!
//! Every write to an entity appends a new immutable version row; nothing is
//! ever updated in place. The full history of each entity stays queryable,
//! including what it looked like at any past instant.
//!
//! # Quick Start
//!
//! ```ignore
//! use annal::{Changes, Entity, VersionStore};
//!
//! #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! struct Account { name: String }
//!
//! impl Entity for Account {
//!     const TABLE: &'static str = "accounts";
//! }
//!
//! let store = VersionStore::<Account>::in_memory();
//! let v1 = store.create(Account { name: "X".into() })?;
//! let v2 = store.extend(&v1, Changes::new().set("name", "Y"))?;
//! store.tombstone(&v2)?;
//!
//! let history = store.resolver().history(&v1).fetch()?;
//! assert_eq!(history.len(), 3);
//! ```
//!
//! # Architecture
//!
//! - `annal-core`: ids, rows, errors, change payloads, validation
//! - `annal-storage`: in-memory `VersionTable` enforcing chain integrity
//! - `annal-concurrency`: per-entity advisory locks and transactions
//! - `annal-engine`: `VersionStore`, queries, config, associations

pub use annal_concurrency::{lock_key, LockCoordinator, LockGuard, Transaction, TransactionStatus};
pub use annal_core::*;
pub use annal_engine::{
    AssociationDescriptor, AssociationRegistry, Lookup, Preloaded, Query, QueryResolver, Source,
    StoreConfig, VersionStore, CONFIG_FILE_NAME,
};
pub use annal_storage::{ChainIndex, VersionTable};
