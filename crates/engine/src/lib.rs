//! Versioned entity engine for Annal
//!
//! This crate orchestrates the lower layers:
//! - VersionStore: create / extend / tombstone / restore over a version chain
//! - QueryResolver and Query: current, history, as-of and audit projections
//! - StoreConfig: `annal.toml` settings (lock timeout, dropped-key logging)
//! - AssociationRegistry: named foreign references and batched preload
//!
//! The engine is the only component that knows about:
//! - Combining entity locks with buffered appends into one transaction
//! - Key normalization and validation before a row is staged
//! - Assigning `valid_from`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod association;
pub mod config;
pub mod query;
pub mod resolver;
pub mod store;

pub use association::{AssociationDescriptor, AssociationRegistry, Preloaded};
pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use query::{Lookup, Query, Source};
pub use resolver::QueryResolver;
pub use store::VersionStore;
