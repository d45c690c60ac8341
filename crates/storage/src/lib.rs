//! Storage layer for Annal
//!
//! This crate implements the in-memory backend for versioned tables:
//! - VersionTable: append-only heap of version rows behind one RwLock
//! - ChainIndex: per-entity `(entity_id, version)` index into the heap
//!
//! `VersionTable` implements `annal_core::RowStorage`, which is all the
//! upper layers (concurrency, engine) depend on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod table;

pub use chain::ChainIndex;
pub use table::VersionTable;
