//! Core types and traits for Annal
//!
//! This crate defines the foundational types used throughout the system:
//! - EntityId / RowId: UUID v7 identifiers for entities and version rows
//! - Version / Timestamp: chain position and microsecond time
//! - VersionRow<T> / RowMeta: one immutable version of an entity
//! - Entity: trait implemented by every domain payload
//! - Changes: normalized change payloads and overlay
//! - Validator / ValidationErrors: schema validation collaborator
//! - Clock: time source for `valid_from`
//! - Error: error type hierarchy
//! - RowStorage: backend trait for versioned tables

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod changes;
pub mod clock;
pub mod contract;
pub mod entity;
pub mod error;
pub mod traits;
pub mod types;
pub mod validation;

pub use changes::{canonical_key, Changes, DropReason, DroppedKey, Normalized};
pub use clock::{Clock, ManualClock, SystemClock};
pub use contract::row::PROTECTED_FIELDS;
pub use contract::{EntityRef, RowMeta, Timestamp, Version, VersionRow};
pub use entity::Entity;
pub use error::{Error, Result};
pub use traits::RowStorage;
pub use types::{EntityId, RowId};
pub use validation::{AcceptAll, FieldError, ValidationErrors, Validator};
