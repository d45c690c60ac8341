//! Version rows
//!
//! One physical row per version of one logical entity. The five protected
//! columns live in `RowMeta`, declared once; the domain payload is the
//! entity's own struct `T`.
//!
//! ```text
//! VersionRow<T>
//! ├── meta: RowMeta { row_id, entity_id, version, valid_from, deleted_at }
//! └── fields: T
//! ```
//!
//! Rows are immutable once written. A new state of the entity is expressed
//! by building a successor row with `VersionRow::successor`, never by
//! editing an existing one.

use super::{Timestamp, Version};
use crate::types::{EntityId, RowId};
use serde::{Deserialize, Serialize};

/// Names of the protected columns
///
/// Change payloads may never address these; the normalizer drops them.
pub const PROTECTED_FIELDS: [&str; 5] =
    ["row_id", "entity_id", "version", "valid_from", "deleted_at"];

/// Protected columns common to every versioned table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowMeta {
    /// Unique to this version row
    pub row_id: RowId,
    /// Shared by every version of the entity
    pub entity_id: EntityId,
    /// Position in the chain, starting at 1
    pub version: Version,
    /// When this version became active
    pub valid_from: Timestamp,
    /// Set on tombstone rows
    pub deleted_at: Option<Timestamp>,
}

impl RowMeta {
    /// Whether this row marks the entity deleted
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// One immutable version of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRow<T> {
    /// Protected columns
    pub meta: RowMeta,
    /// Domain payload, fully copied forward on every transition
    pub fields: T,
}

impl<T> VersionRow<T> {
    /// Build version 1 of a brand new entity
    pub fn first(fields: T, valid_from: Timestamp) -> Self {
        VersionRow {
            meta: RowMeta {
                row_id: RowId::new(),
                entity_id: EntityId::new(),
                version: Version::FIRST,
                valid_from,
                deleted_at: None,
            },
            fields,
        }
    }

    /// Build the row that follows this one in the chain
    ///
    /// Allocates a fresh `row_id`, keeps `entity_id`, and sets
    /// `version = self.version + 1`. A tombstone successor carries
    /// `deleted_at = valid_from`; an active successor clears it.
    pub fn successor(&self, fields: T, valid_from: Timestamp, tombstone: bool) -> VersionRow<T> {
        VersionRow {
            meta: RowMeta {
                row_id: RowId::new(),
                entity_id: self.meta.entity_id,
                version: self.meta.version.next(),
                valid_from,
                deleted_at: tombstone.then_some(valid_from),
            },
            fields,
        }
    }

    /// Identifier of this physical row
    #[inline]
    pub fn row_id(&self) -> RowId {
        self.meta.row_id
    }

    /// Identifier shared by the whole chain
    #[inline]
    pub fn entity_id(&self) -> EntityId {
        self.meta.entity_id
    }

    /// Position in the chain
    #[inline]
    pub fn version(&self) -> Version {
        self.meta.version
    }

    /// When this version became active
    #[inline]
    pub fn valid_from(&self) -> Timestamp {
        self.meta.valid_from
    }

    /// Tombstone marker, if any
    #[inline]
    pub fn deleted_at(&self) -> Option<Timestamp> {
        self.meta.deleted_at
    }

    /// Whether this row marks the entity deleted
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.meta.is_tombstone()
    }

    /// Domain payload
    #[inline]
    pub fn fields(&self) -> &T {
        &self.fields
    }

    /// Consume the row and return its payload
    #[inline]
    pub fn into_fields(self) -> T {
        self.fields
    }

    /// Map the payload to another type, keeping the protected columns
    pub fn map<U, F>(self, f: F) -> VersionRow<U>
    where
        F: FnOnce(T) -> U,
    {
        VersionRow {
            meta: self.meta,
            fields: f(self.fields),
        }
    }
}

/// Anything that identifies an entity
///
/// Mutation operations accept a handle rather than a bare id so callers can
/// pass the row they just read.
pub trait EntityRef {
    /// The entity this handle points at
    fn entity_id(&self) -> EntityId;
}

impl EntityRef for EntityId {
    fn entity_id(&self) -> EntityId {
        *self
    }
}

impl EntityRef for RowMeta {
    fn entity_id(&self) -> EntityId {
        self.entity_id
    }
}

impl<T> EntityRef for VersionRow<T> {
    fn entity_id(&self) -> EntityId {
        self.meta.entity_id
    }
}

impl<R: EntityRef + ?Sized> EntityRef for &R {
    fn entity_id(&self) -> EntityId {
        (**self).entity_id()
    }
}

impl<R: EntityRef + ?Sized> EntityRef for std::sync::Arc<R> {
    fn entity_id(&self) -> EntityId {
        (**self).entity_id()
    }
}
