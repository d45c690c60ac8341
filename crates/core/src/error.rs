//! Error types for the version store
//!
//! We use `thiserror` for automatic `Display` and `Error` implementations.
//!
//! | Category | Variants | Meaning |
//! |----------|----------|---------|
//! | Chain state | `NotFound`, `Deleted`, `NotDeleted` | Invalid transition for the entity's current state |
//! | Payload | `Validation` | Field-level schema errors |
//! | Storage | `ChainConflict` | Unique/contiguity constraint rejected an append |
//! | Locking | `LockTimeout`, `Deadlock` | Lock wait timed out, or would never end |
//! | System | `Serialization`, `Config`, `Io` | Infrastructure errors |
//!
//! Chain-state and payload errors are business outcomes: they are returned
//! to the immediate caller and never retried.

use crate::types::EntityId;
use crate::validation::ValidationErrors;
use crate::Version;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for every layer of the store
#[derive(Debug, Error)]
pub enum Error {
    /// No version rows exist for the entity
    #[error("entity not found: {entity_id}")]
    NotFound {
        /// Entity that was looked up
        entity_id: EntityId,
    },

    /// The entity's latest row is a tombstone
    #[error("entity is deleted: {entity_id}")]
    Deleted {
        /// Entity that was looked up
        entity_id: EntityId,
    },

    /// `restore` on an entity whose latest row is active
    #[error("entity is not deleted: {entity_id}")]
    NotDeleted {
        /// Entity that was looked up
        entity_id: EntityId,
    },

    /// Payload failed schema validation
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// An append would duplicate `(entity_id, version)`, leave a gap, or reuse a row id
    #[error("version chain conflict for {entity_id}: expected {expected}, got {actual}")]
    ChainConflict {
        /// Entity whose chain rejected the row
        entity_id: EntityId,
        /// Version the chain would accept next
        expected: Version,
        /// Version carried by the rejected row
        actual: Version,
    },

    /// Lock acquisition exceeded the configured timeout
    #[error("timed out after {waited:?} waiting for lock on {entity_id}")]
    LockTimeout {
        /// Entity whose lock was contended
        entity_id: EntityId,
        /// How long the caller waited
        waited: Duration,
    },

    /// Waiting for the lock would close a cycle of transactions each
    /// waiting on the next
    ///
    /// The transaction that detects the cycle gets this error; the others
    /// keep waiting and proceed once it rolls back.
    #[error("deadlock detected waiting for lock on {entity_id}")]
    Deadlock {
        /// Entity whose lock was requested
        entity_id: EntityId,
    },

    /// Payload could not be converted to or from its serialized form
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this is `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether this is `Deleted`
    pub fn is_deleted(&self) -> bool {
        matches!(self, Error::Deleted { .. })
    }

    /// Whether this is `NotDeleted`
    pub fn is_not_deleted(&self) -> bool {
        matches!(self, Error::NotDeleted { .. })
    }

    /// Whether this is `LockTimeout` or `Deadlock`
    ///
    /// Either way the lock was not taken; roll back and retry.
    pub fn is_lock_failure(&self) -> bool {
        matches!(self, Error::LockTimeout { .. } | Error::Deadlock { .. })
    }

    /// Whether this is a validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Field errors, if this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Error::Validation(errs) => Some(errs),
            _ => None,
        }
    }

    /// Entity the error refers to, when there is one
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            Error::NotFound { entity_id }
            | Error::Deleted { entity_id }
            | Error::NotDeleted { entity_id }
            | Error::ChainConflict { entity_id, .. }
            | Error::LockTimeout { entity_id, .. }
            | Error::Deadlock { entity_id } => Some(*entity_id),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for Error {
    fn from(errs: ValidationErrors) -> Self {
        Error::Validation(errs)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_state_errors_are_distinguishable() {
        let id = EntityId::new();
        let not_found = Error::NotFound { entity_id: id };
        let deleted = Error::Deleted { entity_id: id };
        let not_deleted = Error::NotDeleted { entity_id: id };

        assert!(not_found.is_not_found() && !not_found.is_deleted());
        assert!(deleted.is_deleted() && !deleted.is_not_found());
        assert!(not_deleted.is_not_deleted());
        assert_eq!(deleted.entity_id(), Some(id));
    }

    #[test]
    fn test_error_display_not_found() {
        let id = EntityId::new();
        let msg = Error::NotFound { entity_id: id }.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains(&id.to_string()));
    }

    #[test]
    fn test_validation_error_carries_fields() {
        let err: Error = ValidationErrors::single("name", "required").into();
        assert!(err.is_validation());
        assert!(err.validation_errors().unwrap().has_field("name"));
        assert!(err.to_string().contains("name: required"));
        assert_eq!(err.entity_id(), None);
    }

    #[test]
    fn test_error_display_chain_conflict() {
        let err = Error::ChainConflict {
            entity_id: EntityId::new(),
            expected: Version::FIRST.next(),
            actual: Version::FIRST,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected v2"));
        assert!(msg.contains("got v1"));
    }

    #[test]
    fn test_deadlock_is_lock_failure() {
        let id = EntityId::new();
        let err = Error::Deadlock { entity_id: id };
        assert!(err.is_lock_failure());
        assert_eq!(err.entity_id(), Some(id));
        assert!(err.to_string().contains("deadlock"));
        assert!(!Error::NotFound { entity_id: id }.is_lock_failure());
    }

    #[test]
    fn test_error_from_io() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad: std::result::Result<u32, _> = serde_json::from_str("\"x\"");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
