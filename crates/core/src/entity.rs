//! Entity types stored in versioned tables
//!
//! Each entity kind is an ordinary struct holding only its domain fields.
//! The protected columns are added by `VersionRow<T>`, so an entity type
//! never declares `row_id`, `entity_id`, `version`, `valid_from`, or
//! `deleted_at` itself.
//!
//! ```
//! use annal_core::{Entity, ValidationErrors};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Account {
//!     name: String,
//!     balance: i64,
//! }
//!
//! impl Entity for Account {
//!     const TABLE: &'static str = "accounts";
//!
//!     fn validate(&self) -> Result<(), ValidationErrors> {
//!         let mut errs = ValidationErrors::new();
//!         if self.name.trim().is_empty() {
//!             errs.add("name", "must not be blank");
//!         }
//!         errs.into_result()
//!     }
//! }
//! ```

use crate::validation::ValidationErrors;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A domain payload that can live in a versioned table
///
/// The type must serialize to a JSON object whose keys are its field names;
/// change payloads are overlaid onto that object.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Logical table name, used in logs and association descriptors
    const TABLE: &'static str;

    /// Schema-level validation of a complete payload
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }

    /// Field names accepted in change payloads
    ///
    /// `None` means "whatever keys the serialized payload has". Override
    /// when some fields are skipped during serialization but must still be
    /// settable.
    fn known_fields() -> Option<&'static [&'static str]> {
        None
    }
}
