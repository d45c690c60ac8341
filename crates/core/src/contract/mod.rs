//! Contract types shared by every layer
//!
//! - `timestamp`: microsecond timestamps for `valid_from` / `deleted_at`
//! - `version`: the per-entity, one-based version counter
//! - `row`: the version row itself (`RowMeta` + domain fields)

pub mod row;
pub mod timestamp;
pub mod version;

pub use row::{EntityRef, RowMeta, VersionRow};
pub use timestamp::Timestamp;
pub use version::Version;
