//! Microsecond-precision timestamp type
//!
//! Used for `valid_from` and `deleted_at` on version rows. Stored as
//! microseconds since Unix epoch (1970-01-01 00:00:00 UTC), which gives
//! sub-millisecond resolution for ordering versions inside one chain.
//!
//! ```
//! use annal_core::Timestamp;
//!
//! let t = Timestamp::from_millis(1_500);
//! assert_eq!(t.as_micros(), 1_500_000);
//! assert_eq!(t.next_tick().as_micros(), 1_500_001);
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microsecond-precision timestamp
///
/// ## Invariants
///
/// - Always non-negative (u64 microseconds)
/// - Totally ordered; the zero timestamp is Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Maximum representable timestamp
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a timestamp for the current moment
    ///
    /// Returns epoch if the system clock is before Unix epoch.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as u64)
    }

    /// Create a timestamp from microseconds since epoch
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Create a timestamp from milliseconds since epoch
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1_000))
    }

    /// Create a timestamp from seconds since epoch
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// Microseconds since Unix epoch
    #[inline]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Milliseconds since Unix epoch (truncates)
    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000
    }

    /// The smallest timestamp strictly after this one
    ///
    /// Saturates at `Timestamp::MAX`.
    #[inline]
    pub const fn next_tick(&self) -> Self {
        Timestamp(self.0.saturating_add(1))
    }

    /// The largest timestamp strictly before this one
    ///
    /// Saturates at `Timestamp::EPOCH`.
    #[inline]
    pub const fn prev_tick(&self) -> Self {
        Timestamp(self.0.saturating_sub(1))
    }

    /// Convert to a `chrono` UTC datetime
    ///
    /// Returns `None` for values beyond chrono's representable range.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.0 / 1_000_000).ok()?;
        let nanos = ((self.0 % 1_000_000) * 1_000) as u32;
        Utc.timestamp_opt(secs, nanos).single()
    }

    /// Convert from a `chrono` datetime
    ///
    /// Instants before Unix epoch clamp to `Timestamp::EPOCH`.
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Timestamp(u64::try_from(dt.timestamp_micros()).unwrap_or(0))
    }

    /// Parse an RFC 3339 string (e.g. `2024-05-01T12:00:00.000001Z`)
    pub fn parse_rfc3339(s: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| Self::from_datetime(&dt))
    }

    /// Format as RFC 3339 with microsecond precision
    pub fn to_rfc3339(&self) -> String {
        match self.to_datetime() {
            Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            None => self.0.to_string(),
        }
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::from_datetime(&dt)
    }
}
