//! Time sources for `valid_from`
//!
//! The store never reads the system clock directly; it asks a `Clock`.
//! Production code uses `SystemClock`. Tests use `ManualClock` to place
//! versions at exact instants and check temporal boundaries.

use crate::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Source of the current time
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> Timestamp;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually driven clock
///
/// Time only moves when `set` or `advance` is called.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    /// Clock frozen at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            micros: AtomicU64::new(start.as_micros()),
        }
    }

    /// Jump to an instant (may move backwards)
    pub fn set(&self, at: Timestamp) {
        self.micros.store(at.as_micros(), Ordering::SeqCst);
    }

    /// Move forward by `by`, returning the new instant
    pub fn advance(&self, by: Duration) -> Timestamp {
        let delta = by.as_micros() as u64;
        let prev = self.micros.fetch_add(delta, Ordering::SeqCst);
        Timestamp::from_micros(prev.saturating_add(delta))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_only_moves_when_told() {
        let clock = ManualClock::new(Timestamp::from_secs(10));
        assert_eq!(clock.now(), Timestamp::from_secs(10));
        assert_eq!(clock.now(), Timestamp::from_secs(10));

        let t = clock.advance(Duration::from_millis(5));
        assert_eq!(t, Timestamp::from_micros(10_005_000));
        assert_eq!(clock.now(), t);

        clock.set(Timestamp::from_secs(1));
        assert_eq!(clock.now(), Timestamp::from_secs(1));
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now() > Timestamp::EPOCH);
    }
}
