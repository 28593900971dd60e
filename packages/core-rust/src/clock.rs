//! Wall-clock sources for record timestamps.
//!
//! All record timestamps are milliseconds since the Unix epoch as `i64`.
//! The partition execution context hands a [`ClockSource`] to each record
//! store so that tests can drive time explicitly with a [`ManualClock`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over the system clock for dependency injection.
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now(&self) -> i64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    // Millisecond timestamps fit comfortably in i64 until the year 292 million.
    #[allow(clippy::cast_possible_truncation)]
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// A clock whose time only moves when told to.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock reading `initial`.
    #[must_use]
    pub fn new(initial: i64) -> Self {
        Self {
            time: Arc::new(AtomicI64::new(initial)),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: i64) {
        self.time.store(now, Ordering::Relaxed);
    }

    /// Moves the clock forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.time.fetch_add(millis, Ordering::Relaxed);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> i64 {
        self.time.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800_000);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1000);
        let handle = clock.clone();
        handle.advance(500);
        assert_eq!(clock.now(), 1500);
        clock.set(42);
        assert_eq!(handle.now(), 42);
    }
}
