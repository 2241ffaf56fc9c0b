//! Injectable time source.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Seconds in one day.
pub const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as seconds since the Unix epoch.
    fn unix_now(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    secs: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `unix_secs`.
    #[must_use]
    pub fn new(unix_secs: i64) -> Self {
        Self {
            secs: AtomicI64::new(unix_secs),
        }
    }

    /// Moves the clock to `unix_secs`.
    pub fn set(&self, unix_secs: i64) {
        self.secs.store(unix_secs, Ordering::SeqCst);
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.secs.load(Ordering::SeqCst);
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    fn unix_now(&self) -> i64 {
        self.secs.load(Ordering::SeqCst)
    }
}
