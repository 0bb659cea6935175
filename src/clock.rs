//! Injectable wall-clock time source.
//!
//! All "now" reads in the crate go through a [`Clock`] carried in schedule
//! options, so tests can substitute a fixed or manually advanced clock
//! instead of rebinding process-wide state.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// A wall-clock time source with millisecond resolution.
///
/// The zone only affects how zoned outputs (e.g. cron timestamps,
/// [`ScheduleHandle::current_at`](crate::ScheduleHandle::current_at)) are
/// rendered; scheduling arithmetic is done on UTC instants.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;

    /// The zone zoned outputs are rendered in.
    fn zone(&self) -> Tz {
        Tz::UTC
    }
}

/// The process wall clock, optionally pinned to a display zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    zone: Tz,
}

impl SystemClock {
    /// Create a system clock rendering in UTC.
    pub fn new() -> Self {
        Self { zone: Tz::UTC }
    }

    /// Create a system clock rendering in the given zone.
    pub fn in_zone(zone: Tz) -> Self {
        Self { zone }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn zone(&self) -> Tz {
        self.zone
    }
}

/// A manually driven clock for tests.
///
/// Starts at a fixed instant and only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    zone: Tz,
}

impl ManualClock {
    /// Create a manual clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            zone: Tz::UTC,
        }
    }

    /// Create a manual clock frozen at `start`, rendering in `zone`.
    pub fn in_zone(start: DateTime<Utc>, zone: Tz) -> Self {
        Self {
            now: Mutex::new(start),
            zone,
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += delta;
    }

    /// Set the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }

    fn zone(&self) -> Tz {
        self.zone
    }
}
