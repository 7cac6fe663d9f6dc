//! Time sources
//!
//! The controller never reads the wall clock directly; it asks a [`Clock`].
//! Production code uses [`SystemClock`], tests and replay use [`ManualClock`].

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Source of "now" for time-dependent computations
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock that only moves forward
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock to `at`; earlier instants are ignored
    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if at > *now {
            *now = at;
        }
    }

    /// Advance the clock by a number of seconds
    pub fn advance(&self, seconds: f64) {
        if seconds <= 0.0 {
            return;
        }
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = crate::types::add_seconds(*now, seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_only_moves_forward() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 21, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        clock.advance(1.5);
        assert_eq!(clock.now(), start + chrono::Duration::milliseconds(1500));

        clock.set(start);
        assert_eq!(clock.now(), start + chrono::Duration::milliseconds(1500));

        clock.advance(-10.0);
        assert_eq!(clock.now(), start + chrono::Duration::milliseconds(1500));
    }
}
