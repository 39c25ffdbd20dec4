//! Time sources for lock expiry.
//!
//! Every lock the bus hands out (message locks and session locks) is stamped
//! with an expiry read from a [`Clock`]. Expiry is evaluated lazily, whenever an
//! entity is next inspected, so swapping in a [`ManualClock`] lets tests drive
//! redelivery by advancing virtual time instead of sleeping.
//!
//! Receive timeouts are not governed by the clock: they run on tokio's timer,
//! which tests control with `tokio::time::pause`.

use crate::message::Timestamp;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;

/// Source of the current time for lock bookkeeping
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time
    fn now(&self) -> Timestamp;
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_datetime(Utc::now())
    }
}

/// Virtual clock that only moves when told to.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Create a clock frozen at the current wall-clock time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move time forward by `duration`
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = Timestamp::from_datetime(*now)
            .saturating_add(duration)
            .as_datetime();
    }

    /// Jump to an absolute time (may move backwards)
    pub fn set(&self, time: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_datetime(*self.now.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
