//! Clock abstraction for determinism.

use chrono::{DateTime, Utc};

/// Source of event timestamps.
///
/// Handlers receive the clock as an argument so that, given a fixed clock,
/// the events they produce are fully determined by their inputs.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
