//! Progress reporting cadence.
//!
//! Polling may run every second or faster; observers only want to hear
//! about it every few seconds. [`ProgressThrottle`] decides when a poll
//! tick is worth reporting.

use std::time::Duration;

/// Callback invoked with the elapsed time while a job is still pending.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(Duration) + Send);

/// Lets a report through once at least `interval` has passed since the
/// previous one (or since the start).
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_reported: Duration,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_reported: Duration::ZERO,
        }
    }

    /// Returns `true` and records `elapsed` when a report is due.
    pub fn should_report(&mut self, elapsed: Duration) -> bool {
        if elapsed.saturating_sub(self.last_reported) >= self.interval {
            self.last_reported = elapsed;
            true
        } else {
            false
        }
    }
}
