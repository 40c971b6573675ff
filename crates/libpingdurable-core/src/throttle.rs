//! Publish-rate throttling
//!
//! Sends are scheduled on a fixed grid (`start + n * period`). After each
//! successful publish the throttle sleeps until the next slot. A sender that
//! has fallen a whole period behind restarts the grid instead of bursting.

use std::time::{Duration, Instant};

use crate::signal::CancellationToken;

#[derive(Debug)]
pub struct Throttle {
    period: Option<Duration>,
    next_slot: Instant,
}

impl Throttle {
    /// Create a throttle for `rate` messages per second; 0 disables throttling
    pub fn new(rate: u32) -> Self {
        let period = if rate == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / f64::from(rate)))
        };
        Self {
            period,
            next_slot: Instant::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.period.is_some()
    }

    /// Sleep until the next scheduled send instant.
    ///
    /// Only cancellation cuts the sleep short. Returns `false` if cancelled.
    pub fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let Some(period) = self.period else {
            return true;
        };

        self.next_slot += period;
        let now = Instant::now();

        if self.next_slot <= now {
            if now - self.next_slot >= period {
                self.next_slot = now;
            }
            return !cancel.is_cancelled();
        }

        cancel.sleep(self.next_slot - now)
    }
}
