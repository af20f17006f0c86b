//! Reconnect delay schedule.
//!
//! Delays grow geometrically from `initial` and plateau at `max`:
//!
//! ```text
//! delay[n] = min(initial * multiplier^n, max)
//! ```
//!
//! There is no attempt limit. A session keeps retrying transient failures
//! until the listener stops it or the error is classified as fatal.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    current: Duration,
    max: Duration,
    multiplier: f64,
    attempt: u32,
}

impl Backoff {
    /// `multiplier` below 1.0 is treated as 1.0; `initial` above `max` is clamped.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            current: initial,
            max,
            multiplier: multiplier.max(1.0),
            attempt: 0,
        }
    }

    /// Returns the delay to wait now and advances the schedule.
    pub fn next_sleep(&mut self) -> Duration {
        let sleep = self.current;
        self.attempt = self.attempt.saturating_add(1);

        let grown = self.current.as_secs_f64() * self.multiplier;
        self.current = if grown >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(grown)
        };

        sleep
    }

    /// Back to `initial`, after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempt = 0;
    }

    /// Retries taken since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for Backoff {
    /// 1 s doubling up to 60 s.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 2.0)
    }
}
