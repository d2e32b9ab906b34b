//! Fixed-interval retry pacing shared by the device and broker loops

use std::thread;
use std::time::Duration;

/// Fixed delay between attempts. No growth, no cap on attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    interval: Duration,
}

impl Backoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Backoff that never sleeps, for tests and scripted transports
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block the calling thread for one interval
    pub fn wait(&self) {
        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}
