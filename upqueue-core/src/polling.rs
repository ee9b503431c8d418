use std::time::Duration;

use crate::PollConfig;

/// Computes the delay between polls, growing while nothing changes.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: PollConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: PollConfig) -> Self {
        Self {
            current: config.interval,
            config,
        }
    }

    /// Returns the delay before the next poll, and grows the one after it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        let grown = self.current.mul_f32(self.config.multiplier.max(1.0));
        self.current = grown.min(self.config.max_interval);

        delay
    }

    /// Called when a poll observed a change.
    pub fn reset(&mut self) {
        self.current = self.config.interval;
    }
}
