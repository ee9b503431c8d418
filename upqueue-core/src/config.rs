use std::time::Duration;

/// The configuration of the queueing and playback rules
#[derive(Debug, Clone)]
pub struct Config {
    /// How many played items a playback session remembers
    pub history_size: usize,
    /// How many times a played item is retired before giving up
    pub retire_attempts: u32,
    /// Whether the same link can be queued more than once for a creator
    pub allow_duplicate_urls: bool,
    /// How clients are expected to poll for queue changes
    pub poll: PollConfig,
}

/// Describes the cadence of polling a queue for changes
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// The delay after a poll that observed a change
    pub interval: Duration,
    /// The longest delay between two polls
    pub max_interval: Duration,
    /// How much the delay grows after a poll with no change
    pub multiplier: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_size: 20,
            retire_attempts: 3,
            // Re-requesting a song is allowed unless configured otherwise
            allow_duplicate_urls: true,
            poll: PollConfig::default(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}
