use std::time::Duration;

/// Tuning parameters shared by the queue, fetch orchestrator and advancer.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Maximum number of requests waiting in the queue.
    pub capacity: usize,
    /// How often the advancer checks for a ready request while idle.
    pub poll_interval: Duration,
    /// How long a request occupies the playback slot before it is retired.
    pub play_duration: Duration,
    /// Fetch attempts per request (1 = no retry).
    pub fetch_attempts: u32,
    /// Base delay between fetch attempts; grows linearly with the attempt number.
    pub fetch_retry_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            poll_interval: Duration::from_secs(1),
            play_duration: Duration::from_secs(180),
            fetch_attempts: 1,
            fetch_retry_backoff: Duration::from_secs(5),
        }
    }
}
