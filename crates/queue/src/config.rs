use std::time::Duration;

/// Dispatch parameters for a single instance's send queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub interval: Duration,
    pub interval_cap: usize,
    pub job_timeout: Duration,
    pub max_idle_time: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            interval: Duration::from_millis(1000),
            interval_cap: 1,
            job_timeout: Duration::from_millis(30_000),
            max_idle_time: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// The on-demand high-priority variant: higher concurrency, a shorter
    /// minimum dispatch interval, otherwise identical semantics.
    #[must_use]
    pub fn high_priority() -> Self {
        Self {
            concurrency: 2,
            interval: Duration::from_millis(500),
            ..Self::default()
        }
    }
}
