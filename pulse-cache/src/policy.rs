//! Staleness, retry and timeout policy for the query cache.

use std::time::Duration;

/// Configuration for a [`QueryCache`](crate::QueryCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Freshness window applied when a caller does not pass its own.
    pub stale_after: Duration,
    /// Retries after the first failed attempt of a fetch cycle.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Upper bound for a single attempt; expiry counts as a transient failure.
    pub request_timeout: Duration,
    /// How often the background sweeper looks for expired entries.
    pub sweep_interval: Duration,
    /// Buffer size of the cache event broadcast channel.
    pub event_capacity: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
            event_capacity: 256,
        }
    }
}

impl CachePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_after(mut self, duration: Duration) -> Self {
        self.stale_after = duration;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
