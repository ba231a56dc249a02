//! Configuration for the pool coordinator

use std::time::Duration;

/// Default minutes without an update after which a lease is reclaimed
pub const DEFAULT_RELEASE_TIMEOUT_MINS: u64 = 120;

/// Default interval between reaper cycles in seconds
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;

/// Default capacity of the update queue
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 50;

/// Default bound on waiting for the allocation lock in seconds
pub const DEFAULT_ALLOCATION_LOCK_TIMEOUT_SECS: u64 = 30;

/// Retry behaviour of the update applier on transient storage errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per patch, including the first
    pub max_attempts: u32,
    /// Pause after the first failure; doubles with each further failure
    pub base_delay: Duration,
    /// Upper bound of a single pause
    pub max_delay: Duration,
    /// Consecutive failures after which each retry is logged as a warning
    pub warn_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            warn_after: 3,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base * 2^(failures - 1), capped at `max_delay`
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2u32.pow(exponent))
            .min(self.max_delay)
    }
}

/// Configuration for a LeasePool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle period after which a lease is released automatically
    pub account_release_timeout: Duration,
    /// How often the reaper looks for idle leases
    pub reaper_interval: Duration,
    /// Update queue capacity; submissions beyond it are rejected
    pub max_queue_size: usize,
    /// Longest a lease request waits for another one to finish
    pub allocation_lock_timeout: Duration,
    /// Applier retry behaviour
    pub retry: RetryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            account_release_timeout: Duration::from_secs(DEFAULT_RELEASE_TIMEOUT_MINS * 60),
            reaper_interval: Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            allocation_lock_timeout: Duration::from_secs(DEFAULT_ALLOCATION_LOCK_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl PoolConfig {
    /// Set the idle release timeout
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.account_release_timeout = timeout;
        self
    }

    /// Set the reaper interval
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Set the update queue capacity (at least 1)
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size.max(1);
        self
    }

    /// Set the allocation lock timeout
    pub fn with_allocation_lock_timeout(mut self, timeout: Duration) -> Self {
        self.allocation_lock_timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_queue_size_never_zero() {
        let config = PoolConfig::default().with_max_queue_size(0);
        assert_eq!(config.max_queue_size, 1);
    }
}
