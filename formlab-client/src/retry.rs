//! Bounded linear-backoff retry policy.
//!
//! The attempt count lives in an immutable [`RetryState`] threaded through
//! the request loop, one per logical request, so concurrent requests never
//! share a counter.

use crate::config::RetryConfig;
use formlab_core::FormlabError;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Progress of one logical request through the retry loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Retries already scheduled.
    pub retries: u32,
    /// Delay before the attempt this state describes.
    pub delay: Duration,
    /// Sum of every delay so far.
    pub total_delay: Duration,
}

impl RetryState {
    /// 1-based number of the attempt this state describes.
    pub fn attempt(&self) -> u32 {
        self.retries + 1
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    pub fn start(&self) -> RetryState {
        RetryState::default()
    }

    /// Delay before retry number `retry` (1-based): `retry × base_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    /// State for the next attempt, or `None` when `error` is final.
    pub fn next(&self, state: RetryState, error: &FormlabError) -> Option<RetryState> {
        if !error.is_retryable() || state.retries >= self.max_retries {
            return None;
        }
        let retries = state.retries + 1;
        let delay = self.delay_for(retries);
        Some(RetryState {
            retries,
            delay,
            total_delay: state.total_delay.saturating_add(delay),
        })
    }

    /// Upper bound on attempts for one request.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}
