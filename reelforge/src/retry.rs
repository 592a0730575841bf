//! Retry utilities with configurable backoff and jitter.
//!
//! Only transient [`ProviderError`]s are retried; terminal errors are
//! returned immediately. Every external call site (model runner, embedding
//! provider, render poll) shares this policy.

use crate::errors::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter.
    None,
    /// Random from 0 to delay.
    #[default]
    Full,
    /// Half fixed, half random.
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the initial call.
    pub max_attempts: u32,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 10_000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a retry config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculates the (jittered) delay for a 0-indexed attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let delay = match self.backoff {
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt)).min(self.max_delay_ms)
            }
            BackoffStrategy::Linear => {
                base.saturating_mul(u64::from(attempt) + 1).min(self.max_delay_ms)
            }
            BackoffStrategy::Constant => base.min(self.max_delay_ms),
        };

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Executes an operation, retrying transient provider errors with backoff.
///
/// Terminal errors and exhausted retries both surface as the last error.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if err.is_transient() && attempt + 1 < config.max_attempts => {
                let delay = config.delay_for(attempt);
                tracing::debug!(
                    target = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying transient provider error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn exponential_backoff_doubles() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::None);
        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn linear_backoff_grows_by_base() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);
        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(300));
    }

    #[test]
    fn delay_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 2000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::None,
        };
        assert_eq!(config.delay_for(8), Duration::from_millis(2000));
    }

    #[test]
    fn full_jitter_stays_within_bounds() {
        let config = RetryConfig::new().with_base_delay_ms(1000);
        for _ in 0..100 {
            assert!(config.delay_for(0) <= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let config = RetryConfig::new().with_base_delay_ms(10);
        let calls = Mutex::new(0u32);

        let result = with_retry(&config, "test", || async {
            let mut n = calls.lock();
            *n += 1;
            if *n < 3 {
                Err(ProviderError::transient("test", "timeout"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(*calls.lock(), 3);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let config = RetryConfig::new();
        let calls = Mutex::new(0u32);

        let result: Result<(), _> = with_retry(&config, "test", || async {
            *calls.lock() += 1;
            Err(ProviderError::terminal("test", "bad auth"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let config = RetryConfig::new().with_max_attempts(3).with_base_delay_ms(1);
        let calls = Mutex::new(0u32);

        let result: Result<(), _> = with_retry(&config, "test", || async {
            *calls.lock() += 1;
            Err(ProviderError::transient("test", "rate limited"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock(), 3);
    }
}
