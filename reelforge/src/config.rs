//! Engine configuration.

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the engine and its stage topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between poll attempts in a blocking wait.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Ceiling on a single blocking wait, in seconds.
    #[serde(default = "default_max_wait")]
    pub max_wait_seconds: u64,
    /// Retry policy for transient provider failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Default number of retrieval results.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Pass ceiling for the review/refine loop.
    #[serde(default = "default_loop_iterations")]
    pub loop_max_iterations: u32,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_max_wait() -> u64 {
    300
}

fn default_top_k() -> usize {
    5
}

fn default_loop_iterations() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            max_wait_seconds: default_max_wait(),
            retry: RetryConfig::default(),
            default_top_k: default_top_k(),
            loop_max_iterations: default_loop_iterations(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads overrides from `REELFORGE_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = env_parse("REELFORGE_POLL_INTERVAL_SECONDS") {
            config.poll_interval_seconds = value;
        }
        if let Some(value) = env_parse("REELFORGE_MAX_WAIT_SECONDS") {
            config.max_wait_seconds = value;
        }
        if let Some(value) = env_parse("REELFORGE_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = value;
        }
        if let Some(value) = env_parse("REELFORGE_RETRY_BASE_DELAY_MS") {
            config.retry.base_delay_ms = value;
        }
        if let Some(value) = env_parse("REELFORGE_DEFAULT_TOP_K") {
            config.default_top_k = value;
        }
        if let Some(value) = env_parse("REELFORGE_LOOP_MAX_ITERATIONS") {
            config.loop_max_iterations = value;
        }
        config
    }

    /// Sets the blocking-wait poll cadence.
    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval_seconds = seconds;
        self
    }

    /// Sets the blocking-wait ceiling.
    #[must_use]
    pub fn with_max_wait_seconds(mut self, seconds: u64) -> Self {
        self.max_wait_seconds = seconds;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the review/refine pass ceiling.
    #[must_use]
    pub fn with_loop_max_iterations(mut self, iterations: u32) -> Self {
        self.loop_max_iterations = iterations;
        self
    }

    /// Poll cadence as a `Duration`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Blocking-wait ceiling as a `Duration`.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}
