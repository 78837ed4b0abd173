//! Retry Configuration
//!
//! Exponential backoff with jitter for transient pipeline failures.

use std::time::Duration;

use crate::core::HttpHeaders;
use crate::error::{ConfigurationError, PipelineResult};

/// Status codes retried by default.
pub const DEFAULT_RETRY_STATUS_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Jitter factor (0.0-1.0).
    pub jitter: f64,
    /// Response status codes that trigger a retry.
    pub retry_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
            retry_status_codes: DEFAULT_RETRY_STATUS_CODES.to_vec(),
        }
    }
}

impl RetryConfig {
    /// Configuration that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.multiplier < 1.0 {
            return Err(ConfigurationError::InvalidValue {
                field: "retry.multiplier".to_string(),
                message: "must be at least 1.0".to_string(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigurationError::InvalidValue {
                field: "retry.jitter".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            }
            .into());
        }
        if self.initial_delay > self.max_delay {
            return Err(ConfigurationError::InvalidValue {
                field: "retry.initial_delay".to_string(),
                message: "must not exceed max_delay".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_status_codes.contains(&status)
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    /// Delay requested by a `Retry-After` header given in seconds, capped
    /// at `max_delay`.
    pub fn retry_after(&self, headers: &HttpHeaders) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs).min(self.max_delay))
    }
}
