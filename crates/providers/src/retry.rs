//! Retry with exponential backoff for provider calls.

use rand::Rng;
use runbox_core::{ProviderError, RetryPolicy};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,

    /// Initial delay between retries (milliseconds)
    pub initial_delay_ms: u64,

    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,

    /// Whether to spread delays by ±20%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// A backend's backoff shape with the task's retry count on top.
    pub fn from_policy(policy: &RetryPolicy, max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: policy.initial_delay_ms,
            backoff_multiplier: policy.backoff_multiplier,
            max_delay_ms: policy.max_delay_ms,
            jitter: policy.jitter,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let final_delay = if self.jitter {
            capped_delay * rand::rng().random_range(0.8..1.2)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClassification {
    /// Should retry (transient error)
    Retry,

    /// Should not retry (permanent error)
    NoRetry,

    /// Rate limited - use provided delay if available
    RateLimited { retry_after_ms: Option<u64> },
}

/// Trait for errors that can be classified for retry
pub trait RetryableError {
    fn classify(&self) -> RetryClassification;
}

impl RetryableError for ProviderError {
    fn classify(&self) -> RetryClassification {
        match self {
            ProviderError::RateLimited { retry_after_secs } => RetryClassification::RateLimited {
                retry_after_ms: retry_after_secs.map(|s| s.saturating_mul(1000)),
            },
            e if e.is_transient() => RetryClassification::Retry,
            _ => RetryClassification::NoRetry,
        }
    }
}

/// Execute an async operation with retry logic
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    E: RetryableError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();

                if classification == RetryClassification::NoRetry {
                    debug!(operation = operation_name, attempt = attempt + 1, error = %e, "Non-retryable error");
                    return Err(e);
                }

                if attempt >= config.max_retries {
                    warn!(operation = operation_name, max_retries = config.max_retries, error = %e, "Retries exhausted");
                    return Err(e);
                }

                let delay = match classification {
                    RetryClassification::RateLimited {
                        retry_after_ms: Some(ms),
                    } => Duration::from_millis(ms).min(Duration::from_millis(config.max_delay_ms)),
                    _ => config.delay_for_attempt(attempt),
                };

                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient provider error, retrying"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
