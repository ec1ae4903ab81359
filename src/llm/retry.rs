//! Exponential Backoff Retry
//!
//! Bounded retry for transient oracle failures.
//!
//! # Strategy
//!
//! - `max_attempts` counts every call, the first one included
//! - Delay doubles each retry: base_delay * 2^retry, capped at max_delay
//! - Optional jitter: delay * (1 + pseudo_random(0, jitter_factor))
//! - Retry-After overrides the calculated delay
//! - Non-retryable errors fail immediately (4xx except 429, undecodable body)

use crate::llm::LlmError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first call (minimum 1)
    pub max_attempts: usize,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Random jitter factor (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(16),
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    pub fn new(
        max_attempts: usize,
        base_delay: Duration,
        max_delay: Duration,
        jitter_factor: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Delay before retry number `retry` (0-indexed)
    pub fn calculate_delay(&self, retry: usize) -> Duration {
        let exp_delay = (self.base_delay.as_millis() as u64)
            .saturating_mul(2u64.saturating_pow(retry as u32));
        let capped = exp_delay.min(self.max_delay.as_millis() as u64);

        // Deterministic jitter keyed on the retry index
        let jitter = if self.jitter_factor > 0.0 {
            1.0 + ((retry as f64 * 0.618033988749895) % 1.0) * self.jitter_factor
        } else {
            1.0
        };

        Duration::from_millis((capped as f64 * jitter) as u64)
    }

    /// Retry-After wins over the calculated delay
    pub fn delay_with_retry_after(&self, retry: usize, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.calculate_delay(retry))
    }
}

/// Retry budget exhausted, or a non-retryable failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("oracle call failed after {attempts} attempt(s): {source}")]
pub struct RetryError {
    /// Calls made before giving up
    pub attempts: usize,
    /// Last error observed
    #[source]
    pub source: LlmError,
}

/// Execute an async operation with retry logic
///
/// # Example
///
/// ```rust,ignore
/// let response = call_with_retry(
///     || client.generate(&request),
///     &RetryConfig::default(),
/// ).await?;
/// ```
pub async fn call_with_retry<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() || attempts >= max_attempts {
                    return Err(RetryError {
                        attempts,
                        source: err,
                    });
                }

                let retry_after = match &err {
                    LlmError::RateLimited { retry_after } => *retry_after,
                    _ => None,
                };
                let delay = config.delay_with_retry_after(attempts - 1, retry_after);
                warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient oracle failure, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}
