//! Retry logic for reputation lookups with exponential backoff.

use crate::core::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 means no retries).
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Create a config for quick retries (shorter delays).
    pub fn quick() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }

    /// Calculate the delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.add_jitter {
            // Add up to 25% jitter
            let jitter = delay_secs * 0.25 * rand_jitter();
            delay_secs + jitter
        } else {
            delay_secs
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Simple pseudo-random jitter (0.0 to 1.0) without external dependencies.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Helper trait for checking if an error is worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Execute an async operation with retries.
///
/// Non-retryable failures return immediately as
/// [`Error::LookupFailed`]; exhausting every attempt returns
/// [`Error::RetryExhausted`].
///
/// # Example
/// ```ignore
/// let verdict = retry_async(
///     "static-list lookup ip:10.0.0.5",
///     RetryConfig::quick(),
///     |e: &LookupError| e.is_retryable(),
///     || async { provider.lookup(&indicator).await },
/// ).await?;
/// ```
pub async fn retry_async<T, E, F, Fut, R>(
    operation_name: &str,
    config: &RetryConfig,
    should_retry: R,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let start = std::time::Instant::now();
    let attempts = config.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!(
                        "{} succeeded on attempt {} after {:?}",
                        operation_name,
                        attempt,
                        start.elapsed()
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                last_error = e.to_string();

                if !should_retry(&e) {
                    log::debug!("{} failed with non-retryable error: {}", operation_name, e);
                    return Err(Error::lookup_failed(operation_name, last_error));
                }

                if attempt == attempts {
                    log::warn!(
                        "{} failed after {} attempts: {}",
                        operation_name,
                        attempt,
                        last_error
                    );
                    break;
                }

                let delay = config.delay_for_attempt(attempt);
                log::debug!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    operation_name,
                    attempt,
                    attempts,
                    delay,
                    e
                );

                sleep(delay).await;
            }
        }
    }

    Err(Error::retry_exhausted(operation_name, attempts, last_error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: false,
            ..Default::default()
        };

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
        // capped
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let result: Result<i32> = retry_async(
            "test operation",
            &RetryConfig::quick(),
            |_: &String| true,
            || async { Ok::<_, String>(42) },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let mut attempts = 0;
        let result: Result<i32> = retry_async(
            "failing operation",
            &RetryConfig::quick().with_max_attempts(2),
            |_: &String| true,
            || {
                attempts += 1;
                async move { Err::<i32, _>("always fails".to_string()) }
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::RetryExhausted { attempts: 2, .. })
        ));
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_early() {
        let mut attempts = 0;
        let result: Result<i32> = retry_async(
            "unlisted",
            &RetryConfig::quick().with_max_attempts(5),
            |_: &String| false,
            || {
                attempts += 1;
                async move { Err::<i32, _>("not listed".to_string()) }
            },
        )
        .await;

        match result {
            Err(Error::LookupFailed { operation, reason }) => {
                assert_eq!(operation, "unlisted");
                assert_eq!(reason, "not listed");
            }
            other => panic!("expected LookupFailed, got {:?}", other.map(|_| ())),
        }
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let mut attempts = 0;
        let result: Result<&str> = retry_async(
            "flaky",
            &RetryConfig::quick(),
            |_: &String| true,
            || {
                attempts += 1;
                let current = attempts;
                async move {
                    if current < 3 {
                        Err("transient".to_string())
                    } else {
                        Ok("ok")
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts, 3);
    }
}
