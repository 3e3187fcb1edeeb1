//! Retry with bounded attempts
//!
//! Credential fetches and media-room joins can fail transiently; they
//! are retried up to a fixed cap before the failure is surfaced. The
//! deployed app versions disagreed on exact counts and delays, so the
//! strategy is configuration, with a fixed-delay preset as the
//! default and exponential backoff available for embedders that want
//! it.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::{SessionError, SessionResult};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the delay between retries
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure; 1.0 keeps
    /// the delay fixed
    pub backoff_multiplier: f64,
    /// Whether to add a small random jitter to each delay
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }
}

impl RetryConfig {
    /// Fixed cap, fixed inter-attempt delay - the doorbell default
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            use_jitter: false,
        }
    }

    /// Exponential backoff with jitter, for embedders on flaky links
    pub fn backoff(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

/// Retry an operation according to `config`
///
/// Only [`SessionError::is_recoverable`] failures are retried;
/// anything else returns immediately. Exhausting the cap returns
/// [`SessionError::RetriesExhausted`] carrying the operation name, so
/// callers surface a single meaningful failure instead of the last
/// transient one.
pub async fn retry_with_cap<T, F, Fut>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> SessionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SessionResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = config.max_attempts,
            "attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "operation succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_recoverable() && attempt < config.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    category = e.category(),
                    next_delay_ms = delay.as_millis() as u64,
                    "recoverable error, will retry"
                );

                let actual_delay = if config.use_jitter {
                    let jitter = (rand::random::<f64>() - 0.5) * 0.2;
                    let millis = delay.as_millis() as f64;
                    Duration::from_millis((millis * (1.0 + jitter)) as u64)
                } else {
                    delay
                };
                sleep(actual_delay).await;

                let next_ms = (delay.as_millis() as f64 * config.backoff_multiplier) as u64;
                delay = Duration::from_millis(next_ms).min(config.max_delay);
            }
            Err(e) if e.is_recoverable() => {
                error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %e,
                    "operation failed after all retry attempts"
                );
                return Err(SessionError::RetriesExhausted {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                });
            }
            Err(e) => {
                error!(
                    operation = operation_name,
                    error = %e,
                    category = e.category(),
                    "non-recoverable error, not retrying"
                );
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_cap("join", &RetryConfig::fixed(5, Duration::from_millis(1)), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(SessionError::Transport {
                        reason: "blip".into(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_the_operation() {
        let result: SessionResult<()> =
            retry_with_cap("join", &RetryConfig::fixed(2, Duration::from_millis(1)), || async {
                Err(SessionError::Credential {
                    reason: "503".into(),
                })
            })
            .await;
        assert_eq!(
            result.unwrap_err(),
            SessionError::RetriesExhausted {
                operation: "join".into(),
                attempts: 2
            }
        );
    }

    #[tokio::test]
    async fn non_recoverable_errors_fail_fast() {
        let attempts = AtomicU32::new(0);
        let result: SessionResult<()> =
            retry_with_cap("join", &RetryConfig::fixed(5, Duration::from_millis(1)), || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SessionError::InvalidConfiguration {
                        field: "room".into(),
                        reason: "empty".into(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
