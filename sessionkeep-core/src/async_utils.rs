//! Bounded waits and retry with exponential backoff

use crate::error::{ErrorContext, SessionKeepError, SessionKeepResult};
use futures::future::BoxFuture;
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// How often, and how patiently, a failing call is repeated
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts in total, the first call included
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    /// Ceiling for the backoff
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Spread each delay by up to 10% either way
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default backoff with a custom attempt budget; zero is treated as one.
    pub fn from_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Pause before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let base = (self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay_ms as f64);
        let millis = if self.jitter {
            base * (1.0 + (fastrand::f64() - 0.5) * 0.2)
        } else {
            base
        };
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// Repeat `operation` until it succeeds, the attempt budget runs out, or it
/// fails with an error `is_retryable` rejects.
pub async fn retry_async_when<F, T, E, P>(
    operation: F,
    config: RetryConfig,
    operation_name: &str,
    is_retryable: P,
) -> Result<T, E>
where
    F: Fn() -> BoxFuture<'static, Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded on retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if attempt >= max_attempts || !is_retryable(&error) {
            warn!(
                operation = operation_name,
                attempt,
                error = %error,
                "Giving up"
            );
            return Err(error);
        }

        let delay = config.delay_for(attempt);
        debug!(
            operation = operation_name,
            attempt,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "Attempt failed, backing off"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

/// Fail with [`SessionKeepError::Timeout`] if `future` outlives `timeout_ms`.
pub async fn with_timeout<F, T>(
    future: F,
    timeout_ms: u64,
    operation_name: &str,
) -> SessionKeepResult<T>
where
    F: Future<Output = T>,
{
    timeout(Duration::from_millis(timeout_ms), future)
        .await
        .map_err(|_| SessionKeepError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation(operation_name)
                .with_metadata("timeout_ms", timeout_ms)
                .with_suggestion("Raise store.backend_timeout_ms or check the medium"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quick(attempts: usize) -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 2,
            jitter: false,
            ..RetryConfig::from_attempts(attempts)
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(10), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<usize, String> = retry_async_when(
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(format!("attempt {n}"))
                    } else {
                        Ok(n)
                    }
                }
                .boxed()
            },
            quick(5),
            "flaky",
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<(), String> = retry_async_when(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("permanent".to_string()) }.boxed()
            },
            quick(5),
            "permanent",
            |e: &String| e != "permanent",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_reports_operation() {
        let err = with_timeout(sleep(Duration::from_millis(200)), 10, "slow_save")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionKeepError::Timeout { duration_ms: 10, .. }
        ));
        assert!(err.to_string().contains("slow_save"));
    }
}
