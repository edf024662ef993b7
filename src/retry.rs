//! Retry engine with exponential backoff and jitter (§4.2).

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::errors::McpError;

/// A retry strategy. `retryable` classifies an error as worth another
/// attempt; non-retryable errors return immediately.
#[derive(Clone)]
pub struct RetryStrategy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_enabled: bool,
}

impl RetryStrategy {
    /// 3 attempts, 500ms -> 5s. Used for ordinary tool-body operations.
    #[must_use]
    pub fn tool_operation() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter_enabled: true,
        }
    }

    /// More aggressive: more attempts, shorter initial delay. For CDP calls
    /// that are expected to recover quickly after a browser restart.
    #[must_use]
    pub fn browser_operation() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(3),
            multiplier: 2.0,
            jitter_enabled: true,
        }
    }

    /// Longer tail for outbound HTTP calls that may be waiting on a slow
    /// remote rather than a local crash-recovery cycle.
    #[must_use]
    pub fn network_operation() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(750),
            max_delay: Duration::from_secs(15),
            multiplier: 2.5,
            jitter_enabled: true,
        }
    }

    /// Most attempts; reserved for operations where giving up is especially
    /// costly (e.g. browser restart itself).
    #[must_use]
    pub fn critical_operation() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_enabled: true,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let base = base.min(self.max_delay.as_secs_f64());
        let secs = if self.jitter_enabled {
            let jitter = rand::rng().random_range(-0.25..=0.25);
            (base * (1.0 + jitter)).max(0.0)
        } else {
            base
        };
        Duration::from_secs_f64(secs)
    }
}

/// Errors a retry-wrapped call can return. Retryable returns wrap the last
/// attempt's error, classified explicitly so the caller can decide whether a
/// failure after exhausting attempts is terminal or just slow.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("operation cancelled before completion")]
    Cancelled,
    #[error("exhausted {attempts} attempt(s): {source}")]
    Exhausted { attempts: u32, source: McpError },
    #[error("non-retryable failure: {0}")]
    NonRetryable(McpError),
}

/// Run `f` under `strategy`, retrying on retryable errors until either it
/// succeeds, a non-retryable error is returned, `cancel` resolves, or
/// `max_attempts` is exhausted.
///
/// `cancel` is polled via `tokio::select!` during the backoff sleep so that
/// cancellation is observed promptly rather than only between attempts.
pub async fn retry_with_backoff<T, F, Fut>(
    strategy: &RetryStrategy,
    cancel: tokio_util::sync::CancellationToken,
    label: &str,
    mut f: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, McpError>>,
{
    if cancel.is_cancelled() {
        return Err(RetryError::Cancelled);
    }

    let mut last_err: Option<McpError> = None;
    for attempt in 1..=strategy.max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match f().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                if !err.is_retryable() {
                    debug!(target: "retry", %label, attempt, "non-retryable error, aborting");
                    return Err(RetryError::NonRetryable(err));
                }
                warn!(target: "retry", %label, attempt, max = strategy.max_attempts, error = %err, "attempt failed, will retry");
                last_err = Some(err);

                if attempt == strategy.max_attempts {
                    break;
                }

                let delay = strategy.delay_for_attempt(attempt);
                tokio::select! {
                    () = cancel.cancelled() => return Err(RetryError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    Err(RetryError::Exhausted {
        attempts: strategy.max_attempts,
        source: last_err.unwrap_or_else(|| McpError::Other(anyhow::anyhow!("retry loop exited with no recorded error"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retry() {
        let strategy = RetryStrategy::tool_operation();
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            &strategy,
            tokio_util::sync::CancellationToken::new(),
            "test",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, McpError>(42) }
            },
        )
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let mut strategy = RetryStrategy::tool_operation();
        strategy.initial_delay = Duration::from_millis(1);
        strategy.max_delay = Duration::from_millis(2);
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            &strategy,
            tokio_util::sync::CancellationToken::new(),
            "test",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(McpError::Timeout("slow".into()))
                    } else {
                        Ok(99)
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(result, 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_returns_immediately() {
        let strategy = RetryStrategy::tool_operation();
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            &strategy,
            tokio_util::sync::CancellationToken::new(),
            "test",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(McpError::InvalidParams("bad".into())) }
            },
        )
        .await;
        assert!(matches!(result, Err(RetryError::NonRetryable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let mut strategy = RetryStrategy::tool_operation();
        strategy.max_attempts = 2;
        strategy.initial_delay = Duration::from_millis(1);
        strategy.max_delay = Duration::from_millis(2);
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            &strategy,
            tokio_util::sync::CancellationToken::new(),
            "test",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(McpError::Timeout("slow".into())) }
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 2, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_retries_promptly() {
        let mut strategy = RetryStrategy::tool_operation();
        strategy.initial_delay = Duration::from_secs(10);
        strategy.max_delay = Duration::from_secs(10);
        let token = tokio_util::sync::CancellationToken::new();
        let token2 = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token2.cancel();
        });
        let start = std::time::Instant::now();
        let result = retry_with_backoff(&strategy, token, "test", || async {
            Err::<i32, _>(McpError::Timeout("slow".into()))
        })
        .await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
