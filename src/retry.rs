// SPDX-License-Identifier: MIT
//! Exponential backoff retry for provider calls.
//!
//! Only transient failures (transport errors, timeouts) are retried against
//! the same provider; contract violations like an unparsable response go
//! straight to the next provider in the cycle instead.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Configuration for [`retry_transient`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first try). Default: 2.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled per attempt after that.
    /// Default: 500 ms.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts. Default: 10 s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Config suitable for quick unit tests (no real waiting).
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }
}

/// Retry a provider call on transient failures with exponential backoff.
///
/// Returns the first success, the first non-transient error, or the last
/// transient error once attempts are exhausted.
pub async fn retry_transient<F, Fut, T>(config: &RetryConfig, mut f: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    debug_assert!(config.max_attempts > 0);

    let mut delay = config.initial_delay;
    let mut last_err: Option<ProviderError> = None;

    for attempt in 1..=config.max_attempts.max(1) {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "provider retry succeeded");
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                if attempt < config.max_attempts {
                    warn!(
                        provider = e.provider(),
                        attempt,
                        max = config.max_attempts,
                        delay_ms = delay.as_millis(),
                        err = %e,
                        "transient provider failure — retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(config.max_delay);
                }
                last_err = Some(e);
            }
        }
    }

    // The loop always assigns last_err before falling through.
    Err(last_err.expect("retry loop ended without an error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> ProviderError {
        ProviderError::Timeout {
            provider: "openai".into(),
            timeout_ms: 1,
        }
    }

    fn permanent() -> ProviderError {
        ProviderError::BadResponse {
            provider: "openai".into(),
            message: "not json".into(),
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let cfg = RetryConfig::instant();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result = retry_transient(&cfg, || {
            let c = calls2.clone();
            async move {
                if c.fetch_add(1, Ordering::Relaxed) == 0 {
                    Err(transient())
                } else {
                    Ok(7u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn non_transient_errors_fail_immediately() {
        let cfg = RetryConfig::instant();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<(), _> = retry_transient(&cfg, || {
            let c = calls2.clone();
            async move {
                c.fetch_add(1, Ordering::Relaxed);
                Err(permanent())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 1, "no retry on bad response");
    }

    #[tokio::test]
    async fn exhausted_attempts_return_the_last_error() {
        let cfg = RetryConfig::instant();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<(), _> = retry_transient(&cfg, || {
            let c = calls2.clone();
            async move {
                c.fetch_add(1, Ordering::Relaxed);
                Err(transient())
            }
        })
        .await;

        assert!(matches!(
            result.unwrap_err(),
            ProviderError::Timeout { .. }
        ));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }
}
