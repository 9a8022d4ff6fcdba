//! Bounded exponential backoff for platform calls.
//!
//! Only transient failures ([`PlatformError::is_transient`]) are retried.
//! A rate-limit response waits at least as long as the server asked.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::PlatformError;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Wait before the second attempt; doubled for each one after.
    pub base_delay: Duration,
    /// Upper bound on any single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Wait before attempt number `attempt` (1-based; attempt 1 never waits).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` under `policy`.
///
/// # Errors
///
/// The first non-transient error as-is, or
/// [`PlatformError::RetriesExhausted`] once every attempt failed.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();
    let mut wait = Duration::ZERO;

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = policy.delay_for(attempt).max(wait);
            debug!(what, attempt, delay_ms = delay.as_millis() as u64, "Retrying platform call");
            tokio::time::sleep(delay).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!(what, attempt, error = %e, "Transient platform failure");
                wait = match &e {
                    PlatformError::RateLimited { retry_after } => (*retry_after).min(policy.max_delay),
                    _ => Duration::ZERO,
                };
                last_error = e.to_string();
            }
            Err(e) => return Err(e),
        }
    }

    Err(PlatformError::RetriesExhausted {
        attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(p.delay_for(1), Duration::ZERO);
        assert_eq!(p.delay_for(2), Duration::from_millis(100));
        assert_eq!(p.delay_for(3), Duration::from_millis(200));
        assert_eq!(p.delay_for(4), Duration::from_millis(350));
        assert_eq!(p.delay_for(40), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let out = with_backoff(&policy(), "grant", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(PlatformError::Unavailable("gateway".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(out, Ok(2));
        // 100ms + 200ms of backoff.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = with_backoff(&policy(), "grant", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PlatformError::Unavailable("down".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(out, Err(PlatformError::RetriesExhausted { attempts: 3, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = with_backoff(&policy(), "grant", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PlatformError::Forbidden("hierarchy".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(out, Err(PlatformError::Forbidden("hierarchy".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_wait_is_honoured() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let out = with_backoff(&policy(), "grant", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(PlatformError::RateLimited {
                        retry_after: Duration::from_millis(700),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert_eq!(out, Ok(()));
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }
}
