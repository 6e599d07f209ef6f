//! Bounded exponential backoff applied at every model-call boundary.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Each call site (one
//! single-item translation, one batch chunk, one vision page) gets its own
//! budget of `max_attempts`; the wait before attempt `n` (n ≥ 2) is
//! `min_backoff * 2^(n-2)` clamped to `[min_backoff, max_backoff]`. With the
//! text defaults (1 s, 20 s, 3 attempts) the waits are 1 s → 2 s.
//!
//! The budget is per call site, not per document: a 500-cell workbook with
//! one flaky request retries only that request.

use crate::error::{ModelError, TranslateError};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// How often and how patiently a model call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always ≥ 1.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub min_backoff: Duration,
    /// Ceiling for any single wait.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, min_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            min_backoff,
            max_backoff,
        }
    }

    /// Policy for text translation calls: 3 attempts, 1 s → 20 s.
    pub const fn text() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(20))
    }

    /// Policy for vision calls: 3 attempts, 2 s → 30 s.
    pub const fn vision() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(30))
    }

    /// No waiting between attempts. Used by tests.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Wait before `attempt` (1-based). The first attempt never waits.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.min_backoff
            .saturating_mul(factor)
            .clamp(self.min_backoff, self.max_backoff.max(self.min_backoff))
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `call_site` names the boundary in logs and in the resulting
    /// [`TranslateError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, call_site: &str, mut op: F) -> Result<T, TranslateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err: Option<ModelError> = None;

        for attempt in 1..=attempts {
            let wait = self.delay_for(attempt);
            if !wait.is_zero() {
                warn!(
                    "{}: retry {}/{} after {}ms",
                    call_site,
                    attempt - 1,
                    attempts - 1,
                    wait.as_millis()
                );
                sleep(wait).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("{}: attempt {} failed: {}", call_site, attempt, e);
                    last_err = Some(e);
                }
            }
        }

        Err(TranslateError::RetriesExhausted {
            call_site: call_site.to_string(),
            attempts,
            last_error: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_grow_and_cap() {
        let p = RetryPolicy::text();
        assert_eq!(p.delay_for(1), Duration::ZERO);
        assert_eq!(p.delay_for(2), Duration::from_secs(1));
        assert_eq!(p.delay_for(3), Duration::from_secs(2));
        assert_eq!(p.delay_for(4), Duration::from_secs(4));
        assert_eq!(p.delay_for(10), Duration::from_secs(20));
    }

    #[test]
    fn vision_policy_starts_at_two_seconds() {
        let p = RetryPolicy::vision();
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(30), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(3)
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ModelError::Provider("503".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await
            .expect("third attempt succeeds");
        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_propagates() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::immediate(3)
            .run::<(), _, _>("batch chunk", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ModelError::Provider("down".into())) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            TranslateError::RetriesExhausted {
                call_site,
                attempts,
                last_error,
            } => {
                assert_eq!(call_site, "batch chunk");
                assert_eq!(attempts, 3);
                assert!(last_error.contains("down"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
