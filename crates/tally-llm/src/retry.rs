// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff for non-streaming calls.

use std::future::Future;
use std::time::Duration;

use tally_config::model::LlmConfig;
use tally_core::TallyError;
use tracing::warn;

/// How many times to try a call and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            attempt_timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Delay before retry number `attempt` (1-based) after `error`.
    ///
    /// Doubles from `base_delay`, never exceeds `max_delay`. A provider
    /// `Retry-After` lengthens the wait up to the same cap.
    pub fn delay_for(&self, attempt: u32, error: &TallyError) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        match error {
            TallyError::RateLimited {
                retry_after: Some(hint),
                ..
            } => backoff.max(*hint).min(self.max_delay),
            _ => backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// attempts run out. Each attempt is bounded by `attempt_timeout`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, TallyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TallyError>>,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(TallyError::Timeout {
                    duration: self.attempt_timeout,
                }),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, &e);
                    warn!(
                        call = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let err = TallyError::provider("down", Some(503));
        assert_eq!(policy.delay_for(1, &err), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, &err), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, &err), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4, &err), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40, &err), Duration::from_secs(10));
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let policy = RetryPolicy::default();
        let err = TallyError::RateLimited {
            message: "slow".into(),
            retry_after: Some(Duration::from_secs(6)),
        };
        assert_eq!(policy.delay_for(1, &err), Duration::from_secs(6));

        let err = TallyError::RateLimited {
            message: "slow".into(),
            retry_after: Some(Duration::from_secs(600)),
        };
        assert_eq!(policy.delay_for(1, &err), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = fast(3)
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TallyError::provider("down", Some(500)))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = fast(3)
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TallyError::provider("bad request", Some(400)))
                }
            })
            .await;
        assert!(matches!(result, Err(TallyError::Provider { status: Some(400), .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempt_times_out_and_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_millis(20),
            ..fast(2)
        };
        let result = policy
            .run("test", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok::<_, TallyError>("done")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
