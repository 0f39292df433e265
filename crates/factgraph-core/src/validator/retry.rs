use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use super::ValidatorResult;
use crate::config::ValidatorConfig;

/// Exponential backoff for transient validator failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
    jitter: bool,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
            jitter: true,
        }
    }

    #[must_use]
    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-based), before jitter.
    #[must_use]
    pub fn backoff_for(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
        self.initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }

    fn jittered(&self, base: Duration) -> Duration {
        if !self.jitter || base.is_zero() {
            return base;
        }
        let factor = rand::rng().random_range(0.5..=1.0);
        base.mul_f64(factor)
    }

    /// Runs `f` until it succeeds, fails permanently, or runs out of retries.
    pub async fn retry<F, Fut, T>(&self, operation: &str, mut f: F) -> ValidatorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ValidatorResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(
                            operation,
                            attempts = attempt + 1,
                            "Validator call succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        tracing::warn!(
                            operation,
                            attempts = attempt,
                            error = %e,
                            "Validator call failed after max retries"
                        );
                        return Err(e);
                    }

                    let delay = self.jittered(self.backoff_for(attempt));
                    tracing::warn!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        backoff_ms = delay.as_millis(),
                        error = %e,
                        "Validator call failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ValidatorConfig::default())
    }
}

impl From<&ValidatorConfig> for RetryPolicy {
    fn from(config: &ValidatorConfig) -> Self {
        Self::from_config(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidatorError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 500, 3_000);
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(3_000));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, 500, 8_000);
        let result = policy
            .retry("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ValidatorError::Transient("503".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(2, 100, 1_000).with_jitter(false);
        let result: ValidatorResult<()> = policy
            .retry("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ValidatorError::Timeout(Duration::from_secs(1))) }
            })
            .await;
        assert!(matches!(result, Err(ValidatorError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, 1, 1);
        let result: ValidatorResult<()> = policy
            .retry("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ValidatorError::Permanent("400".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
