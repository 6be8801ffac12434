//! Bounded exponential backoff for calls to external services.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Errors that can tell whether another attempt might succeed.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// A policy that tries once.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before attempt `attempt + 1`, given that `attempt` (1-based) failed.
    ///
    /// Doubles from `base_delay` up to `max_delay`, plus up to 25% jitter.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay);

        let jitter_cap = u64::try_from(backoff.as_millis() / 4).unwrap_or(0);
        if jitter_cap == 0 {
            return backoff;
        }
        let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
        backoff + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned
    /// unchanged when the policy gives up.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying: {e}"
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
        Self::new(3, Duration::from_secs(1), Duration::from_secs(4))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient: {})", self.transient)
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    const FAST: RetryPolicy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(300));
        let first = policy.delay_after(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        let second = policy.delay_after(2);
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(250));
        let capped = policy.delay_after(4);
        assert!(capped >= Duration::from_millis(300) && capped <= Duration::from_millis(375));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = FAST
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(TestError { transient: true })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = FAST
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { transient: false }) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = FAST
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { transient: true }) }
            })
            .await;
        assert!(result.unwrap_err().transient);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
