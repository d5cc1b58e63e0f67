use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Bounds for the per-event retry loop.
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles per attempt.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Runs `f` up to `config.max_attempts` times.
///
/// Retries only when `is_retryable` approves the error, sleeping an
/// exponentially growing, jittered delay between attempts. The final error
/// is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: RetryConfig,
    is_retryable: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match f().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < config.max_attempts && is_retryable(&error) => {
                tokio::time::sleep(backoff_delay(config.base_delay, attempt)).await;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Exponential backoff with up to 50% added jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1 << (attempt - 1).min(16));
    let jitter = rand::thread_rng().gen_range(Duration::ZERO..=exp / 2);
    exp + jitter
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(fast(), |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_the_attempt_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(fast(), |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom") }
        })
        .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(fast(), |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("transient") } else { Ok(7) } }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(fast(), |_| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("denied") }
        })
        .await;

        assert_eq!(result, Err("denied"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let base = Duration::from_millis(100);
        for attempt in 1u32..=3 {
            let exp = base * (1 << (attempt - 1));
            let delay = backoff_delay(base, attempt);
            assert!(delay >= exp);
            assert!(delay <= exp + exp / 2);
        }
    }
}
