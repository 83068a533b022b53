//! Exponential backoff for store writes.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Total time budget across attempts and waits.
    pub deadline: Duration,
    pub max_attempts: Option<u32>,
    pub retryable: fn(&StoreError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            deadline: Duration::from_secs(600),
            max_attempts: None,
            retryable: StoreError::is_transient,
        }
    }
}

impl RetryPolicy {
    /// Never retries; every error surfaces on the first attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::default()
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, runs out
    /// of attempts or would wait past the deadline. The last error is returned.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let started = Instant::now();
        let mut delay = self.initial_delay.min(self.max_delay);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !(self.retryable)(&err) {
                return Err(err);
            }
            if self.max_attempts.is_some_and(|max| attempt >= max) {
                warn!(operation, attempt, error = %err, "giving up after max attempts");
                return Err(err);
            }
            if started.elapsed() + delay > self.deadline {
                warn!(operation, attempt, error = %err, "giving up, retry deadline reached");
                return Err(err);
            }

            warn!(operation, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
            sleep(delay).await;
            delay = self.next_delay(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unavailable() -> StoreError {
        StoreError::Unavailable("connection reset".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_with_backoff() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let started = Instant::now();

        let result = RetryPolicy::default()
            .run("put_chunk", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(unavailable())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1s + 2s + 4s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result: Result<(), _> = RetryPolicy::default()
            .run("put_analysis", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Database("duplicate key".into()))
            })
            .await;

        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_retries() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy {
            deadline: Duration::from_secs(5),
            ..RetryPolicy::default()
        };

        let result: Result<(), _> = policy
            .run("put_chunk", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::DeadlineExceeded("timeout".into()))
            })
            .await;

        assert!(result.is_err());
        // Attempts at t=0s, 1s, 3s; the next wait (4s) would end past 5s.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_cap() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy {
            max_attempts: Some(2),
            ..RetryPolicy::default()
        };

        let result: Result<(), _> = policy
            .run("put_chunk", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(delay.as_secs());
            delay = policy.next_delay(delay);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 10, 10]);
    }
}
