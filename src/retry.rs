//! Retrying side-effecting operations.
//!
//! Unlike the polling helpers there is no "not yet" state: an operation
//! either succeeds or fails, and after the last retry the original error is
//! returned as-is so callers can match on the root cause.

use crate::wait::sleep_or_cancel;
use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type RetryObserver<E> = Arc<dyn Fn(u32, &E) + Send + Sync>;

/// Configuration for [`retry_operation`].
pub struct RetryConfig<E> {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Called with the failed attempt number and its error before each retry sleep
    pub on_retry: Option<RetryObserver<E>>,
    /// Optional outer cancellation
    pub cancellation: Option<CancellationToken>,
}

impl<E> Default for RetryConfig<E> {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            on_retry: None,
            cancellation: None,
        }
    }
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            on_retry: self.on_retry.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("on_retry", &self.on_retry.is_some())
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl<E> RetryConfig<E> {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            ..Default::default()
        }
    }

    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32, &E) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Run `operation` until it succeeds, retrying up to `max_retries` times.
///
/// Returns the error of the final attempt unchanged once retries are used
/// up, or the latest error if the cancellation token fires between attempts.
pub async fn retry_operation<T, E, F, Fut>(config: &RetryConfig<E>, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1u32;
    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if attempt > config.max_retries {
            warn!(
                attempts = attempt,
                error = %error,
                "Operation failed, retries exhausted"
            );
            return Err(error);
        }

        debug!(attempt, error = %error, "Operation failed, retrying");
        if let Some(observer) = &config.on_retry {
            observer(attempt, &error);
        }

        if !sleep_or_cancel(config.retry_delay, config.cancellation.as_ref()).await {
            debug!(attempt, "Retry cancelled");
            return Err(error);
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;
    use tokio::time::Instant;

    #[derive(Debug, Error, PartialEq)]
    enum TapError {
        #[error("element {0} not clickable")]
        NotClickable(&'static str),
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_original_error() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(3, Duration::from_millis(100));

        let result: Result<(), TapError> = retry_operation(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TapError::NotClickable("#submit")) }
        })
        .await;

        assert_eq!(result, Err(TapError::NotClickable("#submit")));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_failures() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(5, Duration::from_millis(200));
        let started = Instant::now();

        let value = retry_operation(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(TapError::NotClickable("#next"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let config = RetryConfig::new(2, Duration::from_millis(10))
            .on_retry(move |attempt, err: &TapError| sink.lock().push((attempt, err.to_string())));

        let _ = retry_operation(&config, || async {
            Err::<(), _>(TapError::NotClickable("#menu"))
        })
        .await;

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                (1, "element #menu not clickable".to_string()),
                (2, "element #menu not clickable".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(0, Duration::from_secs(1));
        let result = retry_operation(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TapError::NotClickable("#x")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_returns_latest_error() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(10, Duration::from_secs(5)).with_cancellation(token);

        let result = retry_operation(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TapError::NotClickable("#cancel")) }
        })
        .await;

        assert_eq!(result, Err(TapError::NotClickable("#cancel")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
