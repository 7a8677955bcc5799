//! Exponential back-off polling bounded by attempt count.
//!
//! Use this instead of [`crate::wait::poll_until`] when the cost that matters
//! is the number of probes (a rate-limited endpoint, an expensive screenshot
//! diff) rather than wall-clock time.

use crate::error::ConfigError;
use crate::wait::sleep_or_cancel;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for exponential back-off.
///
/// The first attempt runs immediately. The delay before the second attempt is
/// `initial_delay`, and each later delay is the previous one times
/// `multiplier`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Attempts made before giving up (at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor applied after every failed attempt (at least 1.0)
    pub multiplier: f64,
    /// Optional outer cancellation
    pub cancellation: Option<CancellationToken>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            cancellation: None,
        }
    }
}

impl BackoffConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !(self.multiplier >= 1.0) || !self.multiplier.is_finite() {
            return Err(ConfigError::InvalidMultiplier(self.multiplier.to_string()));
        }
        Ok(())
    }

    /// Delay to wait before making attempt `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// Outcome of [`poll_with_backoff`]. Exhaustion is a value, not an error.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffOutcome<T> {
    /// The condition produced a value
    Ready(T),
    /// Every attempt failed
    Exhausted { attempts: u32 },
    /// The cancellation token fired before the attempts ran out
    Cancelled { attempts: u32 },
}

impl<T> BackoffOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, BackoffOutcome::Ready(_))
    }

    /// Convert into an `Option`, dropping the failure detail.
    pub fn ready(self) -> Option<T> {
        match self {
            BackoffOutcome::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Probe `condition` with exponentially growing pauses.
///
/// Condition errors count as failed attempts. Returns the first value, or
/// [`BackoffOutcome::Exhausted`] after `max_attempts` failures.
pub async fn poll_with_backoff<T, E, F, Fut>(
    config: &BackoffConfig,
    mut condition: F,
) -> Result<BackoffOutcome<T>, ConfigError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Display,
{
    config.validate()?;

    for attempt in 1..=config.max_attempts {
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off");
            if !sleep_or_cancel(delay, config.cancellation.as_ref()).await {
                return Ok(BackoffOutcome::Cancelled {
                    attempts: attempt - 1,
                });
            }
        }

        match condition().await {
            Ok(Some(value)) => {
                debug!(attempt, "Backoff condition satisfied");
                return Ok(BackoffOutcome::Ready(value));
            }
            Ok(None) => {}
            Err(e) => debug!(attempt, error = %e, "Backoff attempt failed"),
        }
    }

    debug!(attempts = config.max_attempts, "Backoff attempts exhausted");
    Ok(BackoffOutcome::Exhausted {
        attempts: config.max_attempts,
    })
}
