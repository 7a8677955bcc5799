//! Bounded polling over an uncertain external signal.
//!
//! A condition is an async closure returning `Result<Option<T>, E>`:
//! `Ok(None)` means "not yet satisfied", `Ok(Some(value))` ends the wait with
//! `value` (including falsy values like `0` or `false`), and `Err(e)` is a
//! condition failure that either aborts the wait or is absorbed, depending on
//! [`WaitConfig::ignore_exceptions`].
//!
//! ```no_run
//! use e2e_mock_kit::wait::{poll_until, WaitConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = WaitConfig::new(Duration::from_secs(5))
//!     .with_poll_interval(Duration::from_millis(250))
//!     .with_message("login button never became clickable");
//!
//! let state = poll_until(&config, || async {
//!     Ok::<_, std::io::Error>(Some(4))
//! })
//! .await?;
//! assert_eq!(state, 4);
//! # Ok(())
//! # }
//! ```

use crate::error::{ConfigError, WaitError};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for fixed-interval polling.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Total wall-clock budget measured from the first invocation
    pub timeout: Duration,
    /// Spacing between invocations
    pub poll_interval: Duration,
    /// Message carried by the timeout error
    pub on_timeout_message: String,
    /// Treat condition errors as "not yet satisfied"
    pub ignore_exceptions: bool,
    /// Optional outer cancellation
    pub cancellation: Option<CancellationToken>,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            on_timeout_message: "condition not satisfied".to_string(),
            ignore_exceptions: false,
            cancellation: None,
        }
    }
}

impl WaitConfig {
    /// Create a config with the given timeout and default interval.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.on_timeout_message = message.into();
        self
    }

    pub fn ignore_exceptions(mut self, ignore: bool) -> Self {
        self.ignore_exceptions = ignore;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.timeout < self.poll_interval {
            return Err(ConfigError::TimeoutShorterThanInterval {
                timeout: self.timeout,
                poll_interval: self.poll_interval,
            });
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

/// Sleep for `duration`, returning `false` if the token fired first.
pub(crate) async fn sleep_or_cancel(
    duration: Duration,
    cancellation: Option<&CancellationToken>,
) -> bool {
    match cancellation {
        Some(token) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = token.cancelled() => false,
            }
        }
        None => {
            tokio::time::sleep(duration).await;
            true
        }
    }
}

/// Poll `condition` every `poll_interval` until it yields a value or the
/// timeout elapses.
///
/// Elapsed time is measured from the first invocation, so a slow condition
/// eats into the budget instead of extending it. The last sleep is clamped to
/// the remaining budget and one final check runs at the deadline.
pub async fn poll_until<T, E, F, Fut>(config: &WaitConfig, mut condition: F) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Display,
{
    config.validate()?;

    let started = Instant::now();
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        if config.is_cancelled() {
            return Err(WaitError::Cancelled {
                message: config.on_timeout_message.clone(),
                elapsed: started.elapsed(),
            });
        }

        attempts += 1;
        match condition().await {
            Ok(Some(value)) => {
                debug!(
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Condition satisfied"
                );
                return Ok(value);
            }
            Ok(None) => {}
            Err(e) if config.ignore_exceptions => {
                debug!(attempt = attempts, error = %e, "Ignoring condition error");
                last_error = Some(e.to_string());
            }
            Err(e) => return Err(WaitError::Condition(e)),
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            debug!(
                attempts,
                message = %config.on_timeout_message,
                "Wait timed out"
            );
            return Err(WaitError::Timeout {
                message: config.on_timeout_message.clone(),
                elapsed,
                attempts,
                last_error,
            });
        }

        let pause = config.poll_interval.min(config.timeout - elapsed);
        if !sleep_or_cancel(pause, config.cancellation.as_ref()).await {
            return Err(WaitError::Cancelled {
                message: config.on_timeout_message.clone(),
                elapsed: started.elapsed(),
            });
        }
    }
}

/// Boolean form of [`poll_until`].
pub async fn wait_until<F, Fut>(config: &WaitConfig, mut predicate: F) -> Result<(), WaitError<Infallible>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    poll_until(config, || {
        let check = predicate();
        async move { Ok::<_, Infallible>(check.await.then_some(())) }
    })
    .await
}

type CheckFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

/// A labelled boolean condition for [`wait_for_any_of`] and [`wait_for_all_of`].
#[derive(Clone)]
pub struct NamedCondition {
    name: String,
    check: CheckFn,
}

impl NamedCondition {
    pub fn new<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(move || Box::pin(check())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for NamedCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedCondition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn labelled(name: &str, error: anyhow::Error) -> anyhow::Error {
    anyhow::anyhow!("{}: {:#}", name, error)
}

/// Evaluate conditions in order and return the first satisfied name.
///
/// With `absorb` set, a failing condition counts as unsatisfied and the rest
/// are still evaluated; the last such error is returned only if nothing was
/// satisfied on this tick.
async fn first_satisfied(
    conditions: Vec<NamedCondition>,
    absorb: bool,
) -> anyhow::Result<Option<String>> {
    let mut absorbed = None;
    for condition in conditions {
        match (condition.check)().await {
            Ok(true) => return Ok(Some(condition.name)),
            Ok(false) => {}
            Err(e) if absorb => {
                debug!(condition = %condition.name, error = %e, "Ignoring condition error");
                absorbed = Some(labelled(&condition.name, e));
            }
            Err(e) => return Err(labelled(&condition.name, e)),
        }
    }
    match absorbed {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

/// Names of the conditions not satisfied on this tick, plus the last error
/// absorbed along the way.
async fn unsatisfied(
    conditions: Vec<NamedCondition>,
    absorb: bool,
) -> anyhow::Result<(Vec<String>, Option<anyhow::Error>)> {
    let mut pending = Vec::new();
    let mut absorbed = None;
    for condition in conditions {
        match (condition.check)().await {
            Ok(true) => {}
            Ok(false) => pending.push(condition.name),
            Err(e) if absorb => {
                debug!(condition = %condition.name, error = %e, "Ignoring condition error");
                absorbed = Some(labelled(&condition.name, e));
                pending.push(condition.name);
            }
            Err(e) => return Err(labelled(&condition.name, e)),
        }
    }
    Ok((pending, absorbed))
}

/// Wait until any condition is satisfied, returning its name.
///
/// Conditions are evaluated in list order each tick and evaluation stops at
/// the first satisfied one.
pub async fn wait_for_any_of(
    conditions: Vec<NamedCondition>,
    config: &WaitConfig,
) -> Result<String, WaitError<anyhow::Error>> {
    let names: Vec<_> = conditions.iter().map(|c| c.name.clone()).collect();
    let config = config
        .clone()
        .with_message(format!("{} (any of: {})", config.on_timeout_message, names.join(", ")));

    let absorb = config.ignore_exceptions;
    poll_until(&config, || first_satisfied(conditions.clone(), absorb)).await
}

/// Wait until every condition is satisfied on the same tick.
///
/// Independently flaky conditions may never line up; the timeout message lists
/// what was still unsatisfied on the last tick.
pub async fn wait_for_all_of(
    conditions: Vec<NamedCondition>,
    config: &WaitConfig,
) -> Result<(), WaitError<anyhow::Error>> {
    let pending = Arc::new(Mutex::new(
        conditions.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
    ));

    let result = poll_until(config, || {
        let tick = unsatisfied(conditions.clone(), config.ignore_exceptions);
        let pending = pending.clone();
        async move {
            let (still, absorbed) = tick.await?;
            let done = still.is_empty();
            *pending.lock() = still;
            if let Some(e) = absorbed {
                return Err(e);
            }
            Ok::<_, anyhow::Error>(done.then_some(()))
        }
    })
    .await;

    result.map_err(|err| match err {
        WaitError::Timeout {
            message,
            elapsed,
            attempts,
            last_error,
        } => WaitError::Timeout {
            message: format!("{} (still waiting on: {})", message, pending.lock().join(", ")),
            elapsed,
            attempts,
            last_error,
        },
        other => other,
    })
}
