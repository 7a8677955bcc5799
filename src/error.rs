//! Error types for the wait engine and the mock server.

use std::convert::Infallible;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure of a bounded wait (`poll_until` and the composite helpers).
///
/// `E` is the error type produced by the polled condition. It only surfaces
/// through [`WaitError::Condition`] when the wait is configured to fail fast.
#[derive(Debug, Error)]
pub enum WaitError<E> {
    /// The time budget ran out before the condition was satisfied.
    #[error("{message} (timed out after {elapsed:?}, {attempts} attempts{})", LastError(.last_error))]
    Timeout {
        message: String,
        elapsed: Duration,
        attempts: u32,
        /// Last condition error absorbed while `ignore_exceptions` was set
        last_error: Option<String>,
    },

    /// The wait was cancelled through its cancellation token.
    #[error("{message} (cancelled after {elapsed:?})")]
    Cancelled { message: String, elapsed: Duration },

    /// The condition failed and the wait was not configured to ignore errors.
    #[error("condition failed: {0}")]
    Condition(E),

    /// The wait configuration was rejected before the first poll.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl<E> WaitError<E> {
    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    /// Whether this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaitError::Cancelled { .. })
    }
}

struct LastError<'a>(&'a Option<String>);

impl fmt::Display for LastError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(err) => write!(f, ", last error: {}", err),
            None => Ok(()),
        }
    }
}

/// Invalid wait, backoff, retry or server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("timeout ({timeout:?}) must be at least the poll interval ({poll_interval:?})")]
    TimeoutShorterThanInterval {
        timeout: Duration,
        poll_interval: Duration,
    },

    #[error("max attempts must be at least 1")]
    ZeroAttempts,

    #[error("backoff multiplier must be >= 1.0, got {0}")]
    InvalidMultiplier(String),

    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("route use limit must be at least 1")]
    ZeroUses,

    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("route {index}: {reason}")]
    Route { index: usize, reason: String },
}

/// Errors surfaced by [`crate::MockServer`].
#[derive(Debug, Error)]
pub enum MockServerError {
    #[error("failed to bind mock server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mock server is already starting")]
    AlreadyStarting,

    #[error("{0}")]
    Assertion(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Wait(#[from] WaitError<Infallible>),
}

/// A route's response body could not be turned into bytes.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to read body file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_condition() {
        let err: WaitError<Infallible> = WaitError::Timeout {
            message: "element #login never became visible".to_string(),
            elapsed: Duration::from_millis(1500),
            attempts: 4,
            last_error: None,
        };
        let text = err.to_string();
        assert!(text.starts_with("element #login never became visible"));
        assert!(text.contains("4 attempts"));
        assert!(!text.contains("last error"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_timeout_message_includes_last_error() {
        let err: WaitError<Infallible> = WaitError::Timeout {
            message: "app state".to_string(),
            elapsed: Duration::from_secs(1),
            attempts: 2,
            last_error: Some("element not attached".to_string()),
        };
        assert!(err.to_string().contains("last error: element not attached"));
    }

    #[test]
    fn test_config_error_wraps_into_wait_error() {
        let err: WaitError<String> = ConfigError::ZeroPollInterval.into();
        assert!(matches!(err, WaitError::Config(ConfigError::ZeroPollInterval)));
        assert!(!err.is_timeout());
    }
}
