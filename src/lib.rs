//! End-to-end test kit
//!
//! Synchronization and network-mocking helpers for device-driving test
//! suites.
//!
//! # Features
//!
//! - **Bounded polling**: `poll_until`, `wait_until` and the any-of/all-of
//!   composites, with a time budget and a timeout message naming the condition
//! - **Backoff polling**: attempt-bounded polling with growing, capped delays
//! - **Retry**: re-run a failing operation a fixed number of times
//! - **Mock HTTP server**: ordered routes with use limits, dynamic responders,
//!   request/response interceptors and a queryable request log
//! - **Network and proxy helpers**: offline simulation, proxy URLs and
//!   driver proxy capabilities
//!
//! # Example
//!
//! ```no_run
//! use e2e_mock_kit::{MockResponse, MockServer, RequestCriteria, ServerSettings};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockServer::new(ServerSettings::new("127.0.0.1", 0));
//! server.mock("POST", "/api/login", MockResponse::json(200, json!({"token": "abc"})))?;
//! server.start().await?;
//!
//! // ... drive the app under test ...
//!
//! let login = server
//!     .wait_for_request(
//!         &RequestCriteria::any().method("POST").url("/api/login"),
//!         Duration::from_secs(5),
//!         Duration::from_millis(100),
//!     )
//!     .await?;
//! println!("login body: {}", login.body);
//! server.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
mod handler;
pub mod interceptor;
pub mod matcher;
pub mod network;
pub mod proxy;
pub mod request;
pub mod request_log;
pub mod retry;
pub mod routes;
pub mod server;
pub mod wait;

pub use backoff::{poll_with_backoff, BackoffConfig, BackoffOutcome};
pub use config::{MockServerConfig, PathMatcher, ResponseBody, RouteDefinition, ServerSettings};
pub use error::{ConfigError, MockServerError, SerializationError, WaitError};
pub use network::{simulate_network_conditions, NetworkConditions};
pub use proxy::{configure_proxy, set_proxy_capabilities, ProxyConfig, ProxyProtocol};
pub use request::{MockRequest, MockResponse};
pub use request_log::{RequestCriteria, RequestLogEntry, UrlPattern};
pub use retry::{retry_operation, RetryConfig};
pub use routes::{MockRoute, Respond, Responder, RouteId};
pub use server::{MockServer, ServerState};
pub use wait::{poll_until, wait_for_all_of, wait_for_any_of, wait_until, NamedCondition, WaitConfig};
