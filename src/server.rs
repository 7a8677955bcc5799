//! Mock HTTP server instance and its lifecycle.
//!
//! A [`MockServer`] owns its route table, interceptor chains and request log.
//! Nothing is global: build one per test (or per suite) and hand it around
//! by reference.

use crate::config::{MockServerConfig, PathMatcher, ServerSettings};
use crate::error::{ConfigError, MockServerError};
use crate::handler::handle_request;
use crate::interceptor::InterceptorChain;
use crate::request::{MockRequest, MockResponse};
use crate::request_log::{RequestCriteria, RequestLog, RequestLogEntry};
use crate::routes::{MockRoute, Respond, Responder, RouteId, RouteTable};
use crate::wait::{poll_until, WaitConfig};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mutable per-server state. One lock covers all four parts so `reset`
/// clears them together.
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub routes: RouteTable,
    pub request_interceptors: InterceptorChain<MockRequest>,
    pub response_interceptors: InterceptorChain<MockResponse>,
    pub log: RequestLog,
}

/// State shared between the server handle and its connection tasks.
#[derive(Debug)]
pub(crate) struct Shared {
    pub settings: ServerSettings,
    pub state: Mutex<MockState>,
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening(SocketAddr),
}

enum Lifecycle {
    Stopped,
    Starting,
    Listening {
        addr: SocketAddr,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    },
}

/// In-process mock HTTP server.
pub struct MockServer {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl MockServer {
    /// Create a stopped server with no routes.
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                state: Mutex::new(MockState::default()),
            }),
            lifecycle: Mutex::new(Lifecycle::Stopped),
        }
    }

    /// Create a stopped server with the configured routes registered in order.
    pub fn from_config(config: MockServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let server = Self::new(config.settings);
        for definition in &config.routes {
            server.add_route(MockRoute::from_definition(definition)?);
        }
        info!(routes = config.routes.len(), "Mock server configured");
        Ok(server)
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.shared.settings
    }

    pub fn state(&self) -> ServerState {
        match &*self.lifecycle.lock() {
            Lifecycle::Stopped => ServerState::Stopped,
            Lifecycle::Starting => ServerState::Starting,
            Lifecycle::Listening { addr, .. } => ServerState::Listening(*addr),
        }
    }

    /// Bound address while listening.
    pub fn address(&self) -> Option<SocketAddr> {
        match self.state() {
            ServerState::Listening(addr) => Some(addr),
            _ => None,
        }
    }

    /// `http://host:port` while listening.
    pub fn base_url(&self) -> Option<String> {
        self.address().map(|addr| format!("http://{}", addr))
    }

    /// Bind and start accepting connections.
    ///
    /// Calling this while already listening logs a warning and returns the
    /// existing address.
    pub async fn start(&self) -> Result<SocketAddr, MockServerError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Listening { addr, .. } => {
                    warn!(address = %addr, "Mock server already listening");
                    return Ok(*addr);
                }
                Lifecycle::Starting => {
                    warn!("Mock server is already starting");
                    return Err(MockServerError::AlreadyStarting);
                }
                Lifecycle::Stopped => {}
            }
            *lifecycle = Lifecycle::Starting;
        }

        let bind_address = self.shared.settings.bind_address();
        let bound = match TcpListener::bind(&bind_address).await {
            Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
            Err(e) => Err(e),
        };
        let (listener, addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                *self.lifecycle.lock() = Lifecycle::Stopped;
                return Err(MockServerError::Bind {
                    addr: bind_address,
                    source,
                });
            }
        };

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            addr,
            Arc::clone(&self.shared),
            shutdown.clone(),
        ));

        *self.lifecycle.lock() = Lifecycle::Listening {
            addr,
            shutdown,
            task,
        };
        info!(address = %addr, "Mock server listening");
        Ok(addr)
    }

    /// Stop accepting connections and close open ones.
    ///
    /// Calling this while stopped logs a warning and does nothing.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        match previous {
            Lifecycle::Listening {
                addr,
                shutdown,
                task,
            } => {
                shutdown.cancel();
                if let Err(e) = task.await {
                    error!(address = %addr, error = %e, "Mock server task failed");
                }
                info!(address = %addr, "Mock server stopped");
            }
            Lifecycle::Starting => {
                *self.lifecycle.lock() = Lifecycle::Starting;
                warn!("Mock server is still starting, stop ignored");
            }
            Lifecycle::Stopped => warn!("Mock server is not running"),
        }
    }

    /// Clear routes, interceptors and the request log. The listener is untouched.
    pub fn reset(&self) {
        let mut state = self.shared.state.lock();
        *state = MockState::default();
        debug!("Mock server state reset");
    }

    /// Stop the listener and clear all state.
    pub async fn cleanup(&self) {
        if self.address().is_some() {
            self.stop().await;
        }
        self.reset();
    }

    /// Register a route after every existing one.
    pub fn add_route(&self, route: MockRoute) -> RouteId {
        let label = route.label();
        let id = self.shared.state.lock().routes.push(route);
        debug!(route = %label, id = %id, "Route registered");
        id
    }

    /// Register an unlimited exact-path route.
    pub fn mock(
        &self,
        method: &str,
        path: &str,
        response: MockResponse,
    ) -> Result<RouteId, ConfigError> {
        Ok(self.add_route(MockRoute::new(method, &PathMatcher::exact(path), response)?))
    }

    /// Register an exact-path route usable `times` times.
    pub fn mock_times(
        &self,
        method: &str,
        path: &str,
        response: MockResponse,
        times: u32,
    ) -> Result<RouteId, ConfigError> {
        if times == 0 {
            return Err(ConfigError::ZeroUses);
        }
        let route = MockRoute::new(method, &PathMatcher::exact(path), response)?.times(times);
        Ok(self.add_route(route))
    }

    /// Register an unlimited route whose regex is tested against the full URL.
    pub fn mock_pattern(
        &self,
        method: &str,
        pattern: &str,
        response: MockResponse,
    ) -> Result<RouteId, ConfigError> {
        Ok(self.add_route(MockRoute::new(method, &PathMatcher::regex(pattern), response)?))
    }

    /// Register a route whose response is computed per request.
    pub fn mock_dynamic<R>(
        &self,
        method: &str,
        path: PathMatcher,
        respond: R,
    ) -> Result<RouteId, ConfigError>
    where
        R: Respond + 'static,
    {
        Ok(self.add_route(MockRoute::new(method, &path, Responder::dynamic(respond))?))
    }

    /// Remove a route. Returns whether it was still registered.
    pub fn remove_route(&self, id: RouteId) -> bool {
        self.shared.state.lock().routes.remove(id).is_some()
    }

    pub fn route_count(&self) -> usize {
        self.shared.state.lock().routes.len()
    }

    /// Append a request interceptor. Returning `None` leaves the request as is.
    pub fn add_request_interceptor<F>(&self, interceptor: F)
    where
        F: Fn(&MockRequest) -> Option<MockRequest> + Send + Sync + 'static,
    {
        self.shared.state.lock().request_interceptors.push(interceptor);
    }

    /// Append a response interceptor. Returning `None` leaves the response as is.
    pub fn add_response_interceptor<F>(&self, interceptor: F)
    where
        F: Fn(&MockResponse) -> Option<MockResponse> + Send + Sync + 'static,
    {
        self.shared.state.lock().response_interceptors.push(interceptor);
    }

    /// Number of registered (request, response) interceptors.
    pub fn interceptor_counts(&self) -> (usize, usize) {
        let state = self.shared.state.lock();
        (
            state.request_interceptors.len(),
            state.response_interceptors.len(),
        )
    }

    /// Every logged request, oldest first.
    pub fn requests(&self) -> Vec<RequestLogEntry> {
        self.shared.state.lock().log.entries().to_vec()
    }

    pub fn request_count(&self) -> usize {
        self.shared.state.lock().log.len()
    }

    /// Logged requests matching `criteria`, oldest first.
    pub fn find_requests(&self, criteria: &RequestCriteria) -> Vec<RequestLogEntry> {
        self.shared.state.lock().log.find(criteria)
    }

    /// Fail unless at least one logged request matches.
    pub fn assert_request_made(
        &self,
        criteria: &RequestCriteria,
    ) -> Result<Vec<RequestLogEntry>, MockServerError> {
        let found = self.find_requests(criteria);
        if found.is_empty() {
            return Err(MockServerError::Assertion(format!(
                "expected a request matching {}, but none was made ({} requests logged)",
                criteria,
                self.request_count()
            )));
        }
        Ok(found)
    }

    /// Fail if any logged request matches.
    pub fn assert_request_not_made(&self, criteria: &RequestCriteria) -> Result<(), MockServerError> {
        let found = self.find_requests(criteria);
        if let Some(first) = found.first() {
            return Err(MockServerError::Assertion(format!(
                "expected no request matching {}, but found {} (first: {} {})",
                criteria,
                found.len(),
                first.method,
                first.url
            )));
        }
        Ok(())
    }

    /// Poll the request log until a matching request shows up, returning the
    /// most recent match.
    pub async fn wait_for_request(
        &self,
        criteria: &RequestCriteria,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<RequestLogEntry, MockServerError> {
        let config = WaitConfig::new(timeout)
            .with_poll_interval(poll_interval)
            .with_message(format!("no request matching {} was made", criteria));

        let entry = poll_until(&config, || {
            let latest = self.find_requests(criteria).pop();
            async move { Ok::<_, Infallible>(latest) }
        })
        .await?;
        Ok(entry)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Lifecycle::Listening { shutdown, .. } = &*self.lifecycle.lock() {
            shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("settings", &self.shared.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn accept_loop(
    listener: TcpListener,
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let shared = Arc::clone(&shared);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                handle_request(req, Arc::clone(&shared))
                            });
                            let conn = http1::Builder::new().serve_connection(io, service);
                            let mut conn = pin!(conn);
                            tokio::select! {
                                result = conn.as_mut() => {
                                    if let Err(e) = result {
                                        debug!(peer = %peer, error = %e, "Connection error");
                                    }
                                }
                                _ = shutdown.cancelled() => {
                                    conn.as_mut().graceful_shutdown();
                                    let _ = conn.await;
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!(address = %addr, error = %e, "Accept error");
                    }
                }
            }
            _ = shutdown.cancelled() => {
                debug!(address = %addr, "Accept loop shutting down");
                break;
            }
        }
    }
}
