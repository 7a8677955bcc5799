//! Route table.
//!
//! Routes are tried in registration order and the first match wins; there
//! is no specificity ranking. A bounded route is consumed in the same
//! critical section that matched it and dropped once its last use is taken.

use crate::config::{validate_method, PathMatcher, RouteDefinition};
use crate::error::ConfigError;
use crate::matcher::CompiledPathMatcher;
use crate::request::{MockRequest, MockResponse};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Computes a response from a request at handling time.
///
/// Implemented for any `Fn(MockRequest) -> impl Future<Output = MockResponse>`.
#[async_trait]
pub trait Respond: Send + Sync {
    async fn respond(&self, request: MockRequest) -> MockResponse;
}

#[async_trait]
impl<F, Fut> Respond for F
where
    F: Fn(MockRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    async fn respond(&self, request: MockRequest) -> MockResponse {
        (self)(request).await
    }
}

/// How a route produces its response.
#[derive(Clone)]
pub enum Responder {
    Static(MockResponse),
    Dynamic(Arc<dyn Respond>),
}

impl Responder {
    pub fn dynamic<R: Respond + 'static>(respond: R) -> Self {
        Responder::Dynamic(Arc::new(respond))
    }

    /// Produce the response for `request`.
    pub async fn respond(&self, request: MockRequest) -> MockResponse {
        match self {
            Responder::Static(response) => response.clone(),
            Responder::Dynamic(respond) => respond.respond(request).await,
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Responder::Static(response) => f.debug_tuple("Static").field(response).finish(),
            Responder::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<MockResponse> for Responder {
    fn from(response: MockResponse) -> Self {
        Responder::Static(response)
    }
}

/// Identifier assigned to a route on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(pub u64);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

/// A registered mock route.
#[derive(Debug, Clone)]
pub struct MockRoute {
    name: Option<String>,
    method: String,
    matcher: CompiledPathMatcher,
    responder: Responder,
    /// `None` means unlimited
    remaining_uses: Option<u32>,
}

impl MockRoute {
    /// Create a route. The method is upper-cased; regex paths are compiled here.
    pub fn new(
        method: &str,
        path: &PathMatcher,
        responder: impl Into<Responder>,
    ) -> Result<Self, ConfigError> {
        validate_method(method)?;
        Ok(Self {
            name: None,
            method: method.to_uppercase(),
            matcher: CompiledPathMatcher::compile(path)?,
            responder: responder.into(),
            remaining_uses: None,
        })
    }

    /// Build a route from its configuration definition.
    pub fn from_definition(definition: &RouteDefinition) -> Result<Self, ConfigError> {
        definition.validate()?;
        let mut route = Self::new(
            &definition.method,
            &definition.path,
            definition.response.clone(),
        )?;
        route.name = definition.id.clone();
        route.remaining_uses = definition.times;
        Ok(route)
    }

    /// Limit the route to `times` uses.
    pub fn times(mut self, times: u32) -> Self {
        self.remaining_uses = Some(times);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn remaining_uses(&self) -> Option<u32> {
        self.remaining_uses
    }

    /// Label for logs: the name if set, otherwise method and path.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} {}", self.method, self.matcher.describe()),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.remaining_uses == Some(0)
    }

    fn matches(&self, method: &str, path: &str, url: &str) -> bool {
        !self.is_exhausted() && self.method == method && self.matcher.matches(path, url)
    }
}

/// What an in-flight request keeps from the route it matched.
///
/// Detached from the table, so a concurrent `reset` cannot affect it.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    pub id: RouteId,
    pub label: String,
    pub responder: Responder,
    /// Uses left after this one (`None` = unlimited)
    pub remaining_uses: Option<u32>,
}

/// Ordered collection of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<(RouteId, MockRoute)>,
    next_id: u64,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route; it is tried after every route registered before it.
    pub fn push(&mut self, route: MockRoute) -> RouteId {
        self.next_id += 1;
        let id = RouteId(self.next_id);
        self.routes.push((id, route));
        id
    }

    /// Remove a route by id.
    pub fn remove(&mut self, id: RouteId) -> Option<MockRoute> {
        let index = self.routes.iter().position(|(rid, _)| *rid == id)?;
        Some(self.routes.remove(index).1)
    }

    /// Find the first route matching the request, consume one of its uses
    /// and prune it if that was the last one.
    pub fn take_match(&mut self, request: &MockRequest) -> Option<MatchedRoute> {
        self.routes.retain(|(_, route)| !route.is_exhausted());

        let path = request.path();
        let index = self
            .routes
            .iter()
            .position(|(_, route)| route.matches(&request.method, path, &request.url))?;

        let (id, route) = &mut self.routes[index];
        if let Some(remaining) = route.remaining_uses.as_mut() {
            *remaining -= 1;
        }
        let matched = MatchedRoute {
            id: *id,
            label: route.label(),
            responder: route.responder.clone(),
            remaining_uses: route.remaining_uses,
        };

        if route.is_exhausted() {
            self.routes.remove(index);
        }
        Some(matched)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }

    /// Routes in match order.
    pub fn iter(&self) -> impl Iterator<Item = (RouteId, &MockRoute)> {
        self.routes.iter().map(|(id, route)| (*id, route))
    }
}
