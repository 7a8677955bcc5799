//! HTTP request handling.
//!
//! Every request is buffered, logged, passed through the request
//! interceptors and matched against the route table. Matched responses are
//! delayed if asked, passed through the response interceptors and rendered.

use crate::config::ServerSettings;
use crate::request::{MockRequest, MockResponse};
use crate::request_log::RequestLogEntry;
use crate::server::Shared;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SERIALIZATION_FAILED_BODY: &str = r#"{"error":"Mock response serialization failed"}"#;

/// hyper service entry point.
pub(crate) async fn handle_request(
    req: Request<Incoming>,
    shared: Arc<Shared>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request = match buffer_request(req).await {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": "Failed to read request body"}).to_string(),
            ));
        }
    };
    Ok(dispatch(request, &shared).await)
}

async fn buffer_request(req: Request<Incoming>) -> Result<MockRequest, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    Ok(MockRequest {
        headers: collect_headers(&parts.headers),
        body: String::from_utf8_lossy(&body).into_owned(),
        ..MockRequest::new(parts.method.as_str(), url)
    })
}

/// Lower-case names; repeated headers joined with ", "; non-UTF-8 bytes
/// replaced rather than dropped.
fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut collected = HashMap::new();
    for name in headers.keys() {
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        collected.insert(name.as_str().to_string(), values.join(", "));
    }
    collected
}

/// Run a buffered request through the mock pipeline.
pub(crate) async fn dispatch(request: MockRequest, shared: &Shared) -> Response<Full<Bytes>> {
    let settings = &shared.settings;

    let request_interceptors = {
        let mut state = shared.state.lock();
        state.log.record(RequestLogEntry::from_request(&request));
        state.request_interceptors.clone()
    };
    let request = request_interceptors.apply(request);

    let matched = shared.state.lock().routes.take_match(&request);
    let Some(matched) = matched else {
        warn!(method = %request.method, url = %request.url, "No mock route matched");
        return not_found(&request.url);
    };

    if settings.log_requests {
        info!(
            method = %request.method,
            url = %request.url,
            route = %matched.label,
            "Request matched route"
        );
    }
    if matched.remaining_uses == Some(0) {
        debug!(route = %matched.label, "Route exhausted");
    }

    let response = matched.responder.respond(request).await;
    if response.delay_ms > 0 {
        debug!(delay_ms = response.delay_ms, "Delaying response");
        tokio::time::sleep(Duration::from_millis(response.delay_ms)).await;
    }

    let response_interceptors = shared.state.lock().response_interceptors.clone();
    let response = response_interceptors.apply(response);

    render(&response, settings)
}

/// Turn a route's response into an HTTP response.
fn render(response: &MockResponse, settings: &ServerSettings) -> Response<Full<Bytes>> {
    let status = match StatusCode::from_u16(response.status) {
        Ok(status) => status,
        Err(e) => {
            error!(status = response.status, error = %e, "Invalid mock response status");
            return serialization_failed();
        }
    };

    let body = match response.body.as_ref().map(|b| b.to_bytes()).transpose() {
        Ok(body) => body.unwrap_or_default(),
        Err(e) => {
            error!(error = %e, "Failed to serialize mock response body");
            return serialization_failed();
        }
    };

    let mut builder = Response::builder().status(status);
    if response.header(CONTENT_TYPE.as_str()).is_none() {
        builder = builder.header(CONTENT_TYPE, settings.default_content_type.as_str());
    }
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to build mock response");
            serialization_failed()
        })
}

fn not_found(url: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        serde_json::json!({"error": "Mock not found", "url": url}).to_string(),
    )
}

fn serialization_failed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        SERIALIZATION_FAILED_BODY.to_string(),
    )
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathMatcher, ResponseBody};
    use crate::routes::MockRoute;
    use crate::server::MockState;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    fn shared() -> Shared {
        Shared {
            settings: ServerSettings::new("127.0.0.1", 0),
            state: Mutex::new(MockState::default()),
        }
    }

    fn add_route(shared: &Shared, method: &str, path: PathMatcher, response: MockResponse) {
        let route = MockRoute::new(method, &path, response).unwrap();
        shared.state.lock().routes.push(route);
    }

    async fn body_of(response: Response<Full<Bytes>>) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_unmatched_request_is_logged_and_404() {
        let shared = shared();
        let response = dispatch(MockRequest::new("GET", "/unknown?x=1"), &shared).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body: Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(body, json!({"error": "Mock not found", "url": "/unknown?x=1"}));
        assert_eq!(shared.state.lock().log.len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_skips_response_interceptors() {
        let shared = shared();
        shared
            .state
            .lock()
            .response_interceptors
            .push(|r: &MockResponse| Some(r.clone().with_status(503)));

        let response = dispatch(MockRequest::new("GET", "/nothing"), &shared).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_default_content_type_applied() {
        let shared = shared();
        add_route(
            &shared,
            "GET",
            PathMatcher::exact("/json"),
            MockResponse::json(200, json!({"ok": true})),
        );
        add_route(
            &shared,
            "GET",
            PathMatcher::exact("/plain"),
            MockResponse::text(200, "hi").with_header("Content-Type", "text/plain"),
        );

        let response = dispatch(MockRequest::new("GET", "/json"), &shared).await;
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_of(response).await, br#"{"ok":true}"#);

        let response = dispatch(MockRequest::new("GET", "/plain"), &shared).await;
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers().get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_interceptors_run_in_registration_order() {
        let shared = shared();
        add_route(
            &shared,
            "GET",
            PathMatcher::exact("/order"),
            MockResponse::new(200),
        );
        {
            let mut state = shared.state.lock();
            state.response_interceptors.push(|r: &MockResponse| {
                Some(r.clone().with_header("X-Order", "1"))
            });
            state.response_interceptors.push(|r: &MockResponse| {
                let previous = r.header("X-Order").unwrap_or_default().to_string();
                Some(r.clone().with_header("X-Order", format!("{},2", previous)))
            });
        }

        let response = dispatch(MockRequest::new("GET", "/order"), &shared).await;
        assert_eq!(response.headers()["x-order"], "1,2");
    }

    #[tokio::test]
    async fn test_interceptor_header_override_replaces_route_header() {
        let shared = shared();
        add_route(
            &shared,
            "GET",
            PathMatcher::exact("/feed.xml"),
            MockResponse::text(200, "<feed/>").with_header("Content-Type", "text/plain"),
        );
        shared.state.lock().response_interceptors.push(|r: &MockResponse| {
            Some(r.clone().with_header("content-type", "application/xml"))
        });

        let response = dispatch(MockRequest::new("GET", "/feed.xml"), &shared).await;
        let values: Vec<_> = response.headers().get_all(CONTENT_TYPE).iter().collect();
        assert_eq!(values, vec!["application/xml"]);
    }

    #[test]
    fn test_collect_headers_joins_and_keeps_non_utf8() {
        use hyper::header::HeaderValue;

        let mut headers = HeaderMap::new();
        headers.append("x-device", HeaderValue::from_static("pixel-7"));
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        headers.append("x-legacy", HeaderValue::from_bytes(b"caf\xe9").unwrap());

        let collected = collect_headers(&headers);
        assert_eq!(collected["x-device"], "pixel-7");
        assert_eq!(collected["accept"], "text/html, application/json");
        assert_eq!(collected["x-legacy"], "caf\u{FFFD}");
    }

    #[tokio::test]
    async fn test_request_interceptor_rewrites_before_matching() {
        let shared = shared();
        add_route(&shared, "GET", PathMatcher::exact("/v2/items"), MockResponse::new(200));
        shared.state.lock().request_interceptors.push(|r: &MockRequest| {
            r.url
                .strip_prefix("/v1")
                .map(|rest| MockRequest::new(r.method.clone(), format!("/v2{}", rest)))
        });

        let response = dispatch(MockRequest::new("GET", "/v1/items"), &shared).await;
        assert_eq!(response.status(), StatusCode::OK);

        // The log keeps the request as received
        let state = shared.state.lock();
        assert_eq!(state.log.entries()[0].url, "/v1/items");
    }

    #[tokio::test]
    async fn test_body_failure_becomes_500() {
        let shared = shared();
        add_route(
            &shared,
            "GET",
            PathMatcher::exact("/broken"),
            MockResponse::new(200).with_body(ResponseBody::Base64 {
                content: "%%%".to_string(),
            }),
        );

        let response = dispatch(MockRequest::new("GET", "/broken"), &shared).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await, SERIALIZATION_FAILED_BODY.as_bytes());
    }

    #[tokio::test]
    async fn test_dynamic_route_reads_request() {
        let shared = shared();
        let route = MockRoute::new(
            "POST",
            &PathMatcher::exact("/echo"),
            crate::routes::Responder::dynamic(|req: MockRequest| async move {
                let body: Value = req.json().unwrap_or(Value::Null);
                MockResponse::json(201, json!({"echo": body}))
            }),
        )
        .unwrap();
        shared.state.lock().routes.push(route);

        let response = dispatch(
            MockRequest::new("POST", "/echo").with_body(r#"{"n":1}"#),
            &shared,
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(body, json!({"echo": {"n": 1}}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_delay_applied() {
        let shared = shared();
        add_route(
            &shared,
            "GET",
            PathMatcher::exact("/slow"),
            MockResponse::new(200).with_delay_ms(300),
        );

        let start = tokio::time::Instant::now();
        let response = dispatch(MockRequest::new("GET", "/slow"), &shared).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
