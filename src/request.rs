//! Request and response records passed through routes and interceptors.

use crate::config::ResponseBody;
use crate::error::ConfigError;
use crate::matcher::parse_query_string;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A fully buffered inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MockRequest {
    /// Upper-case HTTP method
    pub method: String,
    /// Path plus query string, as received
    pub url: String,
    /// Headers with lower-case names; repeated headers are joined with ", "
    pub headers: HashMap<String, String>,
    /// Body decoded as UTF-8 (lossy)
    pub body: String,
}

impl MockRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Path component, without the query string.
    pub fn path(&self) -> &str {
        self.url.split_once('?').map(|(p, _)| p).unwrap_or(&self.url)
    }

    /// Raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, q)| q)
    }

    /// Decoded query parameters.
    pub fn query_params(&self) -> HashMap<String, String> {
        parse_query_string(self.query().unwrap_or(""))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Parse the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

fn default_status() -> u16 {
    200
}

/// A response returned by a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockResponse {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Artificial delay before the response is sent
    #[serde(default)]
    pub delay_ms: u64,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self::new(200)
    }
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
            delay_ms: 0,
        }
    }

    /// Response whose body is `value` serialized as JSON.
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::new(status).with_body(ResponseBody::Json { content: value })
    }

    /// Response whose body is sent verbatim.
    pub fn text(status: u16, content: impl Into<String>) -> Self {
        Self::new(status).with_body(ResponseBody::Text {
            content: content.into(),
        })
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing any existing one whose name differs only in case.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
        self
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Validate the response definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=599).contains(&self.status) {
            return Err(ConfigError::InvalidStatus(self.status));
        }
        Ok(())
    }
}
