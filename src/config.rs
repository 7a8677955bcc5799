//! Configuration for the mock server.
//!
//! Defines listener settings and the routes a server starts with.

use crate::error::{ConfigError, SerializationError};
use crate::request::MockResponse;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a mock server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Listener settings
    #[serde(default)]
    pub settings: ServerSettings,

    /// Routes registered at startup, matched in this order
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, route) in self.routes.iter().enumerate() {
            route.validate().map_err(|e| ConfigError::Route {
                index,
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Host to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Content type used when a route sets none
    #[serde(default = "default_content_type")]
    pub default_content_type: String,

    /// Log every handled request at info level
    #[serde(default = "default_true")]
    pub log_requests: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_content_type: default_content_type(),
            log_requests: true,
        }
    }
}

impl ServerSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// `host:port` as handed to the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

/// A route loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDefinition {
    /// Optional identifier used in logs
    #[serde(default)]
    pub id: Option<String>,

    /// HTTP method, matched exactly after upper-casing
    #[serde(default = "default_method")]
    pub method: String,

    /// Path matching
    pub path: PathMatcher,

    /// Response to return
    #[serde(default)]
    pub response: MockResponse,

    /// Number of times the route may be used (absent = unlimited)
    #[serde(default)]
    pub times: Option<u32>,
}

impl RouteDefinition {
    /// Validate the route definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_method(&self.method)?;
        self.path.validate()?;
        self.response.validate()?;
        if self.times == Some(0) {
            return Err(ConfigError::ZeroUses);
        }
        Ok(())
    }
}

/// Check that `method` is a syntactically valid HTTP method token.
pub(crate) fn validate_method(method: &str) -> Result<(), ConfigError> {
    hyper::Method::from_bytes(method.to_uppercase().as_bytes())
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidMethod(method.to_string()))
}

/// Path matching configuration.
///
/// `exact` compares against the path without its query string and turns into
/// a prefix match when the value ends in `/`. `regex` is tested against the
/// full URL, query string included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathMatcher {
    /// Exact (or trailing-slash prefix) path match
    Exact { value: String },
    /// Regex search over path and query
    Regex { pattern: String },
}

impl PathMatcher {
    pub fn exact(value: impl Into<String>) -> Self {
        PathMatcher::Exact {
            value: value.into(),
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        PathMatcher::Regex {
            pattern: pattern.into(),
        }
    }

    /// Validate the path matcher.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let PathMatcher::Regex { pattern } = self {
            regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Response body configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Raw text, sent unchanged
    Text { content: String },
    /// JSON value, serialized on send
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Load from file at send time
    File { path: String },
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => Ok(serde_json::to_vec(content)?),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                Ok(base64::engine::general_purpose::STANDARD.decode(content)?)
            }
            ResponseBody::File { path } => {
                std::fs::read(path).map_err(|source| SerializationError::File {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_simple_route() {
        let yaml = r#"
routes:
  - id: hello
    method: get
    path:
      type: exact
      value: /hello
    response:
      status: 200
      body:
        type: text
        content: "Hello, World!"
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].id.as_deref(), Some("hello"));
        assert_eq!(config.routes[0].path, PathMatcher::exact("/hello"));
        assert_eq!(config.settings.port, 8080);
        assert_eq!(config.settings.host, "localhost");
    }

    #[test]
    fn test_parse_json_response_with_limits() {
        let yaml = r#"
settings:
  host: 127.0.0.1
  port: 0
routes:
  - method: POST
    path:
      type: regex
      pattern: "^/api/users/\\d+\\?expand=true$"
    times: 2
    response:
      status: 201
      delay_ms: 250
      headers:
        X-Request-Id: abc
      body:
        type: json
        content:
          id: 7
          name: "Ada"
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        let route = &config.routes[0];
        assert_eq!(route.times, Some(2));
        assert_eq!(route.response.status, 201);
        assert_eq!(route.response.delay_ms, 250);
        match &route.response.body {
            Some(ResponseBody::Json { content }) => assert_eq!(content["name"], "Ada"),
            other => panic!("Expected JSON body, got {:?}", other),
        }
        assert_eq!(config.settings.bind_address(), "127.0.0.1:0");
    }

    #[test]
    fn test_method_defaults_to_get() {
        let yaml = r#"
routes:
  - path:
      type: exact
      value: /health
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.routes[0].method, "GET");
        assert_eq!(config.routes[0].response.status, 200);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let yaml = r#"
routes:
  - path:
      type: regex
      pattern: "([unclosed"
"#;
        let err = MockServerConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("route 0"));
    }

    #[test]
    fn test_invalid_method_and_status_rejected() {
        let mut route = RouteDefinition {
            id: None,
            method: "GE T".to_string(),
            path: PathMatcher::exact("/x"),
            response: MockResponse::default(),
            times: None,
        };
        assert!(matches!(route.validate(), Err(ConfigError::InvalidMethod(_))));

        route.method = "GET".to_string();
        route.response.status = 42;
        assert_eq!(route.validate(), Err(ConfigError::InvalidStatus(42)));

        route.response.status = 200;
        route.times = Some(0);
        assert_eq!(route.validate(), Err(ConfigError::ZeroUses));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = r#"
routes:
  - path: { type: exact, value: /x }
    priority: 10
"#;
        assert!(MockServerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "settings:\n  port: 9123\nroutes:\n  - path: {{ type: exact, value: /ping }}"
        )
        .unwrap();

        let config = MockServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.settings.port, 9123);
        assert_eq!(config.routes.len(), 1);
    }

    #[test]
    fn test_default_config_parses() {
        let config =
            MockServerConfig::from_yaml(include_str!("../demos/default-config.yaml")).unwrap();
        assert_eq!(config.settings.bind_address(), "localhost:8080");
        assert_eq!(config.routes[2].times, Some(1));
        assert!(config
            .routes
            .iter()
            .any(|r| matches!(r.path, PathMatcher::Regex { .. })));
    }

    #[test]
    fn test_response_body_to_bytes() {
        let text = ResponseBody::Text {
            content: "hello".to_string(),
        };
        assert_eq!(text.to_bytes().unwrap(), b"hello");

        let json = ResponseBody::Json {
            content: serde_json::json!({"key": "value"}),
        };
        assert_eq!(json.to_bytes().unwrap(), br#"{"key":"value"}"#);

        let binary = ResponseBody::Base64 {
            content: "aGk=".to_string(),
        };
        assert_eq!(binary.to_bytes().unwrap(), b"hi");

        let broken = ResponseBody::Base64 {
            content: "not base64!!".to_string(),
        };
        assert!(matches!(broken.to_bytes(), Err(SerializationError::Base64(_))));

        let missing = ResponseBody::File {
            path: "/definitely/not/here.json".to_string(),
        };
        assert!(matches!(missing.to_bytes(), Err(SerializationError::File { .. })));
    }
}
