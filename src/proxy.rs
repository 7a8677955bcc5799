//! Proxy settings for driver sessions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Proxy scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    #[default]
    Http,
    Https,
    Socks5,
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks5 => "socks5",
        })
    }
}

/// Proxy a device or driver session should route through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: ProxyProtocol,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Hosts that bypass the proxy
    #[serde(default)]
    pub bypass_list: Vec<String>,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: ProxyProtocol::default(),
            username: None,
            password: None,
            bypass_list: Vec::new(),
        }
    }

    pub fn with_protocol(mut self, protocol: ProxyProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn bypass(mut self, host: impl Into<String>) -> Self {
        self.bypass_list.push(host.into());
        self
    }

    fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Proxy URL in `scheme://[user[:pass]@]host:port` form.
///
/// Credentials are percent-encoded.
pub fn configure_proxy(config: &ProxyConfig) -> String {
    let credentials = match (&config.username, &config.password) {
        (Some(user), Some(pass)) => format!(
            "{}:{}@",
            urlencoding::encode(user),
            urlencoding::encode(pass)
        ),
        (Some(user), None) => format!("{}@", urlencoding::encode(user)),
        _ => String::new(),
    };
    format!("{}://{}{}", config.protocol, credentials, config.host_port())
}

/// Return a copy of `capabilities` with a W3C `proxy` entry describing `config`.
///
/// A non-object input is replaced by an object holding only the proxy entry.
pub fn set_proxy_capabilities(capabilities: &Value, config: &ProxyConfig) -> Value {
    let mut proxy = Map::new();
    proxy.insert("proxyType".to_string(), json!("manual"));
    match config.protocol {
        ProxyProtocol::Http | ProxyProtocol::Https => {
            proxy.insert("httpProxy".to_string(), json!(config.host_port()));
            proxy.insert("sslProxy".to_string(), json!(config.host_port()));
        }
        ProxyProtocol::Socks5 => {
            proxy.insert("socksProxy".to_string(), json!(config.host_port()));
            proxy.insert("socksVersion".to_string(), json!(5));
        }
    }
    if !config.bypass_list.is_empty() {
        proxy.insert("noProxy".to_string(), json!(config.bypass_list));
    }

    let mut merged = capabilities.as_object().cloned().unwrap_or_default();
    merged.insert("proxy".to_string(), Value::Object(proxy));
    Value::Object(merged)
}
