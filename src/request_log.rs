//! Request log and the criteria used to query it.

use crate::request::MockRequest;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// A request as it reached the server, before interception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLogEntry {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestLogEntry {
    pub fn from_request(request: &MockRequest) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// URL criterion: substring or regex, tested against path and query.
#[derive(Debug, Clone)]
pub enum UrlPattern {
    Contains(String),
    Regex(Regex),
}

impl UrlPattern {
    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Contains(needle) => url.contains(needle.as_str()),
            UrlPattern::Regex(regex) => regex.is_match(url),
        }
    }
}

impl From<&str> for UrlPattern {
    fn from(value: &str) -> Self {
        UrlPattern::Contains(value.to_string())
    }
}

impl From<String> for UrlPattern {
    fn from(value: String) -> Self {
        UrlPattern::Contains(value)
    }
}

impl From<Regex> for UrlPattern {
    fn from(value: Regex) -> Self {
        UrlPattern::Regex(value)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlPattern::Contains(needle) => write!(f, "{:?}", needle),
            UrlPattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// AND-combined filter over the request log. Absent fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RequestCriteria {
    pub method: Option<String>,
    pub url_pattern: Option<UrlPattern>,
    pub body_contains: Option<String>,
}

impl RequestCriteria {
    /// Criteria matching every request.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn url(mut self, pattern: impl Into<UrlPattern>) -> Self {
        self.url_pattern = Some(pattern.into());
        self
    }

    pub fn body_contains(mut self, needle: impl Into<String>) -> Self {
        self.body_contains = Some(needle.into());
        self
    }

    pub fn matches(&self, entry: &RequestLogEntry) -> bool {
        if let Some(method) = &self.method {
            if !method.eq_ignore_ascii_case(&entry.method) {
                return false;
            }
        }
        if let Some(pattern) = &self.url_pattern {
            if !pattern.matches(&entry.url) {
                return false;
            }
        }
        if let Some(needle) = &self.body_contains {
            if !entry.body.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for RequestCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(method) = &self.method {
            parts.push(format!("method={}", method.to_uppercase()));
        }
        if let Some(pattern) = &self.url_pattern {
            parts.push(format!("url={}", pattern));
        }
        if let Some(needle) = &self.body_contains {
            parts.push(format!("body contains {:?}", needle));
        }
        if parts.is_empty() {
            f.write_str("{any request}")
        } else {
            write!(f, "{{{}}}", parts.join(", "))
        }
    }
}

/// Append-only request history.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    entries: Vec<RequestLogEntry>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: RequestLogEntry) {
        self.entries.push(entry);
    }

    /// Matching entries, oldest first.
    pub fn find(&self, criteria: &RequestCriteria) -> Vec<RequestLogEntry> {
        self.entries
            .iter()
            .filter(|entry| criteria.matches(entry))
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> &[RequestLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
