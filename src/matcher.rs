//! Route path matching.
//!
//! Exact matchers look at the path without its query string; regex matchers
//! search the whole URL, query string included. The asymmetry is kept on
//! purpose: existing suites rely on which route a given URL lands on.

use crate::config::PathMatcher;
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashMap;

/// A path matcher ready for request-time use.
#[derive(Debug, Clone)]
pub enum CompiledPathMatcher {
    /// Path equality
    Exact(String),
    /// Path prefix (registered value ended in `/`)
    Prefix(String),
    /// Regex search over path and query
    Regex(Regex),
}

impl CompiledPathMatcher {
    /// Compile a path matcher definition.
    pub fn compile(matcher: &PathMatcher) -> Result<Self, ConfigError> {
        match matcher {
            PathMatcher::Exact { value } if value.ends_with('/') => {
                Ok(CompiledPathMatcher::Prefix(value.clone()))
            }
            PathMatcher::Exact { value } => Ok(CompiledPathMatcher::Exact(value.clone())),
            PathMatcher::Regex { pattern } => Regex::new(pattern)
                .map(CompiledPathMatcher::Regex)
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Test a request. `path` excludes the query string, `url` includes it.
    pub fn matches(&self, path: &str, url: &str) -> bool {
        match self {
            CompiledPathMatcher::Exact(value) => path == value,
            CompiledPathMatcher::Prefix(value) => path.starts_with(value.as_str()),
            CompiledPathMatcher::Regex(regex) => regex.is_match(url),
        }
    }

    /// Human-readable form used in logs and assertion messages.
    pub fn describe(&self) -> String {
        match self {
            CompiledPathMatcher::Exact(value) => value.clone(),
            CompiledPathMatcher::Prefix(value) => format!("{}*", value),
            CompiledPathMatcher::Regex(regex) => format!("/{}/", regex.as_str()),
        }
    }
}

/// Parse a query string into key-value pairs.
pub(crate) fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            params.insert(decode_component(key), decode_component(value));
        } else {
            params.insert(decode_component(part), String::new());
        }
    }

    params
}

/// Form-style decoding: `+` is a space, then percent-decoding.
fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}
