//! Per-request options and bodies for protected calls.

use std::time::Duration;

use serde_json::Value;

use crate::utils::CookieMap;

// ===== Timeouts =====

/// Connect and read bounds for a request.
///
/// The connect phase defaults to one second so an unreachable appliance
/// fails fast. The read phase is unbounded by default because some array
/// operations (large volume creation, deep reports) legitimately run for
/// minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    pub connect: Duration,
    pub read: Option<Duration>,
}

impl Default for Timeout {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(1),
            read: None,
        }
    }
}

impl Timeout {
    pub fn new(connect: Duration, read: Option<Duration>) -> Self {
        Self { connect, read }
    }

    /// Same bound for both phases.
    pub fn uniform(secs: u64) -> Self {
        Self {
            connect: Duration::from_secs(secs),
            read: Some(Duration::from_secs(secs)),
        }
    }
}

// ===== Request options =====

/// Caller-supplied extras for a single request.
///
/// Headers given here override the device defaults of the same name,
/// except for `Content-Type` and `Accept` which every adapter pins to
/// what its API requires.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) params: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) cookies: CookieMap,
    pub(crate) timeout: Option<Timeout>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a query string parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Set a request header, overriding the device default of the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add one cookie to the request.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name, value);
        self
    }

    /// Merge a whole cookie map into the request.
    pub fn with_cookies(mut self, cookies: &CookieMap) -> Self {
        self.cookies.merge(cookies);
        self
    }

    /// Override the client timeout for this request only.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ===== Request bodies =====

/// Body attached to a POST or PUT.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Xml(String),
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(xml: String) -> Self {
        RequestBody::Xml(xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_default_connect_only() {
        let timeout = Timeout::default();
        assert_eq!(timeout.connect, Duration::from_secs(1));
        assert_eq!(timeout.read, None);
    }

    #[test]
    fn test_timeout_uniform() {
        let timeout = Timeout::uniform(300);
        assert_eq!(timeout.connect, Duration::from_secs(300));
        assert_eq!(timeout.read, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_options_accumulate() {
        let options = RequestOptions::new()
            .with_param("count", "1000")
            .with_param("list", "next")
            .with_header("Accept-Language", "de")
            .with_cookie("filter", "name==vol1");
        assert_eq!(options.params.len(), 2);
        assert_eq!(options.headers.len(), 1);
        assert_eq!(options.cookies.get("filter"), Some("name==vol1"));
        assert!(options.timeout.is_none());
    }
}
