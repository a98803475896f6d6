//! Minimal cookie handling for devices that track sessions in cookies.
//!
//! StoreOnce Gen 3 authenticates with a cookie jar and drives pagination
//! with waypoint cookies, so the jar has to be fully under client control.
//! This is a plain ordered name/value map: attributes from `Set-Cookie`
//! (Path, HttpOnly, ...) are dropped, only the pair is kept.

use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::{Deserialize, Serialize};

/// Ordered cookie name/value pairs.
///
/// Insertion order is preserved so rendered `Cookie` headers are stable.
/// Inserting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieMap {
    pairs: Vec<(String, String)>,
}

impl CookieMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Insert a cookie, replacing the value if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(n, _)| *n == name) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((name, value)),
        }
    }

    /// Overlay `other` onto this map. On a name collision the value from
    /// `other` wins.
    pub fn merge(&mut self, other: &CookieMap) {
        for (name, value) in &other.pairs {
            self.insert(name.clone(), value.clone());
        }
    }

    /// Collect cookies from the `Set-Cookie` headers of a response.
    ///
    /// Attributes after the first `;` are discarded. Malformed entries are
    /// skipped.
    pub fn capture(headers: &HeaderMap) -> Self {
        let mut cookies = CookieMap::new();
        for value in headers.get_all(SET_COOKIE) {
            let Ok(text) = value.to_str() else {
                continue;
            };
            let pair = text.split(';').next().unwrap_or("");
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    cookies.insert(name, value.trim());
                }
            }
        }
        cookies
    }

    /// Render the map as a `Cookie` header value, or `None` when empty.
    pub fn header_value(&self) -> Option<String> {
        if self.pairs.is_empty() {
            return None;
        }
        let rendered = self
            .pairs
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("; ");
        Some(rendered)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}
