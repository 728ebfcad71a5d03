//! Request identity and response snapshots.
//!
//! The cache's key and value types. They carry plain fields (method, URL,
//! status, headers, body) so the store abstraction stays independent of any
//! particular HTTP library.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identity of an intercepted request: the cache key.
///
/// Two requests with the same method and URL name the same cache entry.
/// Header-sensitive matching (e.g. `Vary`) is out of scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    /// HTTP method, uppercase.
    pub method: String,

    /// Absolute request URL.
    pub url: String,
}

impl RequestKey {
    /// Build a key, normalising the method to uppercase.
    pub fn new(method: impl AsRef<str>, url: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_uppercase(),
            url: url.into(),
        }
    }

    /// Key for a GET request to the given URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A response snapshot as held by the cache.
///
/// Cloning is cheap: the body is a reference-counted [`Bytes`] buffer, so the
/// fetch handler can hand the original back to the caller while a clone goes
/// into the store without copying the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,

    /// Response body.
    pub body: Bytes,
}

impl StoredResponse {
    /// Build a snapshot from its parts.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// A bodyless snapshot with the given status and no headers.
    pub fn from_status(status: u16) -> Self {
        Self::new(status, Vec::new(), Bytes::new())
    }

    /// Whether the status code is in the success range (2xx).
    ///
    /// Only successful responses are eligible for cache population.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body size in bytes.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
