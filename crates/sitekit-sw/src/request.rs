//! Requests, responses and the keys they are cached under.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::cache::CacheEntry;

/// Key of a cached response.
///
/// GET requests are keyed by their URL alone; any other method prefixes the
/// URL with the method name so it never collides with a GET entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    /// Build the key for a method and URL.
    pub fn new(method: &str, url: &Url) -> Self {
        Self::from_parts(method, url.as_str())
    }

    pub(crate) fn from_parts(method: &str, url: &str) -> Self {
        if method.eq_ignore_ascii_case("GET") {
            Self(url.to_string())
        } else {
            Self(format!("{} {}", method.to_ascii_uppercase(), url))
        }
    }

    /// Key of a GET request for `url`.
    pub fn get(url: &Url) -> Self {
        Self::new("GET", url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request URL.
    pub url: Url,

    /// Request method (upper case).
    pub method: String,

    /// Request headers.
    pub headers: HashMap<String, String>,

    /// Request body.
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Vec<u8>) -> Self {
        Self {
            method: "POST".to_string(),
            body: Some(body),
            ..Self::get(url)
        }
    }

    /// Add a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Cache key for this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Response handed back to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Status code.
    pub status: u16,

    /// Status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Whether served from a cache bucket.
    pub from_cache: bool,
}

impl FetchResponse {
    /// Create a network response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            headers: HashMap::new(),
            body: body.into(),
            from_cache: false,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Create a response from a cache entry.
    pub fn from_cache(entry: &CacheEntry) -> Self {
        Self {
            status: entry.status,
            status_text: entry.status_text.clone(),
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            from_cache: true,
        }
    }

    /// Check if the status is 2xx.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Same status, headers and body, ignoring where it came from.
    pub fn same_content(&self, other: &FetchResponse) -> bool {
        self.status == other.status && self.headers == other.headers && self.body == other.body
    }
}

fn canonical_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        304 => "Not Modified",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_get_key_is_url() {
        let key = RequestKey::get(&url("https://example.com/style.css"));
        assert_eq!(key.as_str(), "https://example.com/style.css");
    }

    #[test]
    fn test_non_get_key_is_prefixed() {
        let request = FetchRequest::post(url("https://example.com/add_reflection"), b"{}".to_vec());
        assert_eq!(request.key().as_str(), "POST https://example.com/add_reflection");
        assert_ne!(request.key(), RequestKey::get(&request.url));
    }

    #[test]
    fn test_method_case_insensitive() {
        let u = url("https://example.com/");
        assert_eq!(RequestKey::new("get", &u), RequestKey::get(&u));
    }

    #[test]
    fn test_response_ok() {
        assert!(FetchResponse::new(200, "x").ok());
        assert!(FetchResponse::new(204, "").ok());
        assert!(!FetchResponse::new(404, "").ok());
        assert_eq!(FetchResponse::new(404, "").status_text, "Not Found");
    }

    #[test]
    fn test_same_content_ignores_origin() {
        let network = FetchResponse::new(200, "[]").with_header("Content-Type", "application/json");
        let mut cached = network.clone();
        cached.from_cache = true;
        assert!(network.same_content(&cached));
        assert_ne!(network, cached);
    }
}
