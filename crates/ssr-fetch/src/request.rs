//! HTTP request shaping.

use std::time::Duration;

use serde_json::Value;
use ssr_core::Headers;

use crate::FetchError;

/// HTTP methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// Convert to HTTP method string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Read-style methods carry their payload as query parameters.
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call options for a fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// HTTP method (defaults to GET).
    pub method: Method,
    /// Extra headers, applied over the instance defaults.
    pub headers: Headers,
    /// Timeout override for this call.
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    /// Options for the given method.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    /// Add a header for this call.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Override the timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A fully shaped outbound request, ready for a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL without query string.
    pub url: String,
    /// Query parameters, in payload order.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: Headers,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Transport timeout.
    pub timeout: Option<Duration>,
}

impl Request {
    /// Get a header value (case-insensitive).
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter value.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON.
    pub fn json_body(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// A builder for constructing requests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Headers,
    body: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl RequestBuilder {
    /// Create a new request builder.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Headers::new(),
            body: None,
            timeout: None,
        }
    }

    /// Add a header to the request.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add multiple headers to the request.
    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (k, v) in headers {
            self.headers.insert(k.clone(), v.clone());
        }
        self
    }

    /// Set the transport timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Place `data` according to the method: query parameters for reads,
    /// a JSON body for everything else.
    pub fn payload(self, data: &Value) -> Result<Self, FetchError> {
        if self.method.is_read() {
            self.query(data)
        } else {
            self.json(data)
        }
    }

    /// Flatten a JSON object into query parameters.
    pub fn query(mut self, data: &Value) -> Result<Self, FetchError> {
        self.query.extend(query_pairs(data)?);
        Ok(self)
    }

    /// Set the request body as JSON.
    pub fn json(mut self, value: &Value) -> Result<Self, FetchError> {
        if value.is_null() {
            return Ok(self);
        }
        let json = serde_json::to_vec(value)?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self.body = Some(json);
        Ok(self)
    }

    /// Finish the request.
    pub fn build(self) -> Request {
        Request {
            method: self.method,
            url: self.url,
            query: self.query,
            headers: self.headers,
            body: self.body,
            timeout: self.timeout,
        }
    }
}

/// Flatten a JSON object into `(key, value)` query pairs.
///
/// Strings are used verbatim, other values by their JSON text; null fields
/// are dropped. A null payload yields no pairs.
pub fn query_pairs(data: &Value) -> Result<Vec<(String, String)>, FetchError> {
    match data {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .iter()
            .filter_map(|(k, v)| match v {
                Value::Null => None,
                Value::String(s) => Some((k.clone(), s.clone())),
                other => Some((k.clone(), other.to_string())),
            })
            .collect()),
        other => Err(FetchError::InvalidQuery(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Join a possibly relative url onto a base url.
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") || base.is_empty() {
        return url.to_string();
    }
    let base = base.trim_end_matches('/');
    if url.starts_with('/') {
        format!("{}{}", base, url)
    } else {
        format!("{}/{}", base, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // === Method Tests ===

    #[test]
    fn test_method_default_is_get() {
        assert_eq!(Method::default(), Method::Get);
        assert_eq!(FetchOptions::default().method, Method::Get);
    }

    #[test]
    fn test_method_is_read() {
        assert!(Method::Get.is_read());
        assert!(Method::Head.is_read());
        assert!(!Method::Post.is_read());
        assert!(!Method::Put.is_read());
        assert!(!Method::Delete.is_read());
    }

    // === Payload Placement Tests ===

    #[test]
    fn test_get_payload_goes_to_query() {
        let req = RequestBuilder::new(Method::Get, "http://x/api")
            .payload(&json!({"a": 1}))
            .unwrap()
            .build();

        assert_eq!(req.query, vec![("a".to_string(), "1".to_string())]);
        assert!(req.body.is_none());
    }

    #[test]
    fn test_post_payload_goes_to_body() {
        let req = RequestBuilder::new(Method::Post, "http://x/api")
            .payload(&json!({"a": 1}))
            .unwrap()
            .build();

        assert!(req.query.is_empty());
        assert_eq!(req.json_body(), Some(json!({"a": 1})));
        assert_eq!(req.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_query_pairs_value_kinds() {
        let pairs = query_pairs(&json!({
            "s": "text",
            "b": true,
            "n": null,
            "list": [1, 2],
        }))
        .unwrap();

        assert!(pairs.contains(&("s".to_string(), "text".to_string())));
        assert!(pairs.contains(&("b".to_string(), "true".to_string())));
        assert!(pairs.contains(&("list".to_string(), "[1,2]".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "n"));
    }

    #[test]
    fn test_query_pairs_rejects_scalars() {
        assert!(matches!(
            query_pairs(&json!(5)),
            Err(FetchError::InvalidQuery(_))
        ));
        assert!(query_pairs(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_null_body_is_omitted() {
        let req = RequestBuilder::new(Method::Delete, "http://x/a")
            .payload(&Value::Null)
            .unwrap()
            .build();
        assert!(req.body.is_none());
    }

    // === URL Tests ===

    #[test]
    fn test_resolve_relative_url() {
        assert_eq!(resolve_url("http://api.local/", "/users"), "http://api.local/users");
        assert_eq!(resolve_url("http://api.local", "users"), "http://api.local/users");
    }

    #[test]
    fn test_resolve_absolute_url_passes_through() {
        assert_eq!(
            resolve_url("http://api.local", "https://other.host/x"),
            "https://other.host/x"
        );
        assert_eq!(resolve_url("", "/x"), "/x");
    }
}
