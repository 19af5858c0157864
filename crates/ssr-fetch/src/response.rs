//! Raw transport responses.

use serde_json::Value;

use crate::FetchError;

/// Longest body excerpt carried in an HTTP error.
const ERROR_EXCERPT: usize = 256;

/// Status, headers and body as a transport received them.
///
/// Headers keep their wire order and may repeat.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// A response carrying `value` as its JSON body.
    pub fn json_body(status: u16, value: &Value) -> Self {
        Self::new(
            status,
            vec![("Content-Type".to_string(), "application/json".to_string())],
            value.to_string().into_bytes(),
        )
    }

    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Keep 2xx responses; anything else becomes `FetchError::HttpError`
    /// with the start of the body as its message.
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if (200..300).contains(&self.status) {
            return Ok(self);
        }
        let text = String::from_utf8_lossy(&self.body);
        let message: String = text.chars().take(ERROR_EXCERPT).collect();
        Err(FetchError::HttpError {
            status: self.status,
            message,
        })
    }
}
