//! Backend response envelope `{ code, ...payload }`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::FetchError;

/// Code the backend uses to signal success.
pub const SUCCESS_SENTINEL: i64 = 0;

/// Conventional success code callers see after normalization.
pub const SUCCESS_CODE: i64 = 200;

/// The shape returned by the backend: a status code plus payload fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Status code field, if the backend sent one. Kept as sent, so string
    /// codes survive untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    /// Every other field of the response object.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ResponseEnvelope {
    /// Create an envelope with a code and payload.
    pub fn new(code: impl Into<Value>, payload: Map<String, Value>) -> Self {
        Self {
            code: Some(code.into()),
            payload,
        }
    }

    /// Decode a response body.
    ///
    /// An empty body is an empty envelope; a non-object body is wrapped as
    /// `{ "data": <body> }`.
    pub fn from_body(body: &[u8]) -> Result<Self, FetchError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: Value =
            serde_json::from_slice(body).map_err(|e| FetchError::ParseError(e.to_string()))?;
        Ok(Self::from_value(value))
    }

    /// Build an envelope from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                let code = map.remove("code");
                Self { code, payload: map }
            }
            other => {
                let mut payload = Map::new();
                payload.insert("data".to_string(), other);
                Self {
                    code: None,
                    payload,
                }
            }
        }
    }

    /// Remap the success sentinel to the conventional success code.
    ///
    /// Any numeric zero (`0`, `0.0`) counts as the sentinel; every other
    /// code, numeric or not, is left as is.
    pub fn normalize(mut self) -> Self {
        if self.code.as_ref().and_then(Value::as_f64) == Some(SUCCESS_SENTINEL as f64) {
            self.code = Some(Value::from(SUCCESS_CODE));
        }
        self
    }

    /// The code as an integer, if it is one.
    pub fn code_i64(&self) -> Option<i64> {
        self.code.as_ref().and_then(Value::as_i64)
    }

    /// Check if the (normalized) code signals success.
    pub fn is_ok(&self) -> bool {
        self.code.as_ref().and_then(Value::as_f64) == Some(SUCCESS_CODE as f64)
    }

    /// Get a payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    /// Deserialize one payload field.
    pub fn field<T: DeserializeOwned>(&self, field: &str) -> Result<T, FetchError> {
        let value = self.payload.get(field).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| FetchError::ParseError(e.to_string()))
    }

    /// Convert the whole envelope, code included, back into JSON.
    pub fn to_value(&self) -> Value {
        let mut map = self.payload.clone();
        if let Some(code) = &self.code {
            map.insert("code".to_string(), code.clone());
        }
        Value::Object(map)
    }
}
