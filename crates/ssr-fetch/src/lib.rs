//! Render-scoped fetch wrapper.
//!
//! Wraps an HTTP transport with a small, uniform calling convention:
//! `fetch(url, data, options)` places `data` as query parameters for read
//! methods and as a JSON body otherwise, then unwraps the backend's
//! `{ code, ...payload }` envelope, remapping the success sentinel `0` to `200`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ssr_core::RenderContext;
//! use ssr_fetch::{FetchFactory, HttpTransport};
//!
//! let factory = FetchFactory::new(Arc::new(HttpTransport::new()));
//!
//! // One instance per server render: forwarded headers and base URL
//! // come from the render context and never change afterwards.
//! let ctx = RenderContext::new("/", "http://127.0.0.1:8080").with_header("Cookie", "sid=1");
//! let fetch = factory.create(Some(&ctx));
//!
//! let envelope = fetch.get("/api/ip", serde_json::json!({})).await?;
//! assert_eq!(envelope.code_i64(), Some(200));
//! ```

mod api;
mod envelope;
mod error;
mod instance;
mod request;
mod response;
mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::{split_url, ApiHost};
pub use envelope::{ResponseEnvelope, SUCCESS_CODE, SUCCESS_SENTINEL};
pub use error::FetchError;
pub use instance::{FetchFactory, FetchInstance, DEFAULT_TIMEOUT, SSR_HEADERS, SSR_RENDER_ID};
pub use request::{query_pairs, resolve_url, FetchOptions, Method, Request, RequestBuilder};
pub use response::Response;
pub use transport::{HttpTransport, Transport};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{ApiHost, FetchError, FetchFactory, FetchInstance, FetchOptions, Method, ResponseEnvelope};
}
