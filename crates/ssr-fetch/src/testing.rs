//! Recording in-memory transport for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{FetchError, Request, Response, Transport};

type Handler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

#[derive(Clone)]
enum Reply {
    Fixed(Response),
    Fail(FetchError),
    Handler(Handler),
}

/// Transport that records every request and answers from canned replies
/// keyed by URL path. Unknown paths answer 404.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<Request>>,
    delay: Option<Duration>,
}

impl MockTransport {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `path` with a JSON body.
    pub fn reply(self, path: &str, status: u16, body: Value) -> Self {
        self.insert(path, Reply::Fixed(Response::json_body(status, &body)))
    }

    /// Fail requests to `path` with a transport error.
    pub fn fail(self, path: &str, error: FetchError) -> Self {
        self.insert(path, Reply::Fail(error))
    }

    /// Answer `path` by computing a response from the request.
    pub fn respond_with<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.insert(path, Reply::Handler(Arc::new(handler)))
    }

    /// Sleep before answering, so concurrent callers interleave.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All requests seen so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests seen for `path`.
    pub fn count(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| url_path(&r.url) == path)
            .count()
    }

    fn insert(self, path: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), reply);
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url_path(&request.url))
            .cloned();

        match reply {
            Some(Reply::Fixed(response)) => Ok(response),
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Handler(handler)) => Ok(handler(&request)),
            None => Ok(Response::new(404, Vec::new(), b"not found".to_vec())),
        }
    }
}

/// Path portion of an absolute URL.
fn url_path(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| &url[i + 3..]).unwrap_or(url);
    match after_scheme.find('/') {
        Some(i) => &after_scheme[i..],
        None => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("http://a.b/x/y"), "/x/y");
        assert_eq!(url_path("http://a.b"), "/");
        assert_eq!(url_path("/rel"), "/rel");
    }
}
