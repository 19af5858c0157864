//! Per-request render orchestration.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use http::HeaderMap;
use ssr_core::{Headers, Manifest, RenderContext, RenderId, RenderIds};
use ssr_render::{render_to_string, AppDefinition};

use crate::error::HostError;
use crate::index_html::RenderedPage;

/// Inbound headers forwarded into every render.
pub const FORWARD_HEADERS: [&str; 3] = ["Cookie", "User-Agent", "X-Forwarded-For"];

/// Pick the headers to forward from an inbound request.
///
/// A missing `X-Forwarded-For` falls back to the peer address.
pub fn forwarded_headers(headers: &HeaderMap, peer: Option<IpAddr>) -> Headers {
    let mut forwarded = Headers::new();
    for name in FORWARD_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let value = match value {
            None if name == "X-Forwarded-For" => peer.map(|ip| ip.to_string()),
            other => other,
        };
        if let Some(value) = value {
            forwarded.insert(name.to_string(), value);
        }
    }
    forwarded
}

/// Runs renders with fresh ids, forwarded headers and a timeout.
#[derive(Debug)]
pub struct RenderManager {
    def: AppDefinition,
    origin: String,
    timeout: Duration,
    ids: RenderIds,
}

impl RenderManager {
    /// Create a manager rendering `def` with fetches based at `origin`.
    pub fn new(def: AppDefinition, origin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            def,
            origin: origin.into(),
            timeout,
            ids: RenderIds::new(),
        }
    }

    /// The render timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Render `url` (path plus query).
    pub async fn render(
        &self,
        url: &str,
        headers: Headers,
        manifest: Manifest,
    ) -> (RenderId, Result<RenderedPage, HostError>) {
        let id = self.ids.next_id();
        tracing::info!("request {}: {}", id, url);
        let started = Instant::now();

        let mut ctx = RenderContext::new(url, self.origin.clone())
            .with_render_id(id)
            .with_headers(headers)
            .with_manifest(manifest);

        let outcome = tokio::time::timeout(self.timeout, render_to_string(&self.def, &mut ctx)).await;
        let result = match outcome {
            Ok(Ok(html)) => Ok(RenderedPage {
                html,
                output: ctx.output,
            }),
            Ok(Err(e)) => Err(HostError::Render(e)),
            Err(_) => Err(HostError::Timeout(self.timeout)),
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(_) => tracing::info!("request {} finish: {}, elapse: {:?}", id, url, elapsed),
            Err(e) if e.is_expected() => {
                tracing::info!("request {} finish: {}, elapse: {:?}, {}", id, url, elapsed, e.outcome())
            }
            Err(e) => tracing::error!(
                "request {} finish: {}, elapse: {:?}, {}: {}",
                id,
                url,
                elapsed,
                e.outcome(),
                e
            ),
        }
        (id, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::HeaderValue;
    use serde_json::json;
    use ssr_fetch::testing::MockTransport;
    use ssr_render::{App, AppConfig, Page, RenderError, RouteTable};
    use std::sync::Arc;

    struct Slow;

    #[async_trait]
    impl Page for Slow {
        async fn setup(&self, app: &App) -> Result<(), RenderError> {
            app.use_async_data("slow", |fetch| async move { fetch.get("/api/slow", json!({})).await })
                .await?;
            Ok(())
        }

        fn render(&self, _app: &App) -> String {
            "<p>slow</p>".to_string()
        }
    }

    struct Fast;

    #[async_trait]
    impl Page for Fast {
        fn render(&self, _app: &App) -> String {
            "<p>fast</p>".to_string()
        }
    }

    fn manager(timeout: Duration) -> RenderManager {
        let mock = Arc::new(
            MockTransport::new()
                .reply("/api/slow", 200, json!({"code": 0}))
                .with_delay(Duration::from_millis(200)),
        );
        let def = AppDefinition::new(
            AppConfig::default(),
            RouteTable::new().route("/", Fast).route("/slow", Slow),
            mock,
        );
        RenderManager::new(def, "http://api.local", timeout)
    }

    // === Forwarded Header Tests ===

    #[test]
    fn test_forwarded_headers_selects_known_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("sid=1"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.9"));
        headers.insert("authorization", HeaderValue::from_static("secret"));

        let forwarded = forwarded_headers(&headers, Some("127.0.0.1".parse().unwrap()));

        assert_eq!(forwarded.len(), 3);
        assert_eq!(forwarded.get("Cookie").map(String::as_str), Some("sid=1"));
        assert_eq!(forwarded.get("X-Forwarded-For").map(String::as_str), Some("10.0.0.9"));
        assert!(!forwarded.contains_key("authorization"));
    }

    #[test]
    fn test_forwarded_for_falls_back_to_peer() {
        let forwarded = forwarded_headers(&HeaderMap::new(), Some("192.168.1.5".parse().unwrap()));
        assert_eq!(
            forwarded.get("X-Forwarded-For").map(String::as_str),
            Some("192.168.1.5")
        );
        assert_eq!(forwarded.len(), 1);

        assert!(forwarded_headers(&HeaderMap::new(), None).is_empty());
    }

    // === Render Tests ===

    #[tokio::test]
    async fn test_render_assigns_increasing_ids() {
        let manager = manager(Duration::from_secs(5));

        let (first, result) = manager.render("/", Headers::new(), Manifest::new()).await;
        let (second, _) = manager.render("/", Headers::new(), Manifest::new()).await;

        assert_eq!(first, RenderId(1));
        assert_eq!(second, RenderId(2));
        let page = result.unwrap();
        assert_eq!(page.html, "<p>fast</p>");
        assert_eq!(page.output.html_state.as_deref(), Some("{}"));
        assert_eq!(page.output.html_modules.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_render_timeout() {
        let manager = manager(Duration::from_millis(20));

        let (_, result) = manager.render("/slow", Headers::new(), Manifest::new()).await;

        assert!(matches!(result, Err(HostError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_render_not_found() {
        let manager = manager(Duration::from_secs(5));

        let (_, result) = manager.render("/missing?x=1", Headers::new(), Manifest::new()).await;

        assert!(matches!(result, Err(HostError::Render(RenderError::NotFound(_)))));
    }
}
