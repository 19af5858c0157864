//! Demo application served by the host.
//!
//! `/` shows the caller's address, fetched once during the server render
//! from the demo `/api/ip` endpoint and reused by the client. `/test` is
//! rendered on the client only.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ConnectInfo;
use axum::Json;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ssr_fetch::{Transport, SSR_HEADERS};
use ssr_render::{App, AppConfig, AppDefinition, Page, RenderError, RouteTable};

/// Cache key of the caller info bound by the home page.
pub const IP_KEY: &str = "ip";

/// Caller info answered by `/api/ip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpInfo {
    pub ip: String,
    #[serde(default)]
    pub user_agent: String,
    /// Whether the request came from a server render.
    #[serde(default)]
    pub via_ssr: bool,
}

struct HomePage;

#[async_trait]
impl Page for HomePage {
    async fn setup(&self, app: &App) -> Result<(), RenderError> {
        app.head().set_title("Home");
        app.head().add_meta("description", "Server-rendered page with hydrated data");

        app.use_async_data(IP_KEY, |fetch| async move {
            let envelope = fetch.get("/api/ip", json!({})).await?;
            serde_json::from_value::<IpInfo>(Value::Object(envelope.payload))
                .map_err(|e| ssr_fetch::FetchError::ParseError(e.to_string()))
        })
        .await?;
        Ok(())
    }

    fn render(&self, app: &App) -> String {
        match app.data().cache().get::<IpInfo>(IP_KEY) {
            Ok(Some(info)) => format!(
                "<main><h1>Hello</h1><p>Your address: <code>{}</code></p><p>{}</p></main>",
                escape(&info.ip),
                escape(&info.user_agent)
            ),
            _ => "<main><h1>Hello</h1><p>Loading…</p></main>".to_string(),
        }
    }

    fn module_id(&self) -> Option<&str> {
        Some("src/pages/home.rs")
    }
}

struct TestPage;

#[async_trait]
impl Page for TestPage {
    fn render(&self, _app: &App) -> String {
        "<main><h1>Test</h1></main>".to_string()
    }

    fn module_id(&self) -> Option<&str> {
        Some("src/pages/test.rs")
    }
}

/// Routes of the demo application.
pub fn routes() -> RouteTable {
    RouteTable::new()
        .route("/", HomePage)
        .client_only("/test", TestPage)
}

/// Base configuration of the demo application.
pub fn app_config() -> AppConfig {
    AppConfig::new("ssr-demo").with_title("SSR Demo")
}

/// The demo application wired to `transport`.
pub fn definition(transport: Arc<dyn Transport>, config: AppConfig) -> AppDefinition {
    AppDefinition::new(config, routes(), transport)
}

/// `GET /api/ip`: report the caller.
///
/// Requests issued by a server render carry the original caller in
/// `SSR-Headers`; those are preferred over the direct peer.
pub async fn api_ip(ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap) -> Json<Value> {
    let info = caller_info(&headers, peer);
    tracing::debug!(ip = %info.ip, via_ssr = info.via_ssr, "api ip");
    Json(json!({
        "code": ssr_fetch::SUCCESS_SENTINEL,
        "ip": info.ip,
        "userAgent": info.user_agent,
        "viaSsr": info.via_ssr,
    }))
}

/// Work out who is calling, through a render or directly.
pub fn caller_info(headers: &HeaderMap, peer: SocketAddr) -> IpInfo {
    let forwarded: Option<serde_json::Map<String, Value>> = headers
        .get(SSR_HEADERS)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| serde_json::from_str(v).ok());

    let header = |name: &str| -> Option<String> {
        match &forwarded {
            Some(map) => map.get(name).and_then(Value::as_str).map(str::to_string),
            None => headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    };

    let ip = header("X-Forwarded-For")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string());

    IpInfo {
        ip,
        user_agent: header("User-Agent").unwrap_or_default(),
        via_ssr: forwarded.is_some(),
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use http::HeaderValue;
    use ssr_core::RenderContext;
    use ssr_fetch::testing::MockTransport;
    use ssr_fetch::Response;

    fn peer() -> SocketAddr {
        "10.1.1.1:5000".parse().unwrap()
    }

    // === Endpoint Tests ===

    #[test]
    fn test_caller_info_direct() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("browser/1"));

        let info = caller_info(&headers, peer());
        assert_eq!(info.ip, "10.1.1.1");
        assert_eq!(info.user_agent, "browser/1");
        assert!(!info.via_ssr);
    }

    #[test]
    fn test_caller_info_through_render() {
        let mut headers = HeaderMap::new();
        headers.insert(
            SSR_HEADERS,
            HeaderValue::from_static(r#"{"User-Agent":"browser/2","X-Forwarded-For":"8.8.8.8, 10.0.0.1"}"#),
        );
        headers.insert("user-agent", HeaderValue::from_static("reqwest"));

        let info = caller_info(&headers, peer());
        assert_eq!(info.ip, "8.8.8.8");
        assert_eq!(info.user_agent, "browser/2");
        assert!(info.via_ssr);
    }

    #[tokio::test]
    async fn test_api_ip_envelope() {
        let Json(body) = api_ip(ConnectInfo(peer()), HeaderMap::new()).await;
        assert_eq!(body["code"], json!(0));
        assert_eq!(body["ip"], json!("10.1.1.1"));
    }

    // === App Tests ===

    #[tokio::test]
    async fn test_home_renders_caller_from_backend() {
        let mock = Arc::new(MockTransport::new().respond_with("/api/ip", |request| {
            let mut headers = HeaderMap::new();
            if let Some(forwarded) = request.header(SSR_HEADERS) {
                if let Ok(value) = HeaderValue::from_str(forwarded) {
                    headers.insert(SSR_HEADERS, value);
                }
            }
            let info = caller_info(&headers, "127.0.0.1:1".parse().unwrap());
            Response::json_body(200, &json!({"code": 0, "ip": info.ip, "userAgent": info.user_agent, "viaSsr": info.via_ssr}))
        }));
        let def = definition(mock.clone(), app_config().with_fetch_timeout(Duration::from_secs(1)));
        let mut ctx = RenderContext::new("/", "http://127.0.0.1:8080")
            .with_header("X-Forwarded-For", "203.0.113.7")
            .with_header("User-Agent", "<script>");

        let html = ssr_render::render_to_string(&def, &mut ctx).await.unwrap();

        assert!(html.contains("<code>203.0.113.7</code>"));
        assert!(html.contains("&lt;script&gt;"));
        let state: Value = serde_json::from_str(ctx.output.html_state.as_deref().unwrap()).unwrap();
        assert_eq!(state[IP_KEY]["ip"], json!("203.0.113.7"));
        assert_eq!(state[IP_KEY]["viaSsr"], json!(true));
        assert!(ctx.output.html_meta.unwrap().contains("<title>Home</title>"));

        let mounted = ssr_render::hydrate(&def, "http://127.0.0.1:8080", "/", ctx.output.html_state.as_deref())
            .await
            .unwrap();
        assert_eq!(mounted.html, html);
        assert_eq!(mock.count("/api/ip"), 1);
    }

    #[tokio::test]
    async fn test_test_page_is_client_only() {
        let def = definition(Arc::new(MockTransport::new()), app_config());
        let mut ctx = RenderContext::new("/test", "http://127.0.0.1:8080");

        let err = ssr_render::render_to_string(&def, &mut ctx).await.unwrap_err();
        assert!(matches!(err, RenderError::SsrOff(_)));
    }
}
