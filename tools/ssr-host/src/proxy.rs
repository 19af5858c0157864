//! Reverse proxy for configured path prefixes.
//!
//! Locations are tried longest path first. A matched request is sent to the
//! location's target with the path optionally rewritten, and `Set-Cookie`
//! domains in the answer are pointed back at the host the visitor used.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http::header::{CONTENT_LENGTH, HOST, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use ssr_fetch::split_url;

use crate::config::{ProxyConfig, ProxyLocation};
use crate::error::ProxyError;

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    path: String,
    origin: String,
    base_path: String,
    rewrite: Option<(String, String)>,
}

impl Route {
    fn from_location(location: &ProxyLocation) -> Result<Self, ProxyError> {
        let invalid_target = || ProxyError::InvalidTarget {
            path: location.path.clone(),
            target: location.target.clone(),
        };
        let (scheme, authority, rest) = split_url(&location.target).ok_or_else(invalid_target)?;
        let base_path = rest.split(['?', '#']).next().unwrap_or_default();

        let rewrite = match location.rewrite.as_slice() {
            [] => None,
            [from, to] => Some((from.clone(), to.clone())),
            _ => {
                return Err(ProxyError::InvalidRewrite {
                    path: location.path.clone(),
                })
            }
        };

        Ok(Self {
            path: location.path.clone(),
            origin: format!("{}://{}", scheme.to_ascii_lowercase(), authority),
            base_path: base_path.to_string(),
            rewrite,
        })
    }

    /// Upstream URL for an inbound path and query.
    fn target_url(&self, path: &str, query: Option<&str>) -> String {
        let path = match &self.rewrite {
            Some((from, to)) if !from.is_empty() => path.replacen(from.as_str(), to, 1),
            _ => path.to_string(),
        };
        let mut url = format!("{}{}", self.origin, join_paths(&self.base_path, &path));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

/// Join two URL paths and normalise the result: empty and `.` segments are
/// dropped, `..` removes its parent, and there is no trailing slash.
fn join_paths(base: &str, path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(path.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// `host` with any `:port` suffix removed. IPv6 brackets are dropped too.
fn host_without_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split_once(']').map(|(h, _)| h).unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Point a `Set-Cookie` value at `host`.
///
/// A cookie without a `Domain` attribute is returned unchanged. Otherwise
/// the domain is replaced, and when the visitor came over plain HTTP the
/// `Secure` and `SameSite` attributes are removed so the browser keeps it.
pub fn rewrite_set_cookie(cookie: &str, host: &str, is_http: bool) -> String {
    let mut replaced = false;
    let parts: Vec<String> = cookie
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            let lower = part.to_ascii_lowercase();
            if lower.starts_with("domain=") {
                replaced = true;
                return Some(format!("Domain={}", host));
            }
            if lower.is_empty()
                || (is_http && (lower.starts_with("secure") || lower.starts_with("samesite=")))
            {
                return None;
            }
            Some(part.to_string())
        })
        .collect();

    if replaced {
        parts.join("; ")
    } else {
        cookie.to_string()
    }
}

/// Forwards requests under configured path prefixes to upstream servers.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    routes: Vec<Route>,
    client: reqwest::Client,
}

impl ReverseProxy {
    /// Build the proxy, or `None` when no locations are configured.
    pub fn from_config(config: &ProxyConfig) -> Result<Option<Self>, ProxyError> {
        if config.locations.is_empty() {
            return Ok(None);
        }

        let mut routes = config
            .locations
            .iter()
            .map(Route::from_location)
            .collect::<Result<Vec<_>, _>>()?;
        routes.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Some(Self { routes, client }))
    }

    /// Check if `path` falls under a proxied location.
    pub fn matches(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    fn find(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| path.starts_with(&route.path))
    }

    /// Forward `request` upstream and relay the answer.
    ///
    /// An unreadable request body answers 400, an unreachable upstream 502.
    pub async fn forward(&self, request: Request) -> Response {
        let path = request.uri().path().to_string();
        let Some(route) = self.find(&path) else {
            return StatusCode::NOT_FOUND.into_response();
        };

        match self.send(route, request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(path = %path, error = %err, "proxy request failed");
                match err {
                    ProxyError::Body(_) => StatusCode::BAD_REQUEST.into_response(),
                    _ => StatusCode::BAD_GATEWAY.into_response(),
                }
            }
        }
    }

    async fn send(&self, route: &Route, request: Request) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let url = route.target_url(parts.uri.path(), parts.uri.query());
        let body = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| ProxyError::Body(e.to_string()))?;

        let forwarded_host = parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(host_without_port)
            .filter(|h| !h.is_empty())
            .map(str::to_string);
        let is_http = !parts
            .headers
            .get("x-forwarded-proto")
            .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"https"));

        let mut headers = HeaderMap::new();
        for (name, value) in &parts.headers {
            if name != HOST && !is_hop_by_hop(name) && name != CONTENT_LENGTH {
                headers.append(name.clone(), value.clone());
            }
        }
        if let Some(value) = forwarded_host
            .as_deref()
            .and_then(|h| HeaderValue::from_str(h).ok())
        {
            headers.insert(HeaderName::from_static("x-forwarded-host"), value);
        }
        headers.insert(
            HeaderName::from_static("x-forwarded-proto"),
            HeaderValue::from_static(if is_http { "http" } else { "https" }),
        );

        tracing::debug!(path = %parts.uri.path(), upstream = %url, "proxy");
        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let mut relayed = HeaderMap::new();
        for (name, value) in upstream.headers() {
            if is_hop_by_hop(name) || name == CONTENT_LENGTH {
                continue;
            }
            let value = match (&forwarded_host, name == SET_COOKIE, value.to_str()) {
                (Some(host), true, Ok(cookie)) => {
                    HeaderValue::from_str(&rewrite_set_cookie(cookie, host, is_http))
                        .unwrap_or_else(|_| value.clone())
                }
                _ => value.clone(),
            };
            relayed.append(name.clone(), value);
        }
        let bytes = upstream.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = relayed;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::Json;
    use axum::Router;
    use http::Uri;
    use serde_json::{json, Value};

    fn location(path: &str, target: &str, rewrite: &[&str]) -> ProxyLocation {
        ProxyLocation {
            path: path.to_string(),
            target: target.to_string(),
            rewrite: rewrite.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn proxy(locations: Vec<ProxyLocation>) -> ReverseProxy {
        ReverseProxy::from_config(&ProxyConfig { locations })
            .unwrap()
            .unwrap()
    }

    // === Config Tests ===

    #[test]
    fn test_no_locations_means_no_proxy() {
        assert!(ReverseProxy::from_config(&ProxyConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_invalid_locations_rejected() {
        let err = ReverseProxy::from_config(&ProxyConfig {
            locations: vec![location("/api", "127.0.0.1:9000", &[])],
        })
        .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidTarget { .. }));

        let err = ReverseProxy::from_config(&ProxyConfig {
            locations: vec![location("/api", "http://127.0.0.1:9000", &["/api"])],
        })
        .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRewrite { .. }));
    }

    // === Routing Tests ===

    #[test]
    fn test_longest_prefix_wins() {
        let proxy = proxy(vec![
            location("/api", "http://general:9000", &[]),
            location("/api/admin", "http://admin:9001", &[]),
        ]);

        assert_eq!(proxy.find("/api/admin/users").unwrap().origin, "http://admin:9001");
        assert_eq!(proxy.find("/api/items").unwrap().origin, "http://general:9000");
        assert!(proxy.matches("/apiv2"));
        assert!(!proxy.matches("/"));
    }

    #[test]
    fn test_target_url_rewrite_and_join() {
        let route = Route::from_location(&location(
            "/legacy/",
            "http://backend:9000/v2/",
            &["/legacy", ""],
        ))
        .unwrap();

        assert_eq!(
            route.target_url("/legacy/items/", Some("page=2")),
            "http://backend:9000/v2/items?page=2"
        );
        assert_eq!(route.target_url("/legacy/", None), "http://backend:9000/v2");

        let plain = Route::from_location(&location("/api", "http://backend:9000", &[])).unwrap();
        assert_eq!(plain.target_url("/api/a/../b", Some("")), "http://backend:9000/api/b");
    }

    #[test]
    fn test_rewrite_replaces_first_occurrence_only() {
        let route =
            Route::from_location(&location("/x", "http://b", &["/x", "/y"])).unwrap();
        assert_eq!(route.target_url("/x/x", None), "http://b/y/x");
    }

    #[test]
    fn test_host_without_port() {
        assert_eq!(host_without_port("shop.test:8080"), "shop.test");
        assert_eq!(host_without_port("shop.test"), "shop.test");
        assert_eq!(host_without_port("[::1]:8080"), "::1");
        assert_eq!(host_without_port("127.0.0.1"), "127.0.0.1");
    }

    // === Cookie Tests ===

    #[test]
    fn test_cookie_domain_rewritten_over_http() {
        assert_eq!(
            rewrite_set_cookie(
                "sid=1; Domain=backend.internal; Path=/; Secure; SameSite=None",
                "shop.test",
                true
            ),
            "sid=1; Domain=shop.test; Path=/"
        );
    }

    #[test]
    fn test_cookie_keeps_secure_over_https() {
        assert_eq!(
            rewrite_set_cookie("sid=1;domain=.backend;Secure;SameSite=Lax", "shop.test", false),
            "sid=1; Domain=shop.test; Secure; SameSite=Lax"
        );
    }

    #[test]
    fn test_cookie_without_domain_untouched() {
        let cookie = "sid=1; Path=/; Secure";
        assert_eq!(rewrite_set_cookie(cookie, "shop.test", true), cookie);
    }

    // === Forwarding Tests ===

    async fn echo(uri: Uri, headers: HeaderMap) -> impl IntoResponse {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        (
            [(
                SET_COOKIE,
                "sid=1; Domain=backend.internal; Path=/; Secure; SameSite=Lax",
            )],
            Json(json!({
                "path": uri.path(),
                "query": uri.query(),
                "host": header("host"),
                "forwardedHost": header("x-forwarded-host"),
                "forwardedProto": header("x-forwarded-proto"),
                "cookie": header("cookie"),
            })),
        )
    }

    async fn spawn_backend() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().fallback(echo)).await.unwrap();
        });
        addr
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_forward_rewrites_path_and_headers() {
        let addr = spawn_backend().await;
        let proxy = proxy(vec![location(
            "/svc",
            &format!("http://{}/base", addr),
            &["/svc", ""],
        )]);

        let request = Request::builder()
            .uri("/svc/echo?x=1")
            .header(HOST, "shop.test:8080")
            .header("cookie", "sid=visitor")
            .body(Body::empty())
            .unwrap();
        let response = proxy.forward(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(SET_COOKIE).unwrap(),
            "sid=1; Domain=shop.test; Path=/"
        );
        let body = json_body(response).await;
        assert_eq!(body["path"], "/base/echo");
        assert_eq!(body["query"], "x=1");
        assert_eq!(body["host"], addr.to_string());
        assert_eq!(body["forwardedHost"], "shop.test");
        assert_eq!(body["forwardedProto"], "http");
        assert_eq!(body["cookie"], "sid=visitor");
    }

    #[tokio::test]
    async fn test_forward_behind_tls_keeps_secure_cookie() {
        let addr = spawn_backend().await;
        let proxy = proxy(vec![location("/", &format!("http://{}", addr), &[])]);

        let request = Request::builder()
            .uri("/anything")
            .header(HOST, "shop.test")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();
        let response = proxy.forward(request).await;

        assert_eq!(
            response.headers().get(SET_COOKIE).unwrap(),
            "sid=1; Domain=shop.test; Path=/; Secure; SameSite=Lax"
        );
        assert_eq!(json_body(response).await["forwardedProto"], "https");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let proxy = proxy(vec![location("/api", "http://127.0.0.1:1", &[])]);
        let request = Request::builder()
            .uri("/api/x")
            .body(Body::empty())
            .unwrap();

        assert_eq!(proxy.forward(request).await.status(), StatusCode::BAD_GATEWAY);
    }
}
