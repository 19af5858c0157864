//! HTTP server: static assets, proxied locations, the demo API, and
//! server-rendered pages.
//!
//! Requests are dispatched in this order: the assets prefix, proxied
//! locations, fixed routes (`/api/ip`, `robots.txt`, favicons), then SSR.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use http::header::LOCATION;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use ssr_render::AppDefinition;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::config::{HostConfig, SsrConfig};
use crate::demo;
use crate::index_html::{IndexHtml, PageResponse};
use crate::matchpath::match_any;
use crate::proxy::ReverseProxy;
use crate::render_manager::{forwarded_headers, RenderManager};

/// Files served from the public directory root.
const ROOT_FILES: [&str; 3] = ["robots.txt", "favicon.svg", "favicon.ico"];

/// Response header policy derived from the `[ssr]` config.
#[derive(Debug, Clone, Default)]
pub struct HeaderPolicy {
    base: BTreeMap<String, String>,
    allow_iframe_paths: Vec<String>,
    allow_shared_array_buffer_paths: Vec<String>,
}

impl HeaderPolicy {
    /// Build the policy from config.
    pub fn from_config(ssr: &SsrConfig) -> Self {
        Self {
            base: ssr.parsed_response_headers(),
            allow_iframe_paths: ssr.allow_iframe_paths.clone(),
            allow_shared_array_buffer_paths: ssr.allow_shared_array_buffer_paths.clone(),
        }
    }

    /// Headers for a page response at `path`.
    ///
    /// Framing is restricted to the same origin unless the path is allowed
    /// to be framed; paths allowed to use `SharedArrayBuffer` are served
    /// cross-origin isolated.
    pub fn headers_for(&self, path: &str) -> BTreeMap<String, String> {
        let mut headers = self.base.clone();
        if !match_any(path, &self.allow_iframe_paths) {
            headers.insert(
                "Content-Security-Policy".to_string(),
                "form-action 'self'; frame-ancestors 'self';".to_string(),
            );
        }
        if match_any(path, &self.allow_shared_array_buffer_paths) {
            headers.insert("Cross-Origin-Opener-Policy".to_string(), "same-origin".to_string());
            headers.insert(
                "Cross-Origin-Embedder-Policy".to_string(),
                "credentialless".to_string(),
            );
        }
        headers
    }
}

/// State shared by request handlers.
#[derive(Debug)]
pub struct HostState {
    pub manager: RenderManager,
    pub index: IndexHtml,
    pub headers: HeaderPolicy,
    pub proxy: Option<ReverseProxy>,
    pub assets_prefix: String,
}

impl HostState {
    fn is_asset(&self, path: &str) -> bool {
        let prefix = self.assets_prefix.trim_end_matches('/');
        !prefix.is_empty() && path.starts_with(prefix)
    }
}

/// Assemble the router over the files in `public_dir`.
pub fn router(state: Arc<HostState>, public_dir: &Path) -> Router {
    let mut router = Router::new().route("/api/ip", get(demo::api_ip));
    for name in ROOT_FILES {
        router = router.route_service(&format!("/{}", name), ServeFile::new(public_dir.join(name)));
    }

    let prefix = state.assets_prefix.trim_end_matches('/');
    if !prefix.is_empty() {
        let assets_dir = public_dir.join(prefix.trim_start_matches('/'));
        router = router.nest_service(prefix, ServeDir::new(assets_dir));
    }

    router
        .fallback(ssr_handler)
        .layer(middleware::from_fn_with_state(state.clone(), proxy_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn proxy_requests(State(state): State<Arc<HostState>>, request: Request, next: Next) -> Response {
    if let Some(proxy) = &state.proxy {
        let path = request.uri().path();
        if !state.is_asset(path) && proxy.matches(path) {
            tracing::debug!(path = %path, "proxy");
            return proxy.forward(request).await;
        }
    }
    next.run(request).await
}

async fn ssr_handler(
    State(state): State<Arc<HostState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let url = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let forwarded = forwarded_headers(&headers, Some(peer.ip()));

    let (_, result) = state
        .manager
        .render(url, forwarded, state.index.manifest())
        .await;
    let page = state.index.compose(&result);

    build_response(page, state.headers.headers_for(uri.path()))
}

/// Turn a composed page into an HTTP response.
pub fn build_response(page: PageResponse, headers: BTreeMap<String, String>) -> Response {
    match page {
        PageResponse::Redirect { status, location } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FOUND);
            (status, [(LOCATION, location)]).into_response()
        }
        PageResponse::Html { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            let mut response = (status, Html(body)).into_response();
            for (name, value) in headers {
                match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().insert(name, value);
                    }
                    _ => tracing::warn!(header = %name, "skipping invalid response header"),
                }
            }
            response
        }
    }
}

/// Load the build, bind, and serve until interrupted.
pub async fn serve(config: &HostConfig, def: AppDefinition) -> Result<()> {
    let base = std::env::current_dir().context("Failed to get current directory")?;
    let public_dir = config.ssr.public_dir(&base);
    let index = IndexHtml::load(config.env, &public_dir)
        .with_context(|| format!("Failed to load index.html from {}", public_dir.display()))?;

    let proxy = ReverseProxy::from_config(&config.proxy).context("Invalid [proxy] config")?;

    let state = Arc::new(HostState {
        manager: RenderManager::new(def, config.ssr.origin.clone(), config.ssr.timeout()),
        index,
        headers: HeaderPolicy::from_config(&config.ssr),
        proxy,
        assets_prefix: config.ssr.assets_prefix.clone(),
    });
    let timeout = state.manager.timeout();
    let proxied = config.proxy.locations.len();
    let app = router(state, &public_dir);

    let listener = tokio::net::TcpListener::bind(&config.server_host)
        .await
        .with_context(|| format!("Failed to bind {}", config.server_host))?;
    tracing::info!(
        addr = %config.server_host,
        env = ?config.env,
        public_dir = %public_dir.display(),
        timeout = ?timeout,
        proxied,
        "ssr-host listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
