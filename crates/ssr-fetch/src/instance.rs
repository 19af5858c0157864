//! Fetch instances and the per-render factory that creates them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use ssr_core::{Headers, RenderContext, RenderId};

use crate::{
    resolve_url, split_url, ApiHost, FetchError, FetchOptions, Method, Request, RequestBuilder,
    ResponseEnvelope, Transport,
};

/// Header carrying a JSON copy of the original client's inbound headers.
pub const SSR_HEADERS: &str = "SSR-Headers";

/// Header carrying the render identifier.
pub const SSR_RENDER_ID: &str = "SSR-Render-ID";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Forwarded header withheld from hosts that are not API hosts.
const COOKIE: &str = "Cookie";

fn is_render_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(SSR_HEADERS) || name.eq_ignore_ascii_case(SSR_RENDER_ID)
}

/// A fetch function bound to zero or one render context.
///
/// Base URL, default headers and API hosts are fixed when the instance is
/// created and cannot be changed afterwards. Server instances belong to
/// exactly one render.
pub struct FetchInstance {
    transport: Arc<dyn Transport>,
    base_url: String,
    default_headers: Headers,
    forwarded: Option<Headers>,
    api_hosts: Vec<ApiHost>,
    timeout: Duration,
    render_id: Option<RenderId>,
}

impl fmt::Debug for FetchInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchInstance")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .field("api_hosts", &self.api_hosts)
            .field("timeout", &self.timeout)
            .field("render_id", &self.render_id)
            .finish()
    }
}

impl FetchInstance {
    /// Base URL relative requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Headers sent on every request to an API host.
    pub fn default_headers(&self) -> &Headers {
        &self.default_headers
    }

    /// Hosts that receive the full forwarded headers.
    pub fn api_hosts(&self) -> &[ApiHost] {
        &self.api_hosts
    }

    /// Render this instance is bound to, if any.
    pub fn render_id(&self) -> Option<RenderId> {
        self.render_id
    }

    /// Issue a request and unwrap the response envelope.
    ///
    /// For read methods `data` becomes query parameters, otherwise a JSON
    /// body. Transport and non-2xx failures are logged and returned as-is.
    pub async fn fetch(
        &self,
        url: &str,
        data: impl Serialize,
        options: FetchOptions,
    ) -> Result<ResponseEnvelope, FetchError> {
        let method = options.method;
        let result = match serde_json::to_value(data) {
            Ok(data) => self.send(url, &data, options).await,
            Err(e) => Err(e.into()),
        };

        if let Err(err) = &result {
            tracing::error!(
                method = %method,
                url = %url,
                render_id = ?self.render_id,
                error = %err,
                "fetch failed"
            );
        }
        result
    }

    /// GET with `data` as query parameters.
    pub async fn get(&self, url: &str, data: impl Serialize) -> Result<ResponseEnvelope, FetchError> {
        self.fetch(url, data, FetchOptions::default()).await
    }

    /// POST with `data` as a JSON body.
    pub async fn post(&self, url: &str, data: impl Serialize) -> Result<ResponseEnvelope, FetchError> {
        self.fetch(url, data, FetchOptions::new(Method::Post)).await
    }

    /// Shape the request that `fetch` would send.
    ///
    /// Per-call headers cannot replace `SSR-Headers` or `SSR-Render-ID`.
    /// On a server instance a URL on an API host keeps every forwarded
    /// header and is routed to the host's target; any other host gets the
    /// forwarded headers without `Cookie`.
    pub fn build_request(
        &self,
        url: &str,
        data: &Value,
        options: &FetchOptions,
    ) -> Result<Request, FetchError> {
        let mut full_url = resolve_url(&self.base_url, url);
        let Some((_, authority, _)) = split_url(&full_url) else {
            return Err(FetchError::InvalidUrl(full_url));
        };
        let authority = authority.to_string();

        let mut headers = self.default_headers.clone();
        for (name, value) in &options.headers {
            if is_render_header(name) {
                tracing::warn!(header = %name, "ignoring per-call render header");
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }

        if let Some(forwarded) = &self.forwarded {
            match self.api_hosts.iter().find(|api| api.matches(&authority)) {
                Some(api) => {
                    if let Some(target) = api.rewrite(&full_url) {
                        headers.insert("Host".to_string(), authority.clone());
                        full_url = target;
                    }
                }
                None => {
                    let scoped: Headers = forwarded
                        .iter()
                        .filter(|(name, _)| !name.eq_ignore_ascii_case(COOKIE))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    headers.insert(SSR_HEADERS.to_string(), serde_json::to_string(&scoped)?);
                }
            }
        }

        let builder = RequestBuilder::new(options.method, full_url)
            .headers(&headers)
            .timeout(options.timeout.unwrap_or(self.timeout))
            .payload(data)?;
        Ok(builder.build())
    }

    async fn send(
        &self,
        url: &str,
        data: &Value,
        options: FetchOptions,
    ) -> Result<ResponseEnvelope, FetchError> {
        let request = self.build_request(url, data, &options)?;
        tracing::debug!(method = %request.method, url = %request.url, "fetch");

        let response = self.transport.send(request).await?.error_for_status()?;
        Ok(ResponseEnvelope::from_body(&response.body)?.normalize())
    }
}

/// Creates fetch instances, one per render on the server.
#[derive(Clone)]
pub struct FetchFactory {
    transport: Arc<dyn Transport>,
    client_origin: String,
    timeout: Duration,
    origin_rewrite: Option<String>,
    api_hosts: Vec<ApiHost>,
}

impl fmt::Debug for FetchFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchFactory")
            .field("client_origin", &self.client_origin)
            .field("timeout", &self.timeout)
            .field("origin_rewrite", &self.origin_rewrite)
            .field("api_hosts", &self.api_hosts)
            .finish()
    }
}

impl FetchFactory {
    /// Create a factory over a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            client_origin: String::new(),
            timeout: DEFAULT_TIMEOUT,
            origin_rewrite: None,
            api_hosts: Vec::new(),
        }
    }

    /// Set the page origin used by client instances.
    pub fn with_client_origin(mut self, origin: impl Into<String>) -> Self {
        self.client_origin = origin.into();
        self
    }

    /// Set the default per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send server requests for the render origin to `target` instead.
    pub fn with_origin_rewrite(mut self, target: impl Into<String>) -> Self {
        self.origin_rewrite = Some(target.into());
        self
    }

    /// Add a host that receives the full forwarded headers.
    pub fn with_api_host(mut self, host: ApiHost) -> Self {
        self.api_hosts.push(host);
        self
    }

    /// Create a fetch instance.
    ///
    /// Without a context the instance is a client instance based at the page
    /// origin. With a context it is scoped to that render: the context's
    /// origin is the base URL and an API host, and the inbound headers and
    /// render id are forwarded on every request.
    pub fn create(&self, context: Option<&RenderContext>) -> FetchInstance {
        let mut default_headers = Headers::new();
        default_headers.insert("Content-Type".to_string(), "application/json".to_string());
        default_headers.insert("Accept".to_string(), "application/json".to_string());

        let Some(ctx) = context else {
            return FetchInstance {
                transport: Arc::clone(&self.transport),
                base_url: self.client_origin.clone(),
                default_headers,
                forwarded: None,
                api_hosts: Vec::new(),
                timeout: self.timeout,
                render_id: None,
            };
        };

        let forwarded = serde_json::to_string(&ctx.ssr_headers).unwrap_or_default();
        default_headers.insert(SSR_HEADERS.to_string(), forwarded);
        if let Some(id) = ctx.render_id {
            default_headers.insert(SSR_RENDER_ID.to_string(), id.to_string());
        }

        let mut api_hosts = Vec::with_capacity(self.api_hosts.len() + 1);
        if let Some(origin) = ApiHost::from_origin(&ctx.origin) {
            api_hosts.push(match &self.origin_rewrite {
                Some(target) => origin.with_target(target.clone()),
                None => origin,
            });
        }
        api_hosts.extend(self.api_hosts.iter().cloned());

        FetchInstance {
            transport: Arc::clone(&self.transport),
            base_url: ctx.origin.clone(),
            default_headers,
            forwarded: Some(ctx.ssr_headers.clone()),
            api_hosts,
            timeout: self.timeout,
            render_id: ctx.render_id,
        }
    }
}
