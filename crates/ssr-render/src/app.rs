//! Application assembly for server and client instances.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use ssr_core::{Environment, RenderContext};
use ssr_fetch::{ApiHost, FetchError, FetchFactory, FetchInstance, Transport, DEFAULT_TIMEOUT};
use ssr_store::{Binding, DataError, DataScope};

use crate::{HeadManager, RenderError, RouteMatch, RouteTable, Router};

/// A page handler.
///
/// `setup` runs once per app instance after routing: it binds async data,
/// sets head tags, and may ask for a redirect or report not-found. On the
/// server it runs before the prefetch phase; `render` runs after it, so
/// bound data is read from the cache.
#[async_trait]
pub trait Page: Send + Sync {
    async fn setup(&self, _app: &App) -> Result<(), RenderError> {
        Ok(())
    }

    fn render(&self, app: &App) -> String;

    /// Identifier of the lazily loaded module backing this page.
    fn module_id(&self) -> Option<&str> {
        None
    }
}

impl fmt::Debug for dyn Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.module_id() {
            Some(id) => write!(f, "Page({})", id),
            None => f.write_str("Page"),
        }
    }
}

/// Configuration for an application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Application name.
    pub name: String,
    /// Default page title.
    pub default_title: String,
    /// Per-request fetch timeout.
    pub fetch_timeout: Duration,
    /// Internal URL server fetches to the render origin are sent to.
    pub origin_rewrite: Option<String>,
    /// Hosts besides the render origin that receive forwarded cookies.
    pub api_hosts: Vec<ApiHost>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "ssr-app".to_string(),
            default_title: "SSR App".to_string(),
            fetch_timeout: DEFAULT_TIMEOUT,
            origin_rewrite: None,
            api_hosts: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Create a new configuration with the given app name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the default page title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.default_title = title.into();
        self
    }

    /// Set the per-request fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Send server fetches for the render origin to `target`.
    pub fn with_origin_rewrite(mut self, target: impl Into<String>) -> Self {
        self.origin_rewrite = Some(target.into());
        self
    }

    /// Add an API host.
    pub fn with_api_host(mut self, host: ApiHost) -> Self {
        self.api_hosts.push(host);
        self
    }
}

/// Process-wide, immutable application wiring: config, routes, and the
/// transport every fetch instance goes through.
///
/// Shared by all renders; each render builds its own [`App`] from it.
#[derive(Clone)]
pub struct AppDefinition {
    config: AppConfig,
    routes: Arc<RouteTable>,
    fetch: FetchFactory,
}

impl fmt::Debug for AppDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppDefinition")
            .field("config", &self.config)
            .field("routes", &self.routes.len())
            .finish()
    }
}

impl AppDefinition {
    /// Create a definition.
    pub fn new(config: AppConfig, routes: RouteTable, transport: Arc<dyn Transport>) -> Self {
        let mut fetch = FetchFactory::new(transport).with_timeout(config.fetch_timeout);
        if let Some(target) = &config.origin_rewrite {
            fetch = fetch.with_origin_rewrite(target.clone());
        }
        for host in &config.api_hosts {
            fetch = fetch.with_api_host(host.clone());
        }
        Self {
            config,
            routes: Arc::new(routes),
            fetch,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The shared route table.
    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// The fetch-instance factory.
    pub fn fetch_factory(&self) -> &FetchFactory {
        &self.fetch
    }
}

/// One application instance: router, data scope, head manager and fetch
/// instance, created together and never shared between renders.
#[derive(Debug)]
pub struct App {
    env: Environment,
    config: AppConfig,
    router: Router,
    data: DataScope,
    head: HeadManager,
    modules: Mutex<BTreeSet<String>>,
}

impl App {
    /// Build a server instance bound to one render context.
    pub fn server(def: &AppDefinition, ctx: &RenderContext) -> Self {
        let fetch = def.fetch.create(Some(ctx));
        Self::assemble(def, Environment::Server, fetch)
    }

    /// Build a client instance whose fetches are based at `origin`.
    pub fn client(def: &AppDefinition, origin: &str) -> Self {
        let fetch = def.fetch.clone().with_client_origin(origin).create(None);
        Self::assemble(def, Environment::Client, fetch)
    }

    fn assemble(def: &AppDefinition, env: Environment, fetch: FetchInstance) -> Self {
        tracing::trace!(app = %def.config.name, env = %env, "assembling app");
        Self {
            env,
            config: def.config.clone(),
            router: Router::new(Arc::clone(&def.routes)),
            data: DataScope::new(env, fetch),
            head: HeadManager::with_title(def.config.default_title.clone()),
            modules: Mutex::default(),
        }
    }

    /// Where this instance runs.
    pub fn env(&self) -> Environment {
        self.env
    }

    /// The app configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The instance's router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Mutable router, for navigation.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Current route, if any.
    pub fn route(&self) -> Option<&RouteMatch> {
        self.router.current()
    }

    /// The instance's data scope.
    pub fn data(&self) -> &DataScope {
        &self.data
    }

    /// The instance's fetch instance.
    pub fn fetch(&self) -> &Arc<FetchInstance> {
        self.data.fetch()
    }

    /// The instance's head manager.
    pub fn head(&self) -> &HeadManager {
        &self.head
    }

    /// Bind `key` to a data-producing function. See
    /// [`DataScope::use_async_data`].
    pub async fn use_async_data<T, F, Fut>(
        &self,
        key: impl Into<String>,
        producer: F,
    ) -> Result<Binding, DataError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(Arc<FetchInstance>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        self.data.use_async_data(key, producer).await
    }

    /// Record a lazily loaded module used by this render.
    pub fn use_module(&self, id: impl Into<String>) {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into());
    }

    /// Modules recorded so far.
    pub fn modules(&self) -> BTreeSet<String> {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssr_fetch::testing::MockTransport;

    struct Blank;

    #[async_trait]
    impl Page for Blank {
        fn render(&self, _app: &App) -> String {
            String::new()
        }
    }

    fn definition() -> AppDefinition {
        AppDefinition::new(
            AppConfig::new("demo").with_title("Demo"),
            RouteTable::new().route("/", Blank),
            Arc::new(MockTransport::new()),
        )
    }

    // === AppConfig Tests ===

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.name, "ssr-app");
        assert_eq!(config.fetch_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_app_config_builder_chain() {
        let config = AppConfig::new("shop")
            .with_title("My Shop")
            .with_fetch_timeout(Duration::from_secs(3));

        assert_eq!(config.name, "shop");
        assert_eq!(config.default_title, "My Shop");
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_definition_applies_api_hosts() {
        let def = AppDefinition::new(
            AppConfig::new("shop")
                .with_origin_rewrite("http://10.0.0.1:9000")
                .with_api_host(ApiHost::new("api.shop.test")),
            RouteTable::new().route("/", Blank),
            Arc::new(MockTransport::new()),
        );
        let ctx = RenderContext::new("/", "https://shop.test");
        let fetch = def.fetch_factory().create(Some(&ctx));

        assert_eq!(
            fetch.api_hosts(),
            &[
                ApiHost::new("shop.test").with_target("http://10.0.0.1:9000"),
                ApiHost::new("api.shop.test"),
            ]
        );
    }

    // === App Tests ===

    #[test]
    fn test_server_app_bound_to_context() {
        let def = definition();
        let ctx = RenderContext::new("/", "http://api.local").with_header("Cookie", "a=1");
        let app = App::server(&def, &ctx);

        assert_eq!(app.env(), Environment::Server);
        assert_eq!(app.fetch().base_url(), "http://api.local");
        assert!(app.fetch().default_headers().contains_key(ssr_fetch::SSR_HEADERS));
        assert_eq!(app.head().snapshot().title.as_deref(), Some("Demo"));
    }

    #[test]
    fn test_client_app_uses_origin() {
        let def = definition();
        let app = App::client(&def, "http://page.local");

        assert_eq!(app.env(), Environment::Client);
        assert_eq!(app.fetch().base_url(), "http://page.local");
        assert!(!app.fetch().default_headers().contains_key(ssr_fetch::SSR_HEADERS));
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let def = definition();
        let ctx = RenderContext::new("/", "http://api.local");
        let a = App::server(&def, &ctx);
        let b = App::server(&def, &ctx);

        a.data().cache().set_data("k", serde_json::json!(1));
        a.head().set_title("A");
        a.use_module("a.js");

        assert!(b.data().cache().is_empty());
        assert_eq!(b.head().snapshot().title.as_deref(), Some("Demo"));
        assert!(b.modules().is_empty());
        assert!(Arc::ptr_eq(a.router().table(), b.router().table()));
    }
}
