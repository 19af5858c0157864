//! Host configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use ssr_fetch::{split_url, ApiHost};
use ssr_render::AppConfig;

use crate::logging::LogConfig;

/// Lowest accepted render timeout, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Highest accepted render timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 120;

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostEnv {
    /// Files are re-read on every request.
    Dev,
    /// Files are read once at startup.
    #[default]
    Prod,
}

/// Host configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Listen address.
    #[serde(default = "default_server_host")]
    pub server_host: String,

    /// Deployment environment.
    #[serde(default)]
    pub env: HostEnv,

    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,

    /// Render configuration.
    #[serde(default)]
    pub ssr: SsrConfig,

    /// Reverse proxy locations.
    #[serde(default)]
    pub proxy: ProxyConfig,
}

fn default_server_host() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            env: HostEnv::default(),
            log: LogConfig::default(),
            ssr: SsrConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Self = if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))?
        };
        config.validated()
    }

    /// Check required fields and clamp both timeouts.
    pub fn validated(mut self) -> Result<Self> {
        if self.ssr.origin.trim().is_empty() {
            bail!("ssr.origin is empty");
        }
        if !self.ssr.origin.starts_with("http://") && !self.ssr.origin.starts_with("https://") {
            bail!("ssr.origin must be an http(s) url: {}", self.ssr.origin);
        }
        if self.ssr.dist_dir.trim().is_empty() {
            bail!("ssr.dist_dir is empty");
        }
        if !self.ssr.origin_rewrite.is_empty() && split_url(&self.ssr.origin_rewrite).is_none() {
            bail!("ssr.origin_rewrite must be an http(s) url: {}", self.ssr.origin_rewrite);
        }
        for api in &self.ssr.api_hosts {
            if api.host.trim().is_empty() {
                bail!("ssr.api_hosts entry has an empty host");
            }
            if let Some(target) = &api.target {
                if split_url(target).is_none() {
                    bail!("ssr.api_hosts {}: target must be an http(s) url: {}", api.host, target);
                }
            }
        }
        self.ssr.timeout = self.ssr.timeout.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
        self.ssr.fetch_timeout = self
            .ssr
            .fetch_timeout
            .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
        Ok(self)
    }
}

/// Render configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsrConfig {
    /// Build output directory; pages and assets live in its `public` child.
    #[serde(default = "default_dist_dir")]
    pub dist_dir: String,

    /// Render timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Per-request timeout of server-side fetches, in seconds.
    #[serde(default = "default_timeout")]
    pub fetch_timeout: u64,

    /// Base URL for server-side fetches.
    #[serde(default)]
    pub origin: String,

    /// Internal URL that server fetches to `origin` are sent to instead.
    /// The `Host` header keeps the origin's authority.
    #[serde(default)]
    pub origin_rewrite: String,

    /// Other hosts that receive the visitor's cookies on server fetches.
    #[serde(default)]
    pub api_hosts: Vec<ApiHostConfig>,

    /// Extra response headers, as `"Name: value"`.
    #[serde(default)]
    pub response_headers: Vec<String>,

    /// Path patterns that may be framed by other origins.
    #[serde(default)]
    pub allow_iframe_paths: Vec<String>,

    /// Path patterns served cross-origin isolated.
    #[serde(default)]
    pub allow_shared_array_buffer_paths: Vec<String>,

    /// URL prefix under which static assets are served.
    #[serde(default = "default_assets_prefix")]
    pub assets_prefix: String,
}

fn default_dist_dir() -> String {
    "dist".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_assets_prefix() -> String {
    "/assets".to_string()
}

impl Default for SsrConfig {
    fn default() -> Self {
        Self {
            dist_dir: default_dist_dir(),
            timeout: default_timeout(),
            fetch_timeout: default_timeout(),
            origin: String::new(),
            origin_rewrite: String::new(),
            api_hosts: Vec::new(),
            response_headers: Vec::new(),
            allow_iframe_paths: Vec::new(),
            allow_shared_array_buffer_paths: Vec::new(),
            assets_prefix: default_assets_prefix(),
        }
    }
}

impl SsrConfig {
    /// Render timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Per-request timeout of server-side fetches.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    /// `app` with this config's fetch settings applied.
    pub fn apply_fetch(&self, app: AppConfig) -> AppConfig {
        let mut app = app.with_fetch_timeout(self.fetch_timeout());
        if !self.origin_rewrite.is_empty() {
            app = app.with_origin_rewrite(self.origin_rewrite.clone());
        }
        for api in &self.api_hosts {
            app = app.with_api_host(api.to_api_host());
        }
        app
    }

    /// Directory holding `index.html`, `404.html` and the assets.
    ///
    /// A relative `dist_dir` is resolved against `base`.
    pub fn public_dir(&self, base: &Path) -> PathBuf {
        let dist = Path::new(&self.dist_dir);
        let dist = if dist.is_absolute() {
            dist.to_path_buf()
        } else {
            base.join(dist)
        };
        dist.join("public")
    }

    /// Parsed `response_headers`. Entries without a colon are skipped.
    pub fn parsed_response_headers(&self) -> BTreeMap<String, String> {
        self.response_headers
            .iter()
            .filter_map(|entry| {
                let (name, value) = entry.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }
}

/// An API host entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiHostConfig {
    /// Authority as it appears in fetch URLs.
    pub host: String,

    /// Where requests for `host` are actually sent.
    #[serde(default)]
    pub target: Option<String>,
}

impl ApiHostConfig {
    fn to_api_host(&self) -> ApiHost {
        let host = ApiHost::new(self.host.trim());
        match &self.target {
            Some(target) => host.with_target(target.clone()),
            None => host,
        }
    }
}

/// `[proxy]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxied path prefixes.
    #[serde(default, rename = "location")]
    pub locations: Vec<ProxyLocation>,
}

/// One `[[proxy.location]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyLocation {
    /// Path prefix to match.
    pub path: String,

    /// Upstream base URL.
    pub target: String,

    /// Optional `[from, to]` replacement applied once to the path.
    #[serde(default)]
    pub rewrite: Vec<String>,
}
