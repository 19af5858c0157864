//! Per-render context with request data in and serialized output out.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// HTTP headers forwarded into a render.
///
/// Ordered so the serialized form is stable across renders.
pub type Headers = BTreeMap<String, String>;

/// Mapping from module identifier to its associated asset files.
pub type Manifest = BTreeMap<String, Vec<String>>;

/// Identifier disambiguating concurrent renders in one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderId(pub u64);

impl std::fmt::Display for RenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocator handing out monotonically increasing render ids.
#[derive(Debug, Default)]
pub struct RenderIds {
    last: AtomicU64,
}

impl RenderIds {
    /// Create an allocator whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next render id.
    pub fn next_id(&self) -> RenderId {
        RenderId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Serialized output written back onto the context by a successful render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    /// Serialized store state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_state: Option<String>,
    /// Serialized head tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_meta: Option<String>,
    /// JSON list of discovered async module identifiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_modules: Option<String>,
    /// `<link>` tags derived from discovered modules and the manifest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preload_links: Option<String>,
}

/// Request-specific data for exactly one server render.
///
/// Created at the start of a render call and never shared across renders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderContext {
    /// Path (with optional query) to render.
    pub url: String,
    /// Base URL for server-side fetches.
    pub origin: String,
    /// Inbound headers to forward on outgoing fetches.
    #[serde(default)]
    pub ssr_headers: Headers,
    /// Render identifier, if the host assigned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_id: Option<RenderId>,
    /// Collector for async module identifiers discovered during render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<BTreeSet<String>>,
    /// Module-to-assets mapping used for preload hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    /// Output slot, filled in by a successful render.
    #[serde(flatten)]
    pub output: RenderOutput,
}

impl RenderContext {
    /// Create a context for rendering `url` with fetches based at `origin`.
    pub fn new(url: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: origin.into(),
            ..Default::default()
        }
    }

    /// Set the render identifier.
    pub fn with_render_id(mut self, id: RenderId) -> Self {
        self.render_id = Some(id);
        self
    }

    /// Add a header to forward.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ssr_headers.insert(name.into(), value.into());
        self
    }

    /// Replace the forwarded headers.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.ssr_headers = headers;
        self
    }

    /// Enable async module collection.
    pub fn collect_modules(mut self) -> Self {
        self.modules.get_or_insert_with(BTreeSet::new);
        self
    }

    /// Attach a manifest; implies module collection.
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self.collect_modules()
    }

    /// Get a forwarded header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.ssr_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path portion of the url, without query or fragment.
    pub fn path(&self) -> &str {
        let end = self.url.find(['?', '#']).unwrap_or(self.url.len());
        &self.url[..end]
    }
}
