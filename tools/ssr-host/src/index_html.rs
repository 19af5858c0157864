//! Page composition from the client shell and render output.

use std::path::{Path, PathBuf};

use ssr_core::{Manifest, RenderOutput};
use ssr_render::{load_manifest, RenderError, INITIAL_STATE_MARKER};

use crate::config::HostEnv;
use crate::error::HostError;

pub const INDEX_NAME: &str = "index.html";
pub const NOT_FOUND_NAME: &str = "404.html";
pub const MANIFEST_NAME: &str = ".vite/ssr-manifest.json";

const META_BEGIN: &str = "<!--meta-begin-->";
const META_END: &str = "<!--meta-end-->";
const PRELOAD_LINKS: &str = "<!--preload-links-->";
const APP_STATE: &str = "<!--app-state-->";
const APP_HTML: &str = "<!--app-html-->";

/// Served for unknown routes when the build has no `404.html`.
pub const DEFAULT_NOT_FOUND: &str =
    r#"<!DOCTYPE html><html lang="en"><head></head><body><h1>Page Not Found</h1></body></html>"#;

/// A successful render.
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    /// App markup.
    pub html: String,
    /// State, head tags and preload links written by the render.
    pub output: RenderOutput,
}

/// What to send back for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageResponse {
    /// An HTML document.
    Html { status: u16, body: String },
    /// A redirect.
    Redirect { status: u16, location: String },
}

#[derive(Debug, Clone, Default)]
struct Template {
    html: String,
    meta: Option<(usize, usize)>,
}

impl Template {
    fn parse(html: String) -> Self {
        let meta = meta_block(&html);
        Self { html, meta }
    }
}

/// Byte range of the `<!--meta-begin-->…<!--meta-end-->` block, markers
/// included.
fn meta_block(html: &str) -> Option<(usize, usize)> {
    let begin = html.find(META_BEGIN)?;
    if begin == 0 {
        return None;
    }
    let end = html[begin + META_BEGIN.len()..].find(META_END)? + begin + META_BEGIN.len();
    Some((begin, end + META_END.len()))
}

/// The client shell, not-found page and SSR manifest of one build.
///
/// In production everything is read once; in development the shell and
/// manifest are re-read on every request so rebuilds show up immediately.
#[derive(Debug)]
pub struct IndexHtml {
    index_path: PathBuf,
    manifest_path: PathBuf,
    template: Option<Template>,
    manifest: Option<Manifest>,
    not_found: String,
}

impl IndexHtml {
    /// Load from a build's public directory. `index.html` must exist.
    pub fn load(env: HostEnv, public_dir: &Path) -> std::io::Result<Self> {
        let index_path = public_dir.join(INDEX_NAME);
        let manifest_path = public_dir.join(MANIFEST_NAME);
        let index = std::fs::read_to_string(&index_path)?;

        let (template, manifest) = match env {
            HostEnv::Dev => (None, None),
            HostEnv::Prod => (
                Some(Template::parse(index)),
                Some(load_manifest(&manifest_path).unwrap_or_default()),
            ),
        };
        let not_found = std::fs::read_to_string(public_dir.join(NOT_FOUND_NAME))
            .unwrap_or_else(|_| DEFAULT_NOT_FOUND.to_string());

        Ok(Self {
            index_path,
            manifest_path,
            template,
            manifest,
            not_found,
        })
    }

    /// Build from in-memory parts.
    #[cfg(test)]
    pub fn from_parts(index: impl Into<String>, not_found: Option<String>, manifest: Manifest) -> Self {
        Self {
            index_path: PathBuf::new(),
            manifest_path: PathBuf::new(),
            template: Some(Template::parse(index.into())),
            manifest: Some(manifest),
            not_found: not_found.unwrap_or_else(|| DEFAULT_NOT_FOUND.to_string()),
        }
    }

    /// The SSR manifest used for preload hints.
    pub fn manifest(&self) -> Manifest {
        match &self.manifest {
            Some(manifest) => manifest.clone(),
            None => load_manifest(&self.manifest_path).unwrap_or_default(),
        }
    }

    /// The not-found page.
    pub fn not_found(&self) -> &str {
        &self.not_found
    }

    fn template(&self) -> Template {
        if let Some(template) = &self.template {
            return template.clone();
        }
        match std::fs::read_to_string(&self.index_path) {
            Ok(html) => Template::parse(html),
            Err(e) => {
                tracing::error!(path = %self.index_path.display(), error = %e, "failed to read index.html");
                Template::default()
            }
        }
    }

    /// Compose the response for a render result.
    ///
    /// Not-found renders get the 404 page and redirects a redirect. Any
    /// other failure, including ssr-off and timeouts, gets the untouched
    /// shell so the client renders the page itself.
    pub fn compose(&self, result: &Result<RenderedPage, HostError>) -> PageResponse {
        let page = match result {
            Ok(page) => page,
            Err(HostError::Render(RenderError::NotFound(_))) => {
                return PageResponse::Html {
                    status: 404,
                    body: self.not_found().to_string(),
                };
            }
            Err(HostError::Render(RenderError::Redirect { status, location })) => {
                let location = if location.is_empty() { "/" } else { location.as_str() };
                return PageResponse::Redirect {
                    status: *status,
                    location: location.to_string(),
                };
            }
            Err(_) => {
                return PageResponse::Html {
                    status: 200,
                    body: self.template().html,
                };
            }
        };

        PageResponse::Html {
            status: 200,
            body: fill(self.template(), page),
        }
    }
}

fn fill(template: Template, page: &RenderedPage) -> String {
    let mut html = template.html;
    let output = &page.output;

    if let (Some(meta), Some((begin, end))) = (output.html_meta.as_deref(), template.meta) {
        if !meta.is_empty() {
            html.replace_range(begin..end, meta);
        }
    }
    if let Some(links) = output.preload_links.as_deref().filter(|l| !l.is_empty()) {
        html = html.replacen(PRELOAD_LINKS, links, 1);
    }
    if let Some(state) = output.html_state.as_deref().filter(|s| !s.is_empty()) {
        html = html.replacen(APP_STATE, &format!("{}{}", INITIAL_STATE_MARKER, state), 1);
    }
    html.replacen(APP_HTML, &page.html, 1)
}
