//! Route table and per-app router.
//!
//! Patterns follow the usual conventions:
//!
//! ```text
//! /                 -> static root
//! /product/:id      -> `id` captured from one segment
//! /blog/*slug       -> `slug` captures the rest of the path
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::Page;

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal path segment.
    Static(String),
    /// `:name`, captures one segment.
    Param(String),
    /// `*name`, captures the remaining path. Only valid last.
    Wildcard(String),
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if let Some(name) = s.strip_prefix(':') {
                Segment::Param(name.to_string())
            } else if let Some(name) = s.strip_prefix('*') {
                Segment::Wildcard(name.to_string())
            } else {
                Segment::Static(s.to_string())
            }
        })
        .collect()
}

/// A registered route.
#[derive(Clone)]
pub struct Route {
    pattern: String,
    segments: Vec<Segment>,
    ssr: bool,
    page: Arc<dyn Page>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("ssr", &self.ssr)
            .finish()
    }
}

impl Route {
    /// The route's pattern as registered.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Check if the route is rendered on the server.
    pub fn ssr(&self) -> bool {
        self.ssr
    }

    /// The page handler.
    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    fn capture(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = BTreeMap::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard(name) => {
                    params.insert(name.clone(), parts.get(i..).unwrap_or_default().join("/"));
                    return Some(params);
                }
                Segment::Static(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.insert(name.clone(), (*value).to_string());
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }
}

/// Ordered route table, built at startup and shared read-only by every
/// app instance.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server-rendered route.
    pub fn route(self, pattern: impl Into<String>, page: impl Page + 'static) -> Self {
        self.push(pattern.into(), Arc::new(page), true)
    }

    /// Register a route that is only rendered on the client.
    pub fn client_only(self, pattern: impl Into<String>, page: impl Page + 'static) -> Self {
        self.push(pattern.into(), Arc::new(page), false)
    }

    fn push(mut self, pattern: String, page: Arc<dyn Page>, ssr: bool) -> Self {
        self.routes.push(Route {
            segments: parse_pattern(&pattern),
            pattern,
            ssr,
            page,
        });
        self
    }

    /// All routes in match order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route matching `path`, with its captured params.
    pub fn resolve(&self, path: &str) -> Option<(&Route, BTreeMap<String, String>)> {
        self.routes
            .iter()
            .find_map(|route| route.capture(path).map(|params| (route, params)))
    }
}

/// Result of resolving a url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Path without query or fragment.
    pub path: String,
    /// Pattern of the matched route.
    pub pattern: String,
    /// Captured path params.
    pub params: BTreeMap<String, String>,
    /// Decoded query params.
    pub query: BTreeMap<String, String>,
    /// Whether the matched route renders on the server.
    pub ssr: bool,
}

impl RouteMatch {
    /// Get a path param.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Get a query param.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Router owned by one app instance.
#[derive(Debug, Clone)]
pub struct Router {
    table: Arc<RouteTable>,
    current: Option<RouteMatch>,
    page: Option<Arc<dyn Page>>,
}

impl Router {
    /// Create a router over a shared table.
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self {
            table,
            current: None,
            page: None,
        }
    }

    /// Navigate to `url` and resolve its route.
    ///
    /// Returns the match, or `None` when no route matched; the previous
    /// route is cleared either way.
    pub fn push(&mut self, url: &str) -> Option<&RouteMatch> {
        let (path, query) = split_url(url);
        let resolved = self.table.resolve(path).map(|(route, params)| {
            let matched = RouteMatch {
                path: path.to_string(),
                pattern: route.pattern.clone(),
                params,
                query: parse_query(query),
                ssr: route.ssr,
            };
            (matched, Arc::clone(&route.page))
        });

        match resolved {
            Some((matched, page)) => {
                tracing::debug!(url = %url, pattern = %matched.pattern, "route resolved");
                self.current = Some(matched);
                self.page = Some(page);
            }
            None => {
                tracing::debug!(url = %url, "no route matched");
                self.current = None;
                self.page = None;
            }
        }
        self.current.as_ref()
    }

    /// Current route, if the last navigation matched.
    pub fn current(&self) -> Option<&RouteMatch> {
        self.current.as_ref()
    }

    /// Page handler of the current route.
    pub fn page(&self) -> Option<&Arc<dyn Page>> {
        self.page.as_ref()
    }

    /// The shared route table.
    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }
}

/// Split a url into its path and query string, dropping any fragment.
fn split_url(url: &str) -> (&str, &str) {
    let url = url.split('#').next().unwrap_or_default();
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
