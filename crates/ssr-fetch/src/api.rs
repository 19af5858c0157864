//! API hosts: the only destinations that see a visitor's cookies.

/// A host that receives the full forwarded headers of a render.
///
/// Requests to any other host get the forwarded headers without `Cookie`.
/// When `target` is set, requests to `host` are sent to `target` instead,
/// with `Host` kept as the original authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiHost {
    /// Authority as written in request URLs, e.g. `api.example.com` or
    /// `127.0.0.1:8080`.
    pub host: String,
    /// `scheme://authority` actually connected to.
    pub target: Option<String>,
}

impl ApiHost {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            target: None,
        }
    }

    /// The authority of an origin URL as an API host.
    pub fn from_origin(origin: &str) -> Option<Self> {
        let (_, authority, _) = split_url(origin)?;
        Some(Self::new(authority))
    }

    /// Route requests for this host to `target`.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        self.target = Some(target.trim_end_matches('/').to_string());
        self
    }

    /// Check if `authority` names this host.
    pub fn matches(&self, authority: &str) -> bool {
        self.host.eq_ignore_ascii_case(authority)
    }

    /// `url` with its scheme and authority replaced by the target, if any.
    pub fn rewrite(&self, url: &str) -> Option<String> {
        let target = self.target.as_deref()?;
        let (_, _, rest) = split_url(url)?;
        Some(format!("{}{}", target, rest))
    }
}

/// Split an absolute `http(s)` URL into scheme, authority and the rest
/// (path, query and fragment).
pub fn split_url(url: &str) -> Option<(&str, &str, &str)> {
    let (scheme, after) = url.split_once("://")?;
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return None;
    }
    let end = after.find(['/', '?', '#']).unwrap_or(after.len());
    let (authority, rest) = after.split_at(end);
    if authority.is_empty() {
        return None;
    }
    Some((scheme, authority, rest))
}
