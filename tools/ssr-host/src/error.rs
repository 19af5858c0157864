//! Error types for the host.

use std::time::Duration;

use ssr_render::RenderError;
use thiserror::Error;

/// Errors from one render request.
#[derive(Error, Debug)]
pub enum HostError {
    /// The render did not finish in time.
    #[error("render timeout after {0:?}")]
    Timeout(Duration),

    /// The render itself failed.
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl HostError {
    /// Short outcome label used in request logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            HostError::Timeout(_) => "ssr timeout",
            HostError::Render(RenderError::NotFound(_)) => "page not found",
            HostError::Render(RenderError::SsrOff(_)) => "ssr off",
            HostError::Render(RenderError::Redirect { .. }) => "page redirect",
            HostError::Render(_) => "ssr error",
        }
    }

    /// Check if this outcome is expected rather than a failure worth an
    /// error log.
    pub fn is_expected(&self) -> bool {
        matches!(self, HostError::Render(e) if e.is_fallback())
    }
}

/// Errors building or running the reverse proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// A location target is not an absolute http(s) URL.
    #[error("proxy location {path}: invalid target {target}")]
    InvalidTarget { path: String, target: String },

    /// A location rewrite is neither empty nor a `[from, to]` pair.
    #[error("proxy location {path}: rewrite must be [from, to]")]
    InvalidRewrite { path: String },

    /// The inbound request body could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// The upstream request failed.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(HostError::Timeout(Duration::from_secs(1)).outcome(), "ssr timeout");
        assert_eq!(
            HostError::from(RenderError::SsrOff("/t".into())).outcome(),
            "ssr off"
        );
        assert_eq!(
            HostError::from(RenderError::Page("x".into())).outcome(),
            "ssr error"
        );
    }

    #[test]
    fn test_expected_outcomes() {
        assert!(HostError::from(RenderError::NotFound("/x".into())).is_expected());
        assert!(!HostError::Timeout(Duration::from_secs(1)).is_expected());
        assert!(!HostError::from(RenderError::Page("x".into())).is_expected());
    }

    #[test]
    fn test_proxy_error_messages() {
        let err = ProxyError::InvalidRewrite {
            path: "/api".into(),
        };
        assert_eq!(err.to_string(), "proxy location /api: rewrite must be [from, to]");

        let err = ProxyError::InvalidTarget {
            path: "/api".into(),
            target: "backend".into(),
        };
        assert!(err.to_string().contains("invalid target backend"));
    }
}
