//! Error types for rendering.

use ssr_store::{DataError, StoreError};
use thiserror::Error;

/// Errors surfaced by the render entry points.
///
/// `NotFound` and `SsrOff` are distinct so the host can pick the
/// alternate rendering path: a not-found page or the client-only shell.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No route matched the requested path.
    #[error("404 page not found: {0}")]
    NotFound(String),

    /// The matched route opted out of server rendering.
    #[error("ssr-off: {0}")]
    SsrOff(String),

    /// A page asked for a redirect during setup.
    #[error("{status} redirect to {location}")]
    Redirect { status: u16, location: String },

    /// A bound data fetch failed.
    #[error("Prefetch error: {0}")]
    Prefetch(#[from] DataError),

    /// Store state could not be serialized or seeded.
    #[error("State error: {0}")]
    State(#[from] StoreError),

    /// A page failed while setting up.
    #[error("Page error: {0}")]
    Page(String),
}

impl RenderError {
    /// Create a temporary (302) redirect.
    pub fn redirect(location: impl Into<String>) -> Self {
        RenderError::Redirect {
            status: 302,
            location: location.into(),
        }
    }

    /// Create a permanent (301) redirect.
    pub fn moved_permanently(location: impl Into<String>) -> Self {
        RenderError::Redirect {
            status: 301,
            location: location.into(),
        }
    }

    /// Check if this error asks the host to fall back to another page
    /// rather than report a failure.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            RenderError::NotFound(_) | RenderError::SsrOff(_) | RenderError::Redirect { .. }
        )
    }
}
