//! Explicit server/client execution mode.

use serde::{Deserialize, Serialize};

/// Where an application instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Server render: data bindings are deferred to the prefetch phase.
    Server,
    /// Client runtime: data bindings consult the hydrated cache first.
    Client,
}

impl Environment {
    /// Check if this is the server environment.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server)
    }

    /// Get the environment name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
