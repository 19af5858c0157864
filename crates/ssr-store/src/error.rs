//! Store and binding error types.

use ssr_fetch::FetchError;
use thiserror::Error;

/// Errors from serializing or seeding cache state.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to serialize or parse state.
    #[error("Serialization error: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// Injected state was not a JSON object.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Errors from an async-data binding.
///
/// `Clone` so one in-flight result can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// The data-producing function failed.
    #[error("Fetch for '{key}' failed: {source}")]
    Fetch {
        key: String,
        #[source]
        source: FetchError,
    },

    /// The produced value could not be converted to JSON.
    #[error("Value for '{key}' is not serializable: {message}")]
    Serialize { key: String, message: String },
}

impl DataError {
    /// Cache key the failing binding was bound to.
    pub fn key(&self) -> &str {
        match self {
            DataError::Fetch { key, .. } | DataError::Serialize { key, .. } => key,
        }
    }
}
