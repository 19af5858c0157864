//! Hydration-aware data cache and async-data binding.
//!
//! A server render binds cache keys to data-producing functions, awaits them
//! all in the prefetch phase, and serializes the cache into the page. The
//! client seeds its cache from that state, so the same bindings resolve from
//! the cache instead of fetching again.
//!
//! # Example
//!
//! ```rust,ignore
//! use ssr_core::Environment;
//! use ssr_store::{Binding, DataScope};
//!
//! let scope = DataScope::new(Environment::Server, fetch);
//! scope
//!     .use_async_data("ip", |fetch| async move { fetch.get("/api/ip", ()).await })
//!     .await?;
//! scope.run_prefetch().await?;
//!
//! let state = scope.cache().serialize_state()?;
//! ```

mod binding;
mod cache;
mod error;
mod prefetch;

pub use binding::{Binding, DataScope};
pub use cache::DataCache;
pub use error::{DataError, StoreError};
pub use prefetch::{PrefetchQueue, PrefetchTask};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{Binding, DataCache, DataError, DataScope, StoreError};
}
