//! App assembly and render entry points.
//!
//! The server entry renders one request into a string plus serialized state
//! and head tags; the client entry seeds a cache from that state and mounts
//! without fetching again:
//! - `AppDefinition` - Immutable wiring shared by every render
//! - `App` - One router/data/head/fetch instance per render or page session
//! - `render_to_string` - Server render entry
//! - `hydrate` - Client bootstrap
//! - `render_preload_links` - Preload hints from the asset manifest

mod app;
mod entry_client;
mod entry_server;
mod error;
mod head;
mod preload;
mod router;

pub use app::*;
pub use entry_client::*;
pub use entry_server::*;
pub use error::*;
pub use head::*;
pub use preload::*;
pub use router::*;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        hydrate, render_to_string, App, AppConfig, AppDefinition, Page, RenderError, RouteTable,
    };
    pub use ssr_core::{Environment, RenderContext};
    pub use ssr_store::Binding;
}
