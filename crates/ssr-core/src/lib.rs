//! Core abstractions for server-side rendering with client hydration.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `RenderContext` - Per-render request data in, serialized output out
//! - `RenderId` / `RenderIds` - Render identifiers for concurrent renders
//! - `Environment` - Explicit server/client execution mode
//! - `TimingContext` / `RenderPhase` - Render lifecycle tracking

mod context;
mod environment;
mod lifecycle;

pub use context::*;
pub use environment::*;
pub use lifecycle::*;
