//! Sliceview Cache Library
//!
//! Off-screen slice cache: one render target per cross-section of a
//! renderable, kept fresh by an interleaved refresh cycle on the idle
//! queue and served straight from cache on the draw path.

pub mod config;
pub mod index;
pub mod stack;

pub use config::{ConfigError, StackConfig};
pub use index::SliceIndexer;
pub use stack::{RenderQueue, SharedRenderable, SliceStack, StackStats};
