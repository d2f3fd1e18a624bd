//! The renderable seam
//!
//! Anything that can paint a 2D slice of itself at a position along the
//! slice axis implements [`Renderable`]. The slice engine only ever talks to
//! this trait; concrete renderables live with their data models.

use crate::context::RenderContext;
use crate::geometry::{Bounds3, SliceAxes};

/// A source of slice content
///
/// Draw calls are bracketed by `pre_draw`/`post_draw` so implementations can
/// set up and tear down per-pass state. Implementations must leave the
/// context's transform state as they found it; the content of the bound
/// target is the only thing a draw is allowed to change.
pub trait Renderable: Send {
    /// Human-readable identity, used in log output
    fn name(&self) -> &str;

    /// Bounds of this renderable in display coordinates
    fn display_bounds(&self) -> Bounds3;

    /// Intrinsic data resolution per display axis, if the data has one
    ///
    /// Indexed by display axis: `resolution[axis]` is the sample count along
    /// that display axis given the in-plane assignment `(xax, yax)`. Sources
    /// without an intrinsic grid (procedural content) return `None` and the
    /// engine falls back to configured defaults.
    fn data_resolution(&self, xax: usize, yax: usize) -> Option<[u32; 3]>;

    /// Whether the renderable can produce real content right now
    ///
    /// Returns `false` while data is still loading. Refreshes are deferred
    /// until this turns `true`.
    fn ready(&self) -> bool;

    /// Adopt a new axis assignment
    fn set_axes(&mut self, axes: SliceAxes);

    /// Hook run once before each draw
    fn pre_draw(&mut self, _ctx: &mut dyn RenderContext) {}

    /// Paint the slice at `zpos` through the context
    fn draw(&mut self, ctx: &mut dyn RenderContext, zpos: f64);

    /// Hook run once after each draw
    fn post_draw(&mut self, _ctx: &mut dyn RenderContext) {}
}
