//! The drawing context shared by every target on the render thread
//!
//! A context carries the transform state (viewport and orthographic
//! projection) that slice drawing runs under. Code that redirects rendering
//! into an off-screen target is required to save the caller's transform
//! state up front and restore it exactly afterwards, so context state never
//! leaks between passes.

use std::any::Any;

use crate::geometry::{Bounds3, SliceAxes};

/// An RGBA8 color
pub type Rgba = [u8; 4];

/// Fully transparent black, the clear color for fresh slice content
pub const TRANSPARENT: Rgba = [0, 0, 0, 0];

/// An orthographic projection over the in-plane display bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthoView {
    pub axes: SliceAxes,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
}

/// Snapshot of a context's transform state
///
/// Returned by [`RenderContext::save_transform`] and accepted back by
/// [`RenderContext::restore_transform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    pub viewport: (u32, u32),
    pub ortho: Option<OrthoView>,
}

/// Backend seam for the drawing operations the engine needs
///
/// One context exists per render thread. Targets bind themselves into it for
/// off-screen passes, renderables draw through it, and the engine brackets
/// every off-screen pass with `save_transform`/`restore_transform`.
pub trait RenderContext {
    /// Capture the current viewport and projection
    fn save_transform(&self) -> TransformState;

    /// Reinstate a previously captured transform state
    fn restore_transform(&mut self, state: TransformState);

    /// Set the viewport to `width` x `height` and project orthographically
    /// over the in-plane ranges of `bounds` for the given axes
    fn set_ortho(&mut self, axes: SliceAxes, width: u32, height: u32, bounds: &Bounds3);

    /// Fill the currently bound target (or the screen) with one color
    fn clear(&mut self, color: Rgba);

    /// Draw an RGBA8 image onto the current target, mapped over the given
    /// display-space rectangle through the current projection
    ///
    /// Content outside the viewport is clipped; pixels with zero alpha leave
    /// the destination untouched.
    fn blit(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        x_range: (f64, f64),
        y_range: (f64, f64),
    );

    /// Backend escape hatch, used by targets to attach their storage
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
