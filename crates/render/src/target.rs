//! Off-screen render targets
//!
//! A target is one reusable off-screen destination that slice content is
//! rendered into once and drawn from many times. Targets are created through
//! a [`TargetFactory`] so the engine never depends on a concrete backend.

use std::sync::Arc;

use crate::context::RenderContext;
use crate::geometry::SliceAxes;

/// Error type for target and backend operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Requested target dimensions are zero or beyond the backend limit
    #[error("invalid target size {width}x{height} (limit {max})")]
    InvalidSize { width: u32, height: u32, max: u32 },

    /// Operation requires the target to be unbound
    #[error("target {0} is already bound")]
    AlreadyBound(String),

    /// Target resources have been released
    #[error("target {0} has been released")]
    Released(String),

    /// Another target's storage is already attached to the context
    #[error("context already has a target attached")]
    ContextOccupied,

    /// Target was handed a context from a different backend
    #[error("target {0} given a context from a different backend")]
    BackendMismatch(String),
}

/// Result type for target operations
pub type RenderResult<T> = Result<T, RenderError>;

/// In-plane scale and offset applied when drawing a target to the screen
///
/// Hosts that tile many slices into one view pass a transform per slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceTransform {
    pub scale: [f64; 2],
    pub offset: [f64; 2],
}

impl SliceTransform {
    pub fn identity() -> Self {
        Self {
            scale: [1.0, 1.0],
            offset: [0.0, 0.0],
        }
    }

    /// Apply to an in-plane point
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.scale[0] + self.offset[0],
            y * self.scale[1] + self.offset[1],
        )
    }
}

impl Default for SliceTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// One off-screen rendering destination
///
/// The contract the slice engine relies on:
/// - `set_size` reallocates storage and may fail; content is undefined until
///   the next off-screen pass.
/// - `bind` redirects subsequent context drawing into this target until
///   `unbind`. At most one target is bound to a context at a time.
/// - `draw_on_bounds` draws the target's content onto the current
///   destination, mapped over the given display-space ranges, optionally
///   transformed.
/// - `release` frees the backing resources. Further operations fail; release
///   itself is idempotent.
pub trait RenderTarget: Send {
    /// Identity of this target, unique among live targets
    fn name(&self) -> &str;

    /// Current storage dimensions in pixels
    fn size(&self) -> (u32, u32);

    /// Reallocate storage to `width` x `height`
    fn set_size(&mut self, width: u32, height: u32) -> RenderResult<()>;

    /// Redirect context drawing into this target
    fn bind(&mut self, ctx: &mut dyn RenderContext) -> RenderResult<()>;

    /// End an off-screen pass started with `bind`
    fn unbind(&mut self, ctx: &mut dyn RenderContext);

    /// Draw this target's content over a display-space rectangle
    fn draw_on_bounds(
        &mut self,
        ctx: &mut dyn RenderContext,
        zpos: f64,
        x_range: (f64, f64),
        y_range: (f64, f64),
        axes: SliceAxes,
        xform: Option<&SliceTransform>,
    ) -> RenderResult<()>;

    /// Free the backing resources
    fn release(&mut self, ctx: &mut dyn RenderContext);
}

/// Factory minting fresh targets for the engine, one per slice slot
pub type TargetFactory = Arc<dyn Fn(&str) -> Box<dyn RenderTarget> + Send + Sync>;
