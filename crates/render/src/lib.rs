//! Sliceview Render Library
//!
//! Rendering seams and display-space geometry for the slice pre-render
//! engine, plus a software raster backend for headless use and tests.
//!
//! The engine core only ever sees the three seams defined here: a
//! [`Renderable`] paints slice content, a [`RenderTarget`] stores it
//! off-screen, and a [`RenderContext`] carries the transform state both run
//! under.

pub mod context;
pub mod geometry;
pub mod renderable;
pub mod software;
pub mod target;

pub use context::{OrthoView, Rgba, RenderContext, TransformState, TRANSPARENT};
pub use geometry::{Bounds3, SliceAxes};
pub use renderable::Renderable;
pub use software::{
    software_target_factory, PixelSurface, SoftwareContext, SoftwareTarget, MAX_SURFACE_DIM,
};
pub use target::{RenderError, RenderResult, RenderTarget, SliceTransform, TargetFactory};
