//! Sliceview Core Library
//!
//! Volume data model and slice rendering for the pre-render engine.
//!
//! This crate supplies the concrete pieces the engine crates leave
//! abstract: [`Volume`] holds a scalar image loaded from a NIFTI file,
//! [`VolumeSliceRenderer`] paints its cross sections, and
//! [`PrerenderSession`] wires a volume, a slice stack and an idle queue
//! into one headless object.

pub mod session;
pub mod slice_renderable;
pub mod volume;

pub use session::{PrerenderSession, SliceImage, SlicePlane};
pub use slice_renderable::VolumeSliceRenderer;
pub use volume::{Volume, VolumeError, VolumeResult};
