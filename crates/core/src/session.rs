//! Headless prerender sessions
//!
//! A [`PrerenderSession`] wires a volume, its slice renderer, a slice
//! stack, and the software raster backend into one object a CLI or
//! test can drive: orient, pump the idle queue, draw slices, read back
//! images.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use sliceview_cache::{RenderQueue, SliceStack, StackConfig, StackStats};
use sliceview_render::{
    software_target_factory, RenderContext, SliceAxes, SoftwareContext, TRANSPARENT,
};
use sliceview_scheduler::{FrameBudget, QueueStats};

use crate::slice_renderable::VolumeSliceRenderer;
use crate::volume::Volume;

/// Anatomical slicing planes, mapped onto display axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlicePlane {
    /// XY in-plane, sliced along z
    Axial,
    /// XZ in-plane, sliced along y
    Coronal,
    /// YZ in-plane, sliced along x
    Sagittal,
}

impl SlicePlane {
    pub fn slice_axes(self) -> SliceAxes {
        match self {
            SlicePlane::Axial => SliceAxes::XY,
            SlicePlane::Coronal => SliceAxes::XZ,
            SlicePlane::Sagittal => SliceAxes::YZ,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SlicePlane::Axial => "axial",
            SlicePlane::Coronal => "coronal",
            SlicePlane::Sagittal => "sagittal",
        }
    }
}

impl fmt::Display for SlicePlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SlicePlane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "axial" | "xy" => Ok(SlicePlane::Axial),
            "coronal" | "xz" => Ok(SlicePlane::Coronal),
            "sagittal" | "yz" => Ok(SlicePlane::Sagittal),
            other => Err(format!("unknown slice plane: {}", other)),
        }
    }
}

/// One rendered view, row-major RGBA8 with row zero at the top
pub struct SliceImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A volume, its slice stack, and a software view to draw into
pub struct PrerenderSession {
    volume: Arc<Volume>,
    stack: SliceStack,
    queue: RenderQueue,
    ctx: SoftwareContext,
    plane: SlicePlane,
}

impl PrerenderSession {
    /// Create a session drawing onto a `view`-sized screen, sliced
    /// axially until told otherwise
    pub fn new(volume: Volume, config: StackConfig, view: (u32, u32)) -> Self {
        let volume = Arc::new(volume);
        let renderer = VolumeSliceRenderer::new(volume.clone());
        let queue = RenderQueue::new();
        let stack = SliceStack::new(
            Arc::new(Mutex::new(renderer)),
            software_target_factory(),
            queue.clone(),
            config,
        );
        let mut session = Self {
            volume,
            stack,
            queue,
            ctx: SoftwareContext::new(view.0, view.1),
            plane: SlicePlane::Axial,
        };
        session.set_plane(SlicePlane::Axial);
        session
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn plane(&self) -> SlicePlane {
        self.plane
    }

    pub fn stack(&self) -> &SliceStack {
        &self.stack
    }

    /// Reorient the stack onto a new slicing plane
    pub fn set_plane(&mut self, plane: SlicePlane) {
        self.plane = plane;
        let axes = plane.slice_axes();
        self.stack.set_axes(axes.xax(), axes.yax());
    }

    /// Tell the stack the volume data changed under it
    pub fn notify_data_changed(&self) {
        self.stack.on_data_changed();
    }

    /// Run queued refresh and release work to completion
    pub fn pump(&mut self) -> usize {
        self.queue.drain(&mut self.ctx as &mut dyn RenderContext)
    }

    /// Run queued work until the queue empties or the budget is spent
    pub fn pump_budgeted(&mut self, budget: &FrameBudget) -> usize {
        self.queue
            .drain_budgeted(&mut self.ctx as &mut dyn RenderContext, budget)
    }

    /// Mark every slice stale and rebuild the whole stack now
    pub fn prerender_all(&mut self) -> usize {
        self.stack.invalidate_all();
        self.pump()
    }

    /// Depth positions of the slices in the current stack
    pub fn slice_positions(&self) -> Vec<f64> {
        (0..self.stack.slot_count())
            .filter_map(|index| self.stack.slot_position(index))
            .collect()
    }

    /// Draw the slice at `zpos` and read back the resulting view
    pub fn render_slice(&mut self, zpos: f64) -> SliceImage {
        let axes = self.plane.slice_axes();
        let bounds = self.volume.bounds();
        let (width, height) = (self.ctx.screen().width(), self.ctx.screen().height());
        let saved = self.ctx.save_transform();
        self.ctx.set_ortho(axes, width, height, &bounds);
        self.ctx.clear(TRANSPARENT);
        self.stack.draw(&mut self.ctx, zpos, None);
        self.ctx.restore_transform(saved);
        SliceImage {
            pixels: self.ctx.screen().pixels().to_vec(),
            width,
            height,
        }
    }

    /// Stack and queue statistics for reporting
    pub fn stats(&self) -> (StackStats, QueueStats) {
        (self.stack.stats(), self.queue.stats())
    }

    /// Tear the stack down and run the queued releases
    pub fn shutdown(&mut self) -> usize {
        self.stack.destroy_all();
        self.pump()
    }
}
