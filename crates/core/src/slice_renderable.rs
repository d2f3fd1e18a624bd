//! Grayscale slice rendering for volumes

use std::sync::Arc;

use sliceview_render::{Bounds3, RenderContext, Renderable, SliceAxes};

use crate::volume::{window_intensity, Volume};

/// Renders axis-aligned cross sections of a [`Volume`].
///
/// Display axis `i` is voxel axis `i` scaled by voxel size, so the
/// in-plane data resolution is simply the volume shape. Intensities are
/// mapped to opaque grayscale over the volume's intensity range, or
/// over an explicit display window when one is set.
///
/// The volume is optional: a renderer built with [`pending`] reports
/// itself not ready until [`set_volume`] hands it data, and the slice
/// stack defers refreshes until then.
///
/// [`pending`]: VolumeSliceRenderer::pending
/// [`set_volume`]: VolumeSliceRenderer::set_volume
pub struct VolumeSliceRenderer {
    name: String,
    volume: Option<Arc<Volume>>,
    axes: SliceAxes,
    display_range: Option<(f32, f32)>,
}

impl VolumeSliceRenderer {
    /// A renderer over a loaded volume, ready to draw immediately
    pub fn new(volume: Arc<Volume>) -> Self {
        Self {
            name: volume.name().to_string(),
            volume: Some(volume),
            axes: SliceAxes::XY,
            display_range: None,
        }
    }

    /// A renderer whose volume has not arrived yet
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            volume: None,
            axes: SliceAxes::XY,
            display_range: None,
        }
    }

    /// Adopt a volume, becoming ready
    ///
    /// Any display window set for the previous data is dropped. The
    /// caller still has to tell any stack drawing this renderer that
    /// its content changed.
    pub fn set_volume(&mut self, volume: Arc<Volume>) {
        self.name = volume.name().to_string();
        self.volume = Some(volume);
        self.display_range = None;
    }

    pub fn volume(&self) -> Option<&Arc<Volume>> {
        self.volume.as_ref()
    }

    /// Override the intensity window used for grayscale mapping
    ///
    /// Values at or below `lo` render black, values at or above `hi`
    /// render white. Requires `lo < hi`.
    pub fn set_display_range(&mut self, lo: f32, hi: f32) {
        debug_assert!(lo < hi, "invalid display range [{}, {}]", lo, hi);
        if lo < hi {
            self.display_range = Some((lo, hi));
        }
    }

    /// Drop the display window, reverting to the volume's own range
    pub fn reset_display_range(&mut self) {
        self.display_range = None;
    }

    pub fn display_range(&self) -> Option<(f32, f32)> {
        self.display_range
    }
}

impl Renderable for VolumeSliceRenderer {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_bounds(&self) -> Bounds3 {
        match &self.volume {
            Some(volume) => volume.bounds(),
            None => Bounds3::new([0.0; 3], [0.0; 3]),
        }
    }

    fn data_resolution(&self, _xax: usize, _yax: usize) -> Option<[u32; 3]> {
        let shape = self.volume.as_ref()?.shape();
        Some([shape[0] as u32, shape[1] as u32, shape[2] as u32])
    }

    fn ready(&self) -> bool {
        self.volume.is_some()
    }

    fn set_axes(&mut self, axes: SliceAxes) {
        self.axes = axes;
    }

    fn draw(&mut self, ctx: &mut dyn RenderContext, zpos: f64) {
        let volume = match &self.volume {
            Some(volume) => volume,
            None => return,
        };
        let (xax, yax, zax) = (self.axes.xax(), self.axes.yax(), self.axes.zax());
        let shape = volume.shape();
        let (nx, ny) = (shape[xax], shape[yax]);
        let slice = volume.world_to_voxel(zax, zpos);
        let window = self.display_range.unwrap_or_else(|| volume.intensity_range());

        let mut pixels = vec![0u8; nx * ny * 4];
        let mut index = [0usize; 3];
        index[zax] = slice;
        for row in 0..ny {
            index[yax] = row;
            // Buffer rows run top to bottom; display y runs bottom to top.
            let base = (ny - 1 - row) * nx * 4;
            for col in 0..nx {
                index[xax] = col;
                let value = volume.value_at(index).unwrap_or(0.0);
                let shade = (window_intensity(window, value) * 255.0).round() as u8;
                let at = base + col * 4;
                pixels[at] = shade;
                pixels[at + 1] = shade;
                pixels[at + 2] = shade;
                pixels[at + 3] = 255;
            }
        }

        let bounds = volume.bounds();
        ctx.blit(
            &pixels,
            nx as u32,
            ny as u32,
            bounds.range(xax),
            bounds.range(yax),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::sync::Mutex;

    use sliceview_cache::{RenderQueue, SliceStack, StackConfig};
    use sliceview_render::{software_target_factory, SoftwareContext};

    fn volume_2x2x1() -> Arc<Volume> {
        // value(i, j, 0) in {0, 1, 2, 3}; shades 0, 85, 170, 255.
        let data = Array3::from_shape_fn((2, 2, 1), |(i, j, _)| (i + 2 * j) as f32);
        Arc::new(Volume::from_array("quad", data, [1.0; 3]).unwrap())
    }

    #[test]
    fn test_resolution_and_bounds() {
        let renderer = VolumeSliceRenderer::new(volume_2x2x1());
        assert_eq!(renderer.name(), "quad");
        assert_eq!(renderer.data_resolution(0, 1), Some([2, 2, 1]));
        assert_eq!(renderer.display_bounds().range(2), (0.0, 1.0));
        assert!(renderer.ready());
    }

    #[test]
    fn test_pending_renderer_is_not_ready() {
        let mut renderer = VolumeSliceRenderer::pending("incoming");
        assert_eq!(renderer.name(), "incoming");
        assert!(!renderer.ready());
        assert_eq!(renderer.data_resolution(0, 1), None);
        assert!(!renderer.display_bounds().is_valid());

        // Drawing without data paints nothing.
        let mut ctx = SoftwareContext::new(2, 2);
        ctx.set_ortho(SliceAxes::XY, 2, 2, &Bounds3::new([0.0; 3], [1.0; 3]));
        renderer.draw(&mut ctx, 0.5);
        assert!(ctx.screen().is_blank());

        renderer.set_volume(volume_2x2x1());
        assert!(renderer.ready());
        assert_eq!(renderer.name(), "quad");
        assert_eq!(renderer.data_resolution(0, 1), Some([2, 2, 1]));
    }

    #[test]
    fn test_stack_defers_until_volume_arrives() {
        let renderer = Arc::new(Mutex::new(VolumeSliceRenderer::pending("incoming")));
        let queue = RenderQueue::new();
        let config = StackConfig::default().with_default_slot_count(8);
        let stack = SliceStack::new(
            renderer.clone(),
            software_target_factory(),
            queue.clone(),
            config,
        );
        let mut ctx = SoftwareContext::new(4, 4);

        stack.set_axes(0, 1);
        queue.drain(&mut ctx as &mut dyn RenderContext);
        let stats = stack.stats();
        assert_eq!(stats.refreshes, 0);
        assert_eq!(stats.skipped_not_ready, 8);
        assert_eq!(stats.dirty_slots, 8);

        // Data arrives: reorienting re-sizes the stack from the volume
        // and a full refresh cycle now succeeds.
        renderer.lock().unwrap().set_volume(volume_2x2x1());
        stack.set_axes(0, 1);
        queue.drain(&mut ctx as &mut dyn RenderContext);
        let stats = stack.stats();
        assert_eq!(stats.slot_count, 1);
        assert_eq!(stats.refreshes, 1);
        assert_eq!(stats.dirty_slots, 0);
    }

    #[test]
    fn test_draw_orientation() {
        let mut renderer = VolumeSliceRenderer::new(volume_2x2x1());
        let mut ctx = SoftwareContext::new(2, 2);
        let bounds = renderer.display_bounds();
        ctx.set_ortho(SliceAxes::XY, 2, 2, &bounds);

        renderer.draw(&mut ctx, 0.5);

        // Screen row 0 is the top: the high-y voxel row (j = 1).
        assert_eq!(ctx.screen().pixel(0, 0), [170, 170, 170, 255]);
        assert_eq!(ctx.screen().pixel(1, 0), [255, 255, 255, 255]);
        assert_eq!(ctx.screen().pixel(0, 1), [0, 0, 0, 255]);
        assert_eq!(ctx.screen().pixel(1, 1), [85, 85, 85, 255]);
    }

    #[test]
    fn test_display_window_overrides_data_range() {
        let mut renderer = VolumeSliceRenderer::new(volume_2x2x1());
        renderer.set_display_range(0.0, 1.0);
        assert_eq!(renderer.display_range(), Some((0.0, 1.0)));

        let mut ctx = SoftwareContext::new(2, 2);
        ctx.set_ortho(SliceAxes::XY, 2, 2, &renderer.display_bounds());
        renderer.draw(&mut ctx, 0.5);

        // Values 1..=3 all saturate at the top of a [0, 1] window.
        assert_eq!(ctx.screen().pixel(0, 1), [0, 0, 0, 255]);
        assert_eq!(ctx.screen().pixel(1, 1), [255, 255, 255, 255]);
        assert_eq!(ctx.screen().pixel(0, 0), [255, 255, 255, 255]);

        renderer.reset_display_range();
        renderer.draw(&mut ctx, 0.5);
        assert_eq!(ctx.screen().pixel(1, 1), [85, 85, 85, 255]);
    }

    #[test]
    fn test_draw_reoriented_plane() {
        // value(0, j, k) = j + 10k; sagittal view shows the y/z plane.
        let data = Array3::from_shape_fn((1, 2, 2), |(_, j, k)| (j + 10 * k) as f32);
        let volume = Arc::new(Volume::from_array("yz", data, [1.0; 3]).unwrap());
        let mut renderer = VolumeSliceRenderer::new(volume);
        renderer.set_axes(SliceAxes::YZ);

        let mut ctx = SoftwareContext::new(2, 2);
        let bounds = renderer.display_bounds();
        ctx.set_ortho(SliceAxes::YZ, 2, 2, &bounds);
        renderer.draw(&mut ctx, 0.5);

        // Top-left is (y = 0, z = 1): value 10 of range (0, 11).
        let expected = ((10.0f32 / 11.0) * 255.0).round() as u8;
        assert_eq!(ctx.screen().pixel(0, 0)[0], expected);
        // Bottom-right is (y = 1, z = 0): value 1.
        let expected = ((1.0f32 / 11.0) * 255.0).round() as u8;
        assert_eq!(ctx.screen().pixel(1, 1)[0], expected);
    }

    #[test]
    fn test_draw_selects_slice_from_position() {
        // One voxel in-plane, four slices along z with value k.
        let data = Array3::from_shape_fn((1, 1, 4), |(_, _, k)| k as f32);
        let volume = Arc::new(Volume::from_array("depth", data, [1.0; 3]).unwrap());
        let mut renderer = VolumeSliceRenderer::new(volume);

        let mut ctx = SoftwareContext::new(1, 1);
        ctx.set_ortho(SliceAxes::XY, 1, 1, &renderer.display_bounds());

        renderer.draw(&mut ctx, 2.5);
        let expected = ((2.0f32 / 3.0) * 255.0).round() as u8;
        assert_eq!(ctx.screen().pixel(0, 0)[0], expected);

        // Out-of-range positions clamp to the end slices.
        renderer.draw(&mut ctx, 99.0);
        assert_eq!(ctx.screen().pixel(0, 0)[0], 255);
    }
}
