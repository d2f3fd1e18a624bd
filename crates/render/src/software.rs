//! Software raster backend
//!
//! A CPU implementation of the context and target seams, used by the
//! headless tools and by tests. Slice content is rasterized into plain RGBA8
//! buffers with nearest-neighbour sampling and src-over blending.
//!
//! Binding works by moving the target's surface into the context, so exactly
//! one of them owns the buffer at any moment. The pixel convention is
//! top-left origin: row zero of a surface corresponds to the upper edge of
//! the projected display-space rectangle.

use std::any::Any;

use crate::context::{OrthoView, Rgba, RenderContext, TransformState};
use crate::geometry::{Bounds3, SliceAxes};
use crate::target::{RenderError, RenderResult, RenderTarget, SliceTransform, TargetFactory};

/// Largest dimension the software backend will allocate
pub const MAX_SURFACE_DIM: u32 = 8192;

/// An owned RGBA8 pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelSurface {
    /// Allocate a zeroed (fully transparent) surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw pixel data, row-major RGBA8
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Overwrite every pixel with one color
    pub fn fill(&mut self, color: Rgba) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    /// Read one pixel
    ///
    /// Panics when `(x, y)` is outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        assert!(x < self.width && y < self.height);
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Write one pixel, ignoring writes outside the surface
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgba) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[i..i + 4].copy_from_slice(&color);
    }

    /// Composite one pixel src-over, ignoring writes outside the surface
    pub fn blend_pixel(&mut self, x: u32, y: u32, src: Rgba) {
        if x >= self.width || y >= self.height {
            return;
        }
        let a = src[3] as u32;
        if a == 0 {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        if a == 255 {
            self.pixels[i..i + 4].copy_from_slice(&src);
            return;
        }
        let inv = 255 - a;
        for c in 0..3 {
            let d = self.pixels[i + c] as u32;
            self.pixels[i + c] = ((src[c] as u32 * a + d * inv) / 255) as u8;
        }
        let da = self.pixels[i + 3] as u32;
        self.pixels[i + 3] = (a + da * inv / 255).min(255) as u8;
    }

    /// Whether every pixel is fully transparent
    pub fn is_blank(&self) -> bool {
        self.pixels.chunks_exact(4).all(|px| px[3] == 0)
    }
}

/// CPU implementation of [`RenderContext`]
///
/// Owns the screen surface. While a [`SoftwareTarget`] is bound its surface
/// is attached here and drawing lands in it instead of the screen. The
/// viewport is tracked for transform-state fidelity; rasterization always
/// covers the full destination surface.
pub struct SoftwareContext {
    screen: PixelSurface,
    offscreen: Option<PixelSurface>,
    viewport: (u32, u32),
    ortho: Option<OrthoView>,
}

impl SoftwareContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: PixelSurface::new(width, height),
            offscreen: None,
            viewport: (width, height),
            ortho: None,
        }
    }

    /// The on-screen surface drawing lands in when no target is bound
    pub fn screen(&self) -> &PixelSurface {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut PixelSurface {
        &mut self.screen
    }

    pub(crate) fn has_attachment(&self) -> bool {
        self.offscreen.is_some()
    }

    pub(crate) fn attach(&mut self, surface: PixelSurface) {
        debug_assert!(self.offscreen.is_none());
        self.offscreen = Some(surface);
    }

    pub(crate) fn detach(&mut self) -> Option<PixelSurface> {
        self.offscreen.take()
    }

    fn current_mut(&mut self) -> &mut PixelSurface {
        match &mut self.offscreen {
            Some(surface) => surface,
            None => &mut self.screen,
        }
    }
}

impl RenderContext for SoftwareContext {
    fn save_transform(&self) -> TransformState {
        TransformState {
            viewport: self.viewport,
            ortho: self.ortho,
        }
    }

    fn restore_transform(&mut self, state: TransformState) {
        self.viewport = state.viewport;
        self.ortho = state.ortho;
    }

    fn set_ortho(&mut self, axes: SliceAxes, width: u32, height: u32, bounds: &Bounds3) {
        self.viewport = (width, height);
        self.ortho = Some(OrthoView {
            axes,
            x_range: bounds.range(axes.xax()),
            y_range: bounds.range(axes.yax()),
        });
    }

    fn clear(&mut self, color: Rgba) {
        self.current_mut().fill(color);
    }

    fn blit(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        x_range: (f64, f64),
        y_range: (f64, f64),
    ) {
        let ortho = match self.ortho {
            Some(ortho) => ortho,
            None => return,
        };
        if width == 0 || height == 0 {
            return;
        }
        debug_assert!(pixels.len() >= width as usize * height as usize * 4);
        if pixels.len() < width as usize * height as usize * 4 {
            return;
        }

        let dest = match &mut self.offscreen {
            Some(surface) => surface,
            None => &mut self.screen,
        };
        let (dw, dh) = (dest.width(), dest.height());
        if dw == 0 || dh == 0 {
            return;
        }

        let (ox0, oy0) = (ortho.x_range.0, ortho.y_range.0);
        let ospan_x = ortho.x_range.1 - ox0;
        let ospan_y = ortho.y_range.1 - oy0;
        let span_x = x_range.1 - x_range.0;
        let span_y = y_range.1 - y_range.0;
        if ospan_x == 0.0 || ospan_y == 0.0 || span_x == 0.0 || span_y == 0.0 {
            return;
        }

        // Forward-map the rectangle to bound the destination loops, then
        // inverse-map each destination pixel center for the sample lookup.
        let col_of = |x: f64| (x - ox0) / ospan_x * dw as f64;
        let row_of = |y: f64| (1.0 - (y - oy0) / ospan_y) * dh as f64;
        let c0 = col_of(x_range.0);
        let c1 = col_of(x_range.1);
        let r0 = row_of(y_range.0);
        let r1 = row_of(y_range.1);
        let col_lo = c0.min(c1).floor().max(0.0) as u32;
        let col_hi = c0.max(c1).ceil().min(dw as f64) as u32;
        let row_lo = r0.min(r1).floor().max(0.0) as u32;
        let row_hi = r0.max(r1).ceil().min(dh as f64) as u32;

        for row in row_lo..row_hi {
            let y = oy0 + (1.0 - (row as f64 + 0.5) / dh as f64) * ospan_y;
            let v = (y - y_range.0) / span_y;
            if !(0.0..=1.0).contains(&v) {
                continue;
            }
            let sr = ((((1.0 - v) * height as f64) as u32).min(height - 1)) as usize;
            for col in col_lo..col_hi {
                let x = ox0 + (col as f64 + 0.5) / dw as f64 * ospan_x;
                let u = (x - x_range.0) / span_x;
                if !(0.0..=1.0).contains(&u) {
                    continue;
                }
                let sc = (((u * width as f64) as u32).min(width - 1)) as usize;
                let i = (sr * width as usize + sc) * 4;
                let src = [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]];
                dest.blend_pixel(col, row, src);
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// CPU implementation of [`RenderTarget`] backed by a [`PixelSurface`]
pub struct SoftwareTarget {
    name: String,
    size: (u32, u32),
    surface: Option<PixelSurface>,
    bound: bool,
    released: bool,
}

impl SoftwareTarget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: (0, 0),
            surface: Some(PixelSurface::new(0, 0)),
            bound: false,
            released: false,
        }
    }

    /// The backing surface, absent while bound or after release
    pub fn surface(&self) -> Option<&PixelSurface> {
        self.surface.as_ref()
    }
}

impl RenderTarget for SoftwareTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn set_size(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if self.released {
            return Err(RenderError::Released(self.name.clone()));
        }
        if self.bound {
            return Err(RenderError::AlreadyBound(self.name.clone()));
        }
        if width == 0 || height == 0 || width > MAX_SURFACE_DIM || height > MAX_SURFACE_DIM {
            return Err(RenderError::InvalidSize {
                width,
                height,
                max: MAX_SURFACE_DIM,
            });
        }
        if self.size != (width, height) {
            log::trace!("target {} resized to {}x{}", self.name, width, height);
            self.surface = Some(PixelSurface::new(width, height));
            self.size = (width, height);
        }
        Ok(())
    }

    fn bind(&mut self, ctx: &mut dyn RenderContext) -> RenderResult<()> {
        if self.released {
            return Err(RenderError::Released(self.name.clone()));
        }
        let surface = match self.surface.take() {
            Some(surface) => surface,
            None => return Err(RenderError::AlreadyBound(self.name.clone())),
        };
        let software = match ctx.as_any_mut().downcast_mut::<SoftwareContext>() {
            Some(software) => software,
            None => {
                self.surface = Some(surface);
                return Err(RenderError::BackendMismatch(self.name.clone()));
            }
        };
        if software.has_attachment() {
            self.surface = Some(surface);
            return Err(RenderError::ContextOccupied);
        }
        software.attach(surface);
        self.bound = true;
        Ok(())
    }

    fn unbind(&mut self, ctx: &mut dyn RenderContext) {
        debug_assert!(self.bound, "unbind of unbound target {}", self.name);
        if !self.bound {
            return;
        }
        if let Some(software) = ctx.as_any_mut().downcast_mut::<SoftwareContext>() {
            if let Some(surface) = software.detach() {
                self.surface = Some(surface);
            }
        }
        self.bound = false;
    }

    fn draw_on_bounds(
        &mut self,
        ctx: &mut dyn RenderContext,
        _zpos: f64,
        x_range: (f64, f64),
        y_range: (f64, f64),
        _axes: SliceAxes,
        xform: Option<&SliceTransform>,
    ) -> RenderResult<()> {
        if self.released {
            return Err(RenderError::Released(self.name.clone()));
        }
        let surface = match &self.surface {
            Some(surface) => surface,
            None => return Err(RenderError::AlreadyBound(self.name.clone())),
        };
        let (x_range, y_range) = match xform {
            Some(xform) => {
                let (x0, y0) = xform.apply(x_range.0, y_range.0);
                let (x1, y1) = xform.apply(x_range.1, y_range.1);
                ((x0, x1), (y0, y1))
            }
            None => (x_range, y_range),
        };
        ctx.blit(
            surface.pixels(),
            surface.width(),
            surface.height(),
            x_range,
            y_range,
        );
        Ok(())
    }

    fn release(&mut self, ctx: &mut dyn RenderContext) {
        if self.bound {
            if let Some(software) = ctx.as_any_mut().downcast_mut::<SoftwareContext>() {
                software.detach();
            }
            self.bound = false;
        }
        self.surface = None;
        self.size = (0, 0);
        if !self.released {
            self.released = true;
            log::debug!("released target {}", self.name);
        }
    }
}

/// Factory minting software targets
pub fn software_target_factory() -> TargetFactory {
    std::sync::Arc::new(|name: &str| Box::new(SoftwareTarget::new(name)) as Box<dyn RenderTarget>)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba = [255, 0, 0, 255];
    const GREEN: Rgba = [0, 255, 0, 255];

    fn unit_axes() -> SliceAxes {
        SliceAxes::new(0, 1).unwrap()
    }

    fn square_bounds(extent: f64) -> Bounds3 {
        Bounds3::new([0.0, 0.0, 0.0], [extent, extent, extent])
    }

    #[test]
    fn test_surface_fill_and_read() {
        let mut surface = PixelSurface::new(2, 2);
        assert!(surface.is_blank());

        surface.fill(RED);
        assert_eq!(surface.pixel(0, 0), RED);
        assert_eq!(surface.pixel(1, 1), RED);
        assert!(!surface.is_blank());
    }

    #[test]
    fn test_blend_opaque_overwrites() {
        let mut surface = PixelSurface::new(1, 1);
        surface.put_pixel(0, 0, RED);
        surface.blend_pixel(0, 0, GREEN);
        assert_eq!(surface.pixel(0, 0), GREEN);
    }

    #[test]
    fn test_blend_zero_alpha_is_noop() {
        let mut surface = PixelSurface::new(1, 1);
        surface.put_pixel(0, 0, RED);
        surface.blend_pixel(0, 0, [0, 255, 0, 0]);
        assert_eq!(surface.pixel(0, 0), RED);
    }

    #[test]
    fn test_blend_semitransparent() {
        let mut surface = PixelSurface::new(1, 1);
        surface.put_pixel(0, 0, RED);
        surface.blend_pixel(0, 0, [0, 255, 0, 128]);
        assert_eq!(surface.pixel(0, 0), [127, 128, 0, 255]);
    }

    #[test]
    fn test_clear_without_attachment_hits_screen() {
        let mut ctx = SoftwareContext::new(2, 2);
        ctx.clear(RED);
        assert_eq!(ctx.screen().pixel(1, 0), RED);
    }

    #[test]
    fn test_blit_identity_mapping() {
        let mut ctx = SoftwareContext::new(4, 4);
        ctx.set_ortho(unit_axes(), 4, 4, &square_bounds(4.0));

        // Source pixel (0, 0) is the top-left of the rectangle and must land
        // in the top-left of the destination.
        let mut src = PixelSurface::new(4, 4);
        src.put_pixel(0, 0, RED);
        src.put_pixel(3, 3, GREEN);
        ctx.blit(src.pixels(), 4, 4, (0.0, 4.0), (0.0, 4.0));

        assert_eq!(ctx.screen().pixel(0, 0), RED);
        assert_eq!(ctx.screen().pixel(3, 3), GREEN);
        assert_eq!(ctx.screen().pixel(2, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn test_blit_subrectangle() {
        let mut ctx = SoftwareContext::new(4, 4);
        ctx.set_ortho(unit_axes(), 4, 4, &square_bounds(4.0));

        let mut src = PixelSurface::new(1, 1);
        src.put_pixel(0, 0, RED);
        ctx.blit(src.pixels(), 1, 1, (1.0, 2.0), (1.0, 2.0));

        // y in (1, 2) is the third row from the top of a 4-unit-high view.
        assert_eq!(ctx.screen().pixel(1, 2), RED);
        for (x, y) in [(0, 0), (1, 1), (2, 2), (1, 3), (3, 3)] {
            assert_eq!(ctx.screen().pixel(x, y), [0, 0, 0, 0], "({}, {})", x, y);
        }
    }

    #[test]
    fn test_blit_clips_outside_view() {
        let mut ctx = SoftwareContext::new(2, 2);
        ctx.set_ortho(unit_axes(), 2, 2, &square_bounds(2.0));

        let mut src = PixelSurface::new(1, 1);
        src.put_pixel(0, 0, RED);
        ctx.blit(src.pixels(), 1, 1, (5.0, 6.0), (5.0, 6.0));
        assert!(ctx.screen().is_blank());
    }

    #[test]
    fn test_blit_without_ortho_is_noop() {
        let mut ctx = SoftwareContext::new(2, 2);
        let src = PixelSurface::new(1, 1);
        ctx.blit(src.pixels(), 1, 1, (0.0, 1.0), (0.0, 1.0));
        assert!(ctx.screen().is_blank());
    }

    #[test]
    fn test_save_restore_transform() {
        let mut ctx = SoftwareContext::new(2, 2);
        ctx.set_ortho(unit_axes(), 8, 8, &square_bounds(1.0));
        let saved = ctx.save_transform();

        ctx.set_ortho(SliceAxes::new(1, 2).unwrap(), 2, 2, &square_bounds(5.0));
        assert_ne!(ctx.save_transform(), saved);

        ctx.restore_transform(saved);
        assert_eq!(ctx.save_transform(), saved);
    }

    #[test]
    fn test_set_size_validation() {
        let mut target = SoftwareTarget::new("t");
        assert!(matches!(
            target.set_size(0, 64),
            Err(RenderError::InvalidSize { .. })
        ));
        assert!(matches!(
            target.set_size(MAX_SURFACE_DIM + 1, 64),
            Err(RenderError::InvalidSize { .. })
        ));

        target.set_size(32, 16).unwrap();
        assert_eq!(target.size(), (32, 16));
    }

    #[test]
    fn test_set_size_unchanged_keeps_content() {
        let mut target = SoftwareTarget::new("t");
        target.set_size(2, 2).unwrap();

        let mut ctx = SoftwareContext::new(1, 1);
        target.bind(&mut ctx).unwrap();
        ctx.clear(RED);
        target.unbind(&mut ctx);

        target.set_size(2, 2).unwrap();
        assert_eq!(target.surface().unwrap().pixel(0, 0), RED);

        target.set_size(3, 2).unwrap();
        assert!(target.surface().unwrap().is_blank());
    }

    #[test]
    fn test_bind_redirects_drawing() {
        let mut ctx = SoftwareContext::new(2, 2);
        let mut target = SoftwareTarget::new("t");
        target.set_size(2, 2).unwrap();

        target.bind(&mut ctx).unwrap();
        assert!(target.surface().is_none());
        ctx.clear(GREEN);
        target.unbind(&mut ctx);

        assert_eq!(target.surface().unwrap().pixel(0, 0), GREEN);
        assert!(ctx.screen().is_blank());
    }

    #[test]
    fn test_double_bind_fails() {
        let mut ctx = SoftwareContext::new(1, 1);
        let mut target = SoftwareTarget::new("t");
        target.set_size(1, 1).unwrap();

        target.bind(&mut ctx).unwrap();
        assert!(matches!(
            target.bind(&mut ctx),
            Err(RenderError::AlreadyBound(_))
        ));
        target.unbind(&mut ctx);
    }

    #[test]
    fn test_second_target_cannot_bind_occupied_context() {
        let mut ctx = SoftwareContext::new(1, 1);
        let mut first = SoftwareTarget::new("first");
        let mut second = SoftwareTarget::new("second");
        first.set_size(1, 1).unwrap();
        second.set_size(1, 1).unwrap();

        first.bind(&mut ctx).unwrap();
        assert!(matches!(
            second.bind(&mut ctx),
            Err(RenderError::ContextOccupied)
        ));
        first.unbind(&mut ctx);
    }

    #[test]
    fn test_draw_on_bounds_roundtrip() {
        let mut ctx = SoftwareContext::new(4, 4);
        let mut target = SoftwareTarget::new("t");
        target.set_size(4, 4).unwrap();

        let bounds = square_bounds(4.0);
        ctx.set_ortho(unit_axes(), 4, 4, &bounds);
        target.bind(&mut ctx).unwrap();
        ctx.clear(RED);
        target.unbind(&mut ctx);

        target
            .draw_on_bounds(&mut ctx, 0.0, (0.0, 4.0), (0.0, 4.0), unit_axes(), None)
            .unwrap();
        assert_eq!(ctx.screen().pixel(0, 0), RED);
        assert_eq!(ctx.screen().pixel(3, 3), RED);
    }

    #[test]
    fn test_draw_on_bounds_with_transform() {
        let mut ctx = SoftwareContext::new(4, 4);
        let mut target = SoftwareTarget::new("t");
        target.set_size(2, 2).unwrap();

        ctx.set_ortho(unit_axes(), 4, 4, &square_bounds(4.0));
        target.bind(&mut ctx).unwrap();
        ctx.clear(GREEN);
        target.unbind(&mut ctx);

        // Shrink the unit square onto (1, 2) in both axes.
        let xform = SliceTransform {
            scale: [1.0, 1.0],
            offset: [1.0, 1.0],
        };
        target
            .draw_on_bounds(
                &mut ctx,
                0.0,
                (0.0, 1.0),
                (0.0, 1.0),
                unit_axes(),
                Some(&xform),
            )
            .unwrap();

        assert_eq!(ctx.screen().pixel(1, 2), GREEN);
        assert_eq!(ctx.screen().pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_release_is_terminal_and_idempotent() {
        let mut ctx = SoftwareContext::new(1, 1);
        let mut target = SoftwareTarget::new("t");
        target.set_size(1, 1).unwrap();

        target.release(&mut ctx);
        target.release(&mut ctx);

        assert_eq!(target.size(), (0, 0));
        assert!(target.surface().is_none());
        assert!(matches!(
            target.set_size(1, 1),
            Err(RenderError::Released(_))
        ));
        assert!(matches!(target.bind(&mut ctx), Err(RenderError::Released(_))));
    }

    #[test]
    fn test_release_while_bound_detaches() {
        let mut ctx = SoftwareContext::new(1, 1);
        let mut target = SoftwareTarget::new("t");
        target.set_size(1, 1).unwrap();

        target.bind(&mut ctx).unwrap();
        target.release(&mut ctx);
        assert!(!ctx.has_attachment());

        // The context is usable again afterwards.
        let mut other = SoftwareTarget::new("other");
        other.set_size(1, 1).unwrap();
        other.bind(&mut ctx).unwrap();
        other.unbind(&mut ctx);
    }

    #[test]
    fn test_factory_names_targets() {
        let factory = software_target_factory();
        let target = factory("stack0.slot5");
        assert_eq!(target.name(), "stack0.slot5");
    }
}
