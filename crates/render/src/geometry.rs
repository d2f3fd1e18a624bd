//! Display-space geometry for orthographic slice views
//!
//! The engine works in a 3D display coordinate system. A slice view picks two
//! display axes to show in-plane and slices along the third.

use std::fmt;

/// Axis-aligned bounds of a renderable in display coordinates
///
/// Axis arguments to the accessors must be in `0..3`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds3 {
    pub lo: [f64; 3],
    pub hi: [f64; 3],
}

impl Bounds3 {
    pub fn new(lo: [f64; 3], hi: [f64; 3]) -> Self {
        Self { lo, hi }
    }

    /// Lower bound along one axis
    pub fn lo(&self, axis: usize) -> f64 {
        self.lo[axis]
    }

    /// Upper bound along one axis
    pub fn hi(&self, axis: usize) -> f64 {
        self.hi[axis]
    }

    /// `(lo, hi)` along one axis
    pub fn range(&self, axis: usize) -> (f64, f64) {
        (self.lo[axis], self.hi[axis])
    }

    /// Extent along one axis
    pub fn span(&self, axis: usize) -> f64 {
        self.hi[axis] - self.lo[axis]
    }

    /// Midpoint along one axis
    pub fn center(&self, axis: usize) -> f64 {
        0.5 * (self.lo[axis] + self.hi[axis])
    }

    /// Whether every axis has a strictly positive extent
    pub fn is_valid(&self) -> bool {
        (0..3).all(|axis| self.span(axis) > 0.0)
    }
}

/// The axis assignment of a slice view
///
/// `xax` and `yax` are the display axes shown horizontally and vertically
/// in-plane; `zax` is the remaining axis, along which slices are taken.
/// `zax` is always derived, so the three axes are a permutation of `{0,1,2}`
/// by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceAxes {
    xax: usize,
    yax: usize,
    zax: usize,
}

impl SliceAxes {
    /// The XY plane, sliced along axis 2
    pub const XY: SliceAxes = SliceAxes {
        xax: 0,
        yax: 1,
        zax: 2,
    };
    /// The XZ plane, sliced along axis 1
    pub const XZ: SliceAxes = SliceAxes {
        xax: 0,
        yax: 2,
        zax: 1,
    };
    /// The YZ plane, sliced along axis 0
    pub const YZ: SliceAxes = SliceAxes {
        xax: 1,
        yax: 2,
        zax: 0,
    };

    /// Build an axis assignment from the two in-plane axes
    ///
    /// Returns `None` unless `xax` and `yax` are distinct axes in `0..3`.
    pub fn new(xax: usize, yax: usize) -> Option<Self> {
        if xax > 2 || yax > 2 || xax == yax {
            return None;
        }
        Some(Self {
            xax,
            yax,
            zax: 3 - xax - yax,
        })
    }

    /// Horizontal in-plane display axis
    pub fn xax(&self) -> usize {
        self.xax
    }

    /// Vertical in-plane display axis
    pub fn yax(&self) -> usize {
        self.yax
    }

    /// Slice (depth) display axis
    pub fn zax(&self) -> usize {
        self.zax
    }
}

impl fmt::Display for SliceAxes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xax={} yax={} zax={}", self.xax, self.yax, self.zax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_accessors() {
        let bounds = Bounds3::new([0.0, -1.0, 2.0], [4.0, 1.0, 5.0]);

        assert_eq!(bounds.lo(0), 0.0);
        assert_eq!(bounds.hi(2), 5.0);
        assert_eq!(bounds.range(1), (-1.0, 1.0));
        assert_eq!(bounds.span(0), 4.0);
        assert_eq!(bounds.span(2), 3.0);
        assert_eq!(bounds.center(1), 0.0);
        assert!(bounds.is_valid());
    }

    #[test]
    fn test_bounds_invalid_when_degenerate() {
        let flat = Bounds3::new([0.0, 0.0, 0.0], [1.0, 0.0, 1.0]);
        assert!(!flat.is_valid());

        let inverted = Bounds3::new([0.0, 0.0, 2.0], [1.0, 1.0, 1.0]);
        assert!(!inverted.is_valid());
    }

    #[test]
    fn test_axes_derive_slice_axis() {
        let axes = SliceAxes::new(0, 1).unwrap();
        assert_eq!(axes.zax(), 2);

        let axes = SliceAxes::new(0, 2).unwrap();
        assert_eq!(axes.zax(), 1);

        let axes = SliceAxes::new(2, 1).unwrap();
        assert_eq!(axes.zax(), 0);
    }

    #[test]
    fn test_named_planes_match_new() {
        assert_eq!(Some(SliceAxes::XY), SliceAxes::new(0, 1));
        assert_eq!(Some(SliceAxes::XZ), SliceAxes::new(0, 2));
        assert_eq!(Some(SliceAxes::YZ), SliceAxes::new(1, 2));
    }

    #[test]
    fn test_axes_reject_invalid() {
        assert!(SliceAxes::new(0, 0).is_none());
        assert!(SliceAxes::new(3, 1).is_none());
        assert!(SliceAxes::new(1, 5).is_none());
    }

    #[test]
    fn test_axes_display() {
        let axes = SliceAxes::new(1, 2).unwrap();
        assert_eq!(axes.to_string(), "xax=1 yax=2 zax=0");
    }
}
