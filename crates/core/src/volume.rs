//! In-memory scalar volumes
//!
//! A [`Volume`] is a 3D grid of f32 intensities with a physical voxel
//! size, loaded from a NIFTI file or built directly from an array. Its
//! display space is the voxel grid scaled by voxel size, with the
//! origin at the corner of voxel `(0, 0, 0)`.

use std::path::Path;

use ndarray::{Array3, Axis, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};

use sliceview_render::Bounds3;

/// Errors from loading or constructing volumes
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("failed to read image: {0}")]
    Nifti(#[from] nifti::NiftiError),

    #[error("unsupported image dimensionality: {0}")]
    UnsupportedDimensionality(usize),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("volume has a degenerate shape: {0:?}")]
    EmptyVolume([usize; 3]),
}

pub type VolumeResult<T> = Result<T, VolumeError>;

/// A named scalar volume with voxel spacing and a cached intensity range
pub struct Volume {
    name: String,
    data: Array3<f32>,
    voxel_size: [f64; 3],
    intensity_range: (f32, f32),
}

impl Volume {
    /// Load a volume from a NIFTI-1 file (`.nii` or `.nii.gz`)
    ///
    /// 4D images are reduced to their first volume. Voxel spacing comes
    /// from the header `pixdim` fields; non-positive spacings fall back
    /// to 1.0.
    pub fn open(path: &Path) -> VolumeResult<Self> {
        let obj = ReaderOptions::new().read_file(path)?;
        let header = obj.header().clone();
        let data = obj.into_volume().into_ndarray::<f32>()?;
        let data = match data.ndim() {
            3 => data.into_dimensionality::<Ix3>()?,
            4 => {
                log::info!("{}: 4D image, using the first volume", path.display());
                data.index_axis_move(Axis(3), 0).into_dimensionality::<Ix3>()?
            }
            n => return Err(VolumeError::UnsupportedDimensionality(n)),
        };
        let voxel_size = [
            header.pixdim[1] as f64,
            header.pixdim[2] as f64,
            header.pixdim[3] as f64,
        ];
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("volume");
        log::debug!(
            "{}: loaded {:?} voxels at {:?} spacing",
            name,
            data.shape(),
            voxel_size
        );
        Self::from_array(name, data, voxel_size)
    }

    /// Build a volume from an array and voxel spacing
    ///
    /// Scans the data once to cache the finite intensity range used for
    /// display normalisation.
    pub fn from_array(name: &str, data: Array3<f32>, voxel_size: [f64; 3]) -> VolumeResult<Self> {
        let (nx, ny, nz) = data.dim();
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(VolumeError::EmptyVolume([nx, ny, nz]));
        }

        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &value in data.iter() {
            if value.is_finite() {
                lo = lo.min(value);
                hi = hi.max(value);
            }
        }
        let intensity_range = if lo > hi { (0.0, 1.0) } else { (lo, hi) };

        let voxel_size = voxel_size.map(|d| if d.is_finite() && d > 0.0 { d } else { 1.0 });

        Ok(Self {
            name: name.to_string(),
            data,
            voxel_size,
            intensity_range,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Voxel counts along the three axes
    pub fn shape(&self) -> [usize; 3] {
        let (nx, ny, nz) = self.data.dim();
        [nx, ny, nz]
    }

    /// Physical voxel extent along the three axes
    pub fn voxel_size(&self) -> [f64; 3] {
        self.voxel_size
    }

    /// The volume's extent in display coordinates
    pub fn bounds(&self) -> Bounds3 {
        let shape = self.shape();
        Bounds3::new(
            [0.0, 0.0, 0.0],
            [
                shape[0] as f64 * self.voxel_size[0],
                shape[1] as f64 * self.voxel_size[1],
                shape[2] as f64 * self.voxel_size[2],
            ],
        )
    }

    /// Smallest and largest finite intensity in the data
    pub fn intensity_range(&self) -> (f32, f32) {
        self.intensity_range
    }

    /// The raw data grid
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Intensity at one voxel, or `None` outside the grid
    pub fn value_at(&self, index: [usize; 3]) -> Option<f32> {
        self.data.get((index[0], index[1], index[2])).copied()
    }

    /// The voxel containing a display-space position along one axis
    ///
    /// Positions outside the volume clamp to the nearest edge voxel.
    pub fn world_to_voxel(&self, axis: usize, pos: f64) -> usize {
        let cell = (pos / self.voxel_size[axis]).floor() as i64;
        cell.clamp(0, self.shape()[axis] as i64 - 1) as usize
    }

    /// Map an intensity onto `[0, 1]` within the volume's range
    pub fn normalized(&self, value: f32) -> f32 {
        window_intensity(self.intensity_range, value)
    }
}

/// Map an intensity onto `[0, 1]` within a display window
///
/// Non-finite values and degenerate windows map to zero.
pub fn window_intensity(window: (f32, f32), value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    let (lo, hi) = window;
    if hi > lo {
        ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
