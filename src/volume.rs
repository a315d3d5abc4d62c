use crate::enums::Orientation;

use ndarray::Array3;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum VolumeError {
    #[error("Volume dimensions must be non-zero, got {0:?}")]
    EmptyDims(Dims),

    #[error("Expected {expected} scalars for the given dimensions, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

/// Grid extents along x, y and z.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Dims {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    pub fn voxel_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Extent along an axis (0 = x, 1 = y, 2 = z).
    pub fn axis(&self, axis: usize) -> usize {
        match axis {
            0 => self.nx,
            1 => self.ny,
            _ => self.nz,
        }
    }

    /// (width, height) of the raster produced for a plane
    pub fn plane_size(&self, orientation: Orientation) -> (usize, usize) {
        let (u, v) = orientation.screen_axes();
        (self.axis(u), self.axis(v))
    }

    /// Number of slices available along the plane's normal.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        self.axis(orientation.normal_axis())
    }

    /// Linear index of the voxel at in-plane coordinates (u, v) on `slice`.
    ///
    /// `u` runs along the plane's horizontal axis and `v` along its vertical
    /// axis. The caller guarantees `slice < slice_count(orientation)`.
    #[inline]
    pub fn plane_voxel_index(
        &self,
        orientation: Orientation,
        u: usize,
        v: usize,
        slice: usize,
    ) -> usize {
        match orientation {
            Orientation::Axial => voxel_index(self, u, v, slice),
            Orientation::Coronal => voxel_index(self, u, slice, v),
            Orientation::Sagittal => voxel_index(self, slice, u, v),
        }
    }
}

/// Row-major voxel addressing with x varying fastest.
#[inline]
pub fn voxel_index(dims: &Dims, x: usize, y: usize, z: usize) -> usize {
    x + y * dims.nx + z * dims.nx * dims.ny
}

/// One decoded scan: a flat scalar grid plus its value range.
///
/// Immutable once built; the main scan and both overlay masks are
/// independent instances.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeBuffer {
    dims: Dims,
    scalars: Vec<f64>,
    value_range: (f64, f64),
}

impl VolumeBuffer {
    pub fn from_scalars(dims: Dims, scalars: Vec<f64>) -> Result<Self, VolumeError> {
        if dims.nx == 0 || dims.ny == 0 || dims.nz == 0 {
            return Err(VolumeError::EmptyDims(dims));
        }
        if scalars.len() != dims.voxel_count() {
            return Err(VolumeError::ShapeMismatch {
                expected: dims.voxel_count(),
                actual: scalars.len(),
            });
        }
        let value_range = Self::compute_range(&scalars);
        Ok(Self {
            dims,
            scalars,
            value_range,
        })
    }

    /// Build from an array shaped (depth, height, width), i.e. indexed `[z, y, x]`.
    pub fn from_array(data: Array3<f64>) -> Result<Self, VolumeError> {
        let (nz, ny, nx) = data.dim();
        // Logical iteration order of a (z, y, x) array is x-fastest.
        let scalars: Vec<f64> = data.iter().copied().collect();
        Self::from_scalars(Dims::new(nx, ny, nz), scalars)
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn scalars(&self) -> &[f64] {
        &self.scalars
    }

    /// (min, max) over all scalars, NaNs ignored
    pub fn value_range(&self) -> (f64, f64) {
        self.value_range
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
        self.scalars[voxel_index(&self.dims, x, y, z)]
    }

    #[inline]
    pub fn plane_value(&self, orientation: Orientation, u: usize, v: usize, slice: usize) -> f64 {
        self.scalars[self.dims.plane_voxel_index(orientation, u, v, slice)]
    }

    pub fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        index < self.dims.slice_count(orientation)
    }

    fn compute_range(scalars: &[f64]) -> (f64, f64) {
        scalars
            .par_iter()
            .map(|&v| (v, v))
            .reduce(
                || (f64::INFINITY, f64::NEG_INFINITY),
                |a, b| (a.0.min(b.0), a.1.max(b.1)),
            )
    }
}
