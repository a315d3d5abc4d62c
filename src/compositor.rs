use crate::enums::{GrayscaleMapping, Orientation};
use crate::volume::VolumeBuffer;

use image::RgbaImage;
use rayon::prelude::*;
use web_time::Instant;

/// Display color of the first (T1) mask.
pub const T1_COLOR: [u8; 3] = [255, 255, 0];
/// Display color of the second (T2) mask.
pub const T2_COLOR: [u8; 3] = [0, 255, 0];
/// Color used where both masks are set.
pub const OVERLAP_COLOR: [u8; 3] = [255, 128, 0];

/// Scalar to 8-bit grayscale transfer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grayscale {
    pub mapping: GrayscaleMapping,
    pub level: f64,
    pub window: f64,
}

impl Grayscale {
    pub fn clamp() -> Self {
        Self {
            mapping: GrayscaleMapping::Clamp,
            level: 127.0,
            window: 255.0,
        }
    }

    pub fn window(level: f64, window: f64) -> Self {
        Self {
            mapping: GrayscaleMapping::Window,
            level,
            window,
        }
    }

    /// Map one scalar. A window that is not positive (an all-zero scan fitted
    /// to its own range) falls back to the raw clamp.
    #[inline]
    pub fn map(&self, value: f64) -> u8 {
        if self.mapping == GrayscaleMapping::Window && self.window > 0.0 {
            let lower = self.level - self.window / 2.0;
            ((value - lower) / self.window * 255.0)
                .clamp(0.0, 255.0)
                .round() as u8
        } else {
            // NaN saturates to 0 on the cast.
            value.clamp(0.0, 255.0).round() as u8
        }
    }
}

/// A binary mask drawn over the base slice.
#[derive(Clone, Copy, Debug)]
pub struct OverlayLayer<'a> {
    pub volume: &'a VolumeBuffer,
    pub color: [u8; 3],
    pub opacity: f32,
}

/// Which masks cover a pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Coverage {
    None,
    First,
    Second,
    Both,
}

/// Parameters of one slice render.
#[derive(Clone, Copy, Debug)]
pub struct SliceRequest {
    pub orientation: Orientation,
    pub slice: usize,
    pub flip_vertical: bool,
    pub grayscale: Grayscale,
}

/// Builds the 2D raster for one plane from a base volume and up to two masks.
#[derive(Clone, Copy, Debug)]
pub struct SliceCompositor {
    pub overlap_color: [u8; 3],
}

impl Default for SliceCompositor {
    fn default() -> Self {
        Self {
            overlap_color: OVERLAP_COLOR,
        }
    }
}

impl SliceCompositor {
    /// Compose one RGBA raster sized to the plane's free axes.
    ///
    /// The base pass is fully opaque. Overlays whose dimensions differ from
    /// the base, and any overlay beyond the second, contribute nothing. The
    /// caller guarantees `request.slice` is within the plane's slice count.
    pub fn compose(
        &self,
        base: &VolumeBuffer,
        overlays: &[OverlayLayer<'_>],
        request: &SliceRequest,
    ) -> RgbaImage {
        debug_assert!(
            base.is_valid_index(request.slice, request.orientation),
            "slice {} out of range for {:?}",
            request.slice,
            request.orientation
        );
        let started = Instant::now();
        let dims = base.dims();
        let (width, height) = dims.plane_size(request.orientation);

        for layer in overlays.iter().filter(|l| l.volume.dims() != dims) {
            log::warn!(
                "Skipping overlay with dims {:?}, base is {:?}",
                layer.volume.dims(),
                dims
            );
        }
        // Slot positions are kept so a lone second mask still gets its own color.
        let usable = |layer: &&OverlayLayer<'_>| layer.volume.dims() == dims;
        let first = overlays.first().filter(usable);
        let second = overlays.get(1).filter(usable);

        let mut raster = RgbaImage::new(width as u32, height as u32);
        raster
            .par_chunks_mut(width * 4)
            .enumerate()
            .for_each(|(py, row)| {
                let v = if request.flip_vertical {
                    height - 1 - py
                } else {
                    py
                };
                for (u, pixel) in row.chunks_exact_mut(4).enumerate() {
                    let gray = request
                        .grayscale
                        .map(base.plane_value(request.orientation, u, v, request.slice));
                    pixel.copy_from_slice(&[gray, gray, gray, 255]);

                    let covered = |layer: Option<&OverlayLayer<'_>>| {
                        layer.is_some_and(|l| {
                            l.volume.plane_value(request.orientation, u, v, request.slice) > 0.0
                        })
                    };
                    let coverage = match (covered(first), covered(second)) {
                        (true, true) => Coverage::Both,
                        (true, false) => Coverage::First,
                        (false, true) => Coverage::Second,
                        (false, false) => Coverage::None,
                    };
                    if let Some((color, alpha)) = self.classify(coverage, first, second) {
                        blend(pixel, color, alpha);
                    }
                }
            });

        log::debug!(
            "Composed {} slice {} ({}x{}, {} overlays) in {:?}",
            request.orientation.name(),
            request.slice,
            width,
            height,
            first.iter().chain(second.iter()).count(),
            started.elapsed()
        );
        raster
    }

    fn classify(
        &self,
        coverage: Coverage,
        first: Option<&OverlayLayer<'_>>,
        second: Option<&OverlayLayer<'_>>,
    ) -> Option<([u8; 3], f32)> {
        match (coverage, first, second) {
            (Coverage::Both, Some(a), Some(b)) => {
                Some((self.overlap_color, a.opacity.max(b.opacity)))
            }
            (Coverage::First, Some(a), _) => Some((a.color, a.opacity)),
            (Coverage::Second, _, Some(b)) => Some((b.color, b.opacity)),
            _ => None,
        }
    }
}

/// Source-over blend of an opaque color onto an RGBA pixel, leaving its alpha.
#[inline]
pub fn blend(pixel: &mut [u8], color: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for (dst, src) in pixel.iter_mut().zip(color) {
        *dst = (src as f32 * alpha + *dst as f32 * (1.0 - alpha)).round() as u8;
    }
}
