use crate::annotation::Annotation;
use crate::compositor::{SliceRequest, blend};

use image::RgbaImage;

/// Markers are drawn only within this many voxels of the slice, either side.
pub const PROXIMITY_WINDOW: f64 = 3.0;
/// Distance at which a marker would fade out completely.
pub const FADE_DISTANCE: f64 = 5.0;
/// Marker disc radius in raster pixels.
pub const MARKER_RADIUS: f64 = 4.0;

const OUTLINE_COLOR: [u8; 3] = [0, 0, 0];

/// A marker draw command in raster coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub screen_x: f64,
    pub screen_y: f64,
    pub color: [u8; 3],
    pub alpha: f32,
    /// Store position of the source annotation
    pub index: usize,
}

pub struct AnnotationProjector;

impl AnnotationProjector {
    /// Project annotations near the requested slice onto its raster.
    ///
    /// Coordinates are rounded to the nearest voxel first. `plane_height` is
    /// the raster height, used for vertically flipped views.
    pub fn project(
        annotations: &[Annotation],
        request: &SliceRequest,
        plane_height: usize,
    ) -> Vec<Marker> {
        let normal = request.orientation.normal_axis();
        let (u_axis, v_axis) = request.orientation.screen_axes();
        let slice = request.slice as f64;

        annotations
            .iter()
            .filter_map(|annotation| {
                let position = annotation.position.map(f64::round);
                let distance = (position[normal] - slice).abs();
                if distance >= PROXIMITY_WINDOW || distance.is_nan() {
                    return None;
                }
                let screen_y = if request.flip_vertical {
                    (plane_height as f64 - 1.0) - position[v_axis]
                } else {
                    position[v_axis]
                };
                Some(Marker {
                    screen_x: position[u_axis],
                    screen_y,
                    color: annotation.color.to_u8(),
                    alpha: (1.0 - distance / FADE_DISTANCE) as f32,
                    index: annotation.index,
                })
            })
            .collect()
    }

    /// Paint markers as filled discs with a dark outline, clipped to the raster.
    pub fn paint(raster: &mut RgbaImage, markers: &[Marker]) {
        let (width, height) = raster.dimensions();
        let reach = MARKER_RADIUS + 0.5;
        for marker in markers {
            let x0 = (marker.screen_x - reach).floor().max(0.0) as u32;
            let y0 = (marker.screen_y - reach).floor().max(0.0) as u32;
            let x1 = (marker.screen_x + reach).ceil().min(width as f64 - 1.0);
            let y1 = (marker.screen_y + reach).ceil().min(height as f64 - 1.0);
            if x1 < 0.0 || y1 < 0.0 {
                continue;
            }
            for py in y0..=y1 as u32 {
                for px in x0..=x1 as u32 {
                    let dx = px as f64 - marker.screen_x;
                    let dy = py as f64 - marker.screen_y;
                    let d = (dx * dx + dy * dy).sqrt();
                    let pixel = &mut raster.get_pixel_mut(px, py).0;
                    if d <= MARKER_RADIUS - 0.5 {
                        blend(pixel, marker.color, marker.alpha);
                    } else if d <= reach {
                        blend(pixel, OUTLINE_COLOR, 1.0);
                    }
                }
            }
        }
    }
}
