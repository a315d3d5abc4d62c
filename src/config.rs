//! Per-session presentation settings.

use crate::compositor::Grayscale;
use crate::enums::{GrayscaleMapping, Orientation, OverlaySlot, SceneLayer};
use crate::scene::SceneView;
use crate::volume::{Dims, VolumeBuffer};

use serde::{Deserialize, Serialize};

/// Inputs that must be present before the 3D scene may be built.
///
/// The base volume is always required.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneRequirements {
    pub t1_overlay: bool,
    pub t2_overlay: bool,
    pub annotations: bool,
}

impl Default for SceneRequirements {
    fn default() -> Self {
        Self {
            t1_overlay: true,
            t2_overlay: false,
            annotations: true,
        }
    }
}

impl SceneRequirements {
    /// Only the base volume is needed.
    pub fn base_only() -> Self {
        Self {
            t1_overlay: false,
            t2_overlay: false,
            annotations: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Isosurface contour for the base volume
    pub threshold: f64,
    pub base_opacity: f32,
    pub t1_opacity: f32,
    pub t2_opacity: f32,
    pub color_level: f64,
    pub color_window: f64,
    pub grayscale: GrayscaleMapping,
    pub axial_slice: usize,
    pub coronal_slice: usize,
    pub sagittal_slice: usize,
    pub multi_view: bool,
    pub requirements: SceneRequirements,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            base_opacity: 0.5,
            t1_opacity: 0.5,
            t2_opacity: 0.5,
            color_level: 127.0,
            color_window: 255.0,
            grayscale: GrayscaleMapping::default(),
            axial_slice: 0,
            coronal_slice: 0,
            sagittal_slice: 0,
            multi_view: false,
            requirements: SceneRequirements::default(),
        }
    }
}

impl ViewConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn slice(&self, orientation: Orientation) -> usize {
        match orientation {
            Orientation::Axial => self.axial_slice,
            Orientation::Coronal => self.coronal_slice,
            Orientation::Sagittal => self.sagittal_slice,
        }
    }

    /// Set a slice offset, clamped to `[0, dim-1]` along the plane's normal.
    pub fn set_slice(&mut self, orientation: Orientation, slice: usize, dims: Dims) {
        let last = dims.slice_count(orientation).saturating_sub(1);
        let slice = slice.min(last);
        match orientation {
            Orientation::Axial => self.axial_slice = slice,
            Orientation::Coronal => self.coronal_slice = slice,
            Orientation::Sagittal => self.sagittal_slice = slice,
        }
    }

    pub fn clamp_slices(&mut self, dims: Dims) {
        for orientation in Orientation::ALL {
            self.set_slice(orientation, self.slice(orientation), dims);
        }
    }

    pub fn opacity(&self, layer: SceneLayer) -> f32 {
        match layer {
            SceneLayer::Base => self.base_opacity,
            SceneLayer::Overlay(OverlaySlot::T1) => self.t1_opacity,
            SceneLayer::Overlay(OverlaySlot::T2) => self.t2_opacity,
        }
    }

    pub fn set_opacity(&mut self, layer: SceneLayer, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        match layer {
            SceneLayer::Base => self.base_opacity = opacity,
            SceneLayer::Overlay(OverlaySlot::T1) => self.t1_opacity = opacity,
            SceneLayer::Overlay(OverlaySlot::T2) => self.t2_opacity = opacity,
        }
    }

    /// Derive level/window from the scan's value range and center the slices.
    pub fn fit_to_volume(&mut self, volume: &VolumeBuffer) {
        let (min, max) = volume.value_range();
        self.color_level = (min + max) / 2.0;
        self.color_window = max;
        let dims = volume.dims();
        self.axial_slice = dims.nz / 2;
        self.coronal_slice = dims.ny / 2;
        self.sagittal_slice = dims.nx / 2;
    }

    pub fn grayscale(&self) -> Grayscale {
        Grayscale {
            mapping: self.grayscale,
            level: self.color_level,
            window: self.color_window,
        }
    }

    pub fn scene_view(&self) -> SceneView {
        SceneView {
            threshold: self.threshold,
            base_opacity: self.base_opacity,
            t1_opacity: self.t1_opacity,
            t2_opacity: self.t2_opacity,
            color_level: self.color_level,
            color_window: self.color_window,
            slices: [self.sagittal_slice, self.coronal_slice, self.axial_slice],
            multi_view: self.multi_view,
        }
    }
}
