use serde::{Deserialize, Serialize};

/// One of the three canonical cross-sections through the volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Fixes z, iterates (x, y)
    Axial,
    /// Fixes y, iterates (x, z)
    Coronal,
    /// Fixes x, iterates (y, z)
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    /// Axis index (0 = x, 1 = y, 2 = z) held fixed by this plane.
    pub fn normal_axis(self) -> usize {
        match self {
            Orientation::Axial => 2,
            Orientation::Coronal => 1,
            Orientation::Sagittal => 0,
        }
    }

    /// Axis indices mapped to the screen's horizontal and vertical directions.
    pub fn screen_axes(self) -> (usize, usize) {
        match self {
            Orientation::Axial => (0, 1),
            Orientation::Coronal => (0, 2),
            Orientation::Sagittal => (1, 2),
        }
    }

    /// Axial slices are shown as stored; coronal and sagittal are shown head-up.
    pub fn default_flip(self) -> bool {
        !matches!(self, Orientation::Axial)
    }

    pub fn name(self) -> &'static str {
        match self {
            Orientation::Axial => "axial",
            Orientation::Coronal => "coronal",
            Orientation::Sagittal => "sagittal",
        }
    }
}

/// Overlay mask slots composited on top of the base scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OverlaySlot {
    T1,
    T2,
}

/// Isosurface layers held by the 3D scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SceneLayer {
    Base,
    Overlay(OverlaySlot),
}

/// How raw scalars are turned into 8-bit grayscale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrayscaleMapping {
    /// Raw scalar clamped to [0, 255]
    Clamp,
    /// Linear ramp over [level - window/2, level + window/2]
    #[default]
    Window,
}
