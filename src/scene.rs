//! 3D scene state and annotation proxy reconciliation.
//!
//! Drawing is delegated to a [`SceneBackend`]. The crate owns the scene
//! bookkeeping in [`SceneState`]: which proxy object stands for which
//! annotation, and whether the isosurface layers have been set up.
//! [`SceneSynchronizer`] rebuilds the proxies from the annotation store after
//! every mutation so no proxy outlives or misnumbers its record.

use crate::annotation::{Annotation, AnnotationStore, Rgb};
use crate::enums::{Orientation, OverlaySlot, SceneLayer};
use crate::volume::VolumeBuffer;

use std::collections::BTreeMap;

/// Contour value used for binary overlay masks.
pub const MASK_CONTOUR: f64 = 1.0;
pub const BASE_SURFACE_COLOR: Rgb = Rgb::new(1.0, 1.0, 1.0);
pub const T1_SURFACE_COLOR: Rgb = Rgb::new(1.0, 1.0, 0.0);
pub const T2_SURFACE_COLOR: Rgb = Rgb::new(0.0, 1.0, 0.0);

/// Opaque reference to a proxy object inside the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyHandle(pub u64);

/// Axis-aligned extent in voxel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    pub fn center(&self) -> [f64; 3] {
        [0usize, 1, 2].map(|axis| (self.min[axis] + self.max[axis]) / 2.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SphereSpec {
    pub center: [f64; 3],
    pub radius: f64,
    pub color: Rgb,
    pub pickable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IsosurfaceStyle {
    pub contour: f64,
    pub color: Rgb,
    pub opacity: f32,
}

/// A grayscale plane drawn inside the 3D view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneSlice {
    pub slice: usize,
    pub level: f64,
    pub window: f64,
}

/// Rendering collaborator: mesh extraction, drawing and hit testing.
///
/// Isosurfaces and plane slices are never pickable; spheres are pickable
/// only when created with `pickable` set.
pub trait SceneBackend {
    fn add_sphere(&mut self, sphere: &SphereSpec) -> ProxyHandle;
    fn remove_sphere(&mut self, handle: ProxyHandle);
    fn set_sphere_color(&mut self, handle: ProxyHandle, color: Rgb);

    /// Extract and show the surface of `volume` at `style.contour`, replacing
    /// any surface previously shown for `layer`.
    fn set_isosurface(
        &mut self,
        layer: SceneLayer,
        volume: &VolumeBuffer,
        style: IsosurfaceStyle,
    );
    fn set_isosurface_opacity(&mut self, layer: SceneLayer, opacity: f32);
    fn isosurface_bounds(&self, layer: SceneLayer) -> Option<Bounds>;

    /// Show (`Some`) or hide (`None`) the plane for `orientation`.
    fn set_plane_slice(&mut self, orientation: Orientation, plane: Option<PlaneSlice>);

    /// Topmost pickable sphere under a screen position.
    fn pick(&self, x: f64, y: f64) -> Option<ProxyHandle>;
    fn render(&mut self);
}

/// One scene object standing for one annotation.
///
/// The payload is a snapshot of the record at creation time, so a pick is
/// self-describing without consulting the store.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneProxy {
    pub handle: ProxyHandle,
    pub payload: Annotation,
}

/// Scene bookkeeping owned by the session.
pub struct SceneState<B> {
    backend: B,
    proxies: Vec<SceneProxy>,
    initialized: bool,
}

impl<B: SceneBackend> SceneState<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            proxies: Vec::new(),
            initialized: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Proxies in store order.
    pub fn proxies(&self) -> &[SceneProxy] {
        &self.proxies
    }

    pub fn proxy(&self, handle: ProxyHandle) -> Option<&SceneProxy> {
        self.proxies.iter().find(|p| p.handle == handle)
    }

    pub fn proxy_at(&self, index: usize) -> Option<&SceneProxy> {
        self.proxies.get(index)
    }

    pub fn set_proxy_color(&mut self, handle: ProxyHandle, color: Rgb) {
        self.backend.set_sphere_color(handle, color);
    }

    /// Set up the isosurface layers and plane slices for a freshly loaded scan.
    ///
    /// Returns the extent of the base surface, if any voxel reaches the threshold.
    pub fn initialize(
        &mut self,
        volumes: &SceneVolumes<'_>,
        view: &SceneView,
    ) -> Option<Bounds> {
        self.show_layers(volumes, view);
        for orientation in Orientation::ALL {
            self.show_plane(orientation, view);
        }
        self.initialized = true;
        self.backend.render();
        log::info!(
            "Scene initialized ({} overlay surfaces)",
            [volumes.t1, volumes.t2].iter().flatten().count()
        );
        self.backend.isosurface_bounds(SceneLayer::Base)
    }

    pub fn show_layers(&mut self, volumes: &SceneVolumes<'_>, view: &SceneView) {
        self.backend.set_isosurface(
            SceneLayer::Base,
            volumes.base,
            IsosurfaceStyle {
                contour: view.threshold,
                color: BASE_SURFACE_COLOR,
                opacity: view.base_opacity,
            },
        );
        let overlays = [
            (OverlaySlot::T1, volumes.t1, T1_SURFACE_COLOR, view.t1_opacity),
            (OverlaySlot::T2, volumes.t2, T2_SURFACE_COLOR, view.t2_opacity),
        ];
        for (slot, volume, color, opacity) in overlays {
            if let Some(volume) = volume {
                self.backend.set_isosurface(
                    SceneLayer::Overlay(slot),
                    volume,
                    IsosurfaceStyle {
                        contour: MASK_CONTOUR,
                        color,
                        opacity,
                    },
                );
            }
        }
    }

    pub fn show_plane(&mut self, orientation: Orientation, view: &SceneView) {
        let plane = view.multi_view.then(|| PlaneSlice {
            slice: view.slices[orientation.normal_axis()],
            level: view.color_level,
            window: view.color_window,
        });
        self.backend.set_plane_slice(orientation, plane);
    }
}

/// Volumes shown as isosurfaces.
#[derive(Clone, Copy, Debug)]
pub struct SceneVolumes<'a> {
    pub base: &'a VolumeBuffer,
    pub t1: Option<&'a VolumeBuffer>,
    pub t2: Option<&'a VolumeBuffer>,
}

/// Presentation values the scene needs from the view configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneView {
    pub threshold: f64,
    pub base_opacity: f32,
    pub t1_opacity: f32,
    pub t2_opacity: f32,
    pub color_level: f64,
    pub color_window: f64,
    /// Slice offsets indexed by normal axis (x, y, z)
    pub slices: [usize; 3],
    pub multi_view: bool,
}

/// Keeps the scene's annotation proxies in lock-step with the store.
#[derive(Clone, Copy, Debug, Default)]
pub struct SceneSynchronizer {
    /// Whether new proxies respond to picks
    pub selectable: bool,
}

impl SceneSynchronizer {
    pub fn selectable() -> Self {
        Self { selectable: true }
    }

    /// Destroy every proxy and recreate one per record, in store order.
    pub fn sync<B: SceneBackend>(&self, scene: &mut SceneState<B>, store: &AnnotationStore) {
        for proxy in scene.proxies.drain(..) {
            scene.backend.remove_sphere(proxy.handle);
        }
        for annotation in store.iter() {
            let handle = scene.backend.add_sphere(&SphereSpec {
                center: annotation.position,
                radius: annotation.size,
                color: annotation.color,
                pickable: self.selectable,
            });
            scene.proxies.push(SceneProxy {
                handle,
                payload: annotation.clone(),
            });
        }
        scene.backend.render();
        log::debug!("Synchronized {} annotation proxies", scene.proxies.len());
    }

    /// Resolve a screen position to the proxy under it.
    pub fn pick<'s, B: SceneBackend>(
        &self,
        scene: &'s SceneState<B>,
        x: f64,
        y: f64,
    ) -> Option<&'s SceneProxy> {
        let handle = scene.backend.pick(x, y)?;
        scene.proxy(handle)
    }
}

/// Extent of the voxels at or above `contour`.
pub fn threshold_bounds(volume: &VolumeBuffer, contour: f64) -> Option<Bounds> {
    let dims = volume.dims();
    let mut bounds: Option<Bounds> = None;
    for z in 0..dims.nz {
        for y in 0..dims.ny {
            for x in 0..dims.nx {
                if volume.get(x, y, z) < contour {
                    continue;
                }
                let p = [x as f64, y as f64, z as f64];
                let b = bounds.get_or_insert(Bounds { min: p, max: p });
                for axis in 0..3 {
                    b.min[axis] = b.min[axis].min(p[axis]);
                    b.max[axis] = b.max[axis].max(p[axis]);
                }
            }
        }
    }
    bounds
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessSphere {
    pub spec: SphereSpec,
    pub color: Rgb,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessSurface {
    pub style: IsosurfaceStyle,
    pub bounds: Option<Bounds>,
}

/// In-memory backend that records scene contents instead of drawing them.
///
/// Picking looks down the z axis: screen (x, y) maps to voxel (x, y) and the
/// sphere with the largest z under the point wins.
#[derive(Debug, Default)]
pub struct HeadlessScene {
    next_handle: u64,
    pub spheres: BTreeMap<ProxyHandle, HeadlessSphere>,
    pub surfaces: BTreeMap<SceneLayer, HeadlessSurface>,
    pub planes: BTreeMap<Orientation, Option<PlaneSlice>>,
    pub frames: usize,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn surface(&self, layer: SceneLayer) -> Option<&HeadlessSurface> {
        self.surfaces.get(&layer)
    }

    pub fn plane(&self, orientation: Orientation) -> Option<&PlaneSlice> {
        self.planes.get(&orientation).and_then(Option::as_ref)
    }

    /// Spheres currently drawn in the highlight color.
    pub fn highlighted(&self) -> Vec<ProxyHandle> {
        self.spheres
            .iter()
            .filter(|(_, s)| s.color == Rgb::HIGHLIGHT)
            .map(|(h, _)| *h)
            .collect()
    }
}

impl SceneBackend for HeadlessScene {
    fn add_sphere(&mut self, sphere: &SphereSpec) -> ProxyHandle {
        let handle = ProxyHandle(self.next_handle);
        self.next_handle += 1;
        self.spheres.insert(
            handle,
            HeadlessSphere {
                spec: sphere.clone(),
                color: sphere.color,
            },
        );
        handle
    }

    fn remove_sphere(&mut self, handle: ProxyHandle) {
        self.spheres.remove(&handle);
    }

    fn set_sphere_color(&mut self, handle: ProxyHandle, color: Rgb) {
        if let Some(sphere) = self.spheres.get_mut(&handle) {
            sphere.color = color;
        }
    }

    fn set_isosurface(
        &mut self,
        layer: SceneLayer,
        volume: &VolumeBuffer,
        style: IsosurfaceStyle,
    ) {
        let bounds = threshold_bounds(volume, style.contour);
        self.surfaces.insert(layer, HeadlessSurface { style, bounds });
    }

    fn set_isosurface_opacity(&mut self, layer: SceneLayer, opacity: f32) {
        if let Some(surface) = self.surfaces.get_mut(&layer) {
            surface.style.opacity = opacity;
        }
    }

    fn isosurface_bounds(&self, layer: SceneLayer) -> Option<Bounds> {
        self.surface(layer).and_then(|s| s.bounds)
    }

    fn set_plane_slice(&mut self, orientation: Orientation, plane: Option<PlaneSlice>) {
        self.planes.insert(orientation, plane);
    }

    fn pick(&self, x: f64, y: f64) -> Option<ProxyHandle> {
        self.spheres
            .iter()
            .filter(|(_, s)| s.spec.pickable)
            .filter(|(_, s)| {
                let dx = s.spec.center[0] - x;
                let dy = s.spec.center[1] - y;
                (dx * dx + dy * dy).sqrt() <= s.spec.radius
            })
            .max_by(|a, b| a.1.spec.center[2].total_cmp(&b.1.spec.center[2]))
            .map(|(h, _)| *h)
    }

    fn render(&mut self) {
        self.frames += 1;
    }
}
