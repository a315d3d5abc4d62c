//! Application session: owns every volume, the annotation store, the scene
//! and the selection, and turns user intents into synchronous state changes.
//!
//! Each store mutation is followed by a proxy rebuild before the call
//! returns, so a caller never observes the scene and the store out of step.

use crate::annotation::{AnnotationError, AnnotationStore, Rgb, parse_labels};
use crate::compositor::{OverlayLayer, SliceCompositor, SliceRequest, T1_COLOR, T2_COLOR};
use crate::config::ViewConfig;
use crate::enums::{GrayscaleMapping, Orientation, OverlaySlot, SceneLayer};
use crate::projector::{AnnotationProjector, Marker};
use crate::scene::{SceneBackend, SceneState, SceneSynchronizer, SceneVolumes};
use crate::selection::{AnnotationForm, SelectionController, SelectionError};
use crate::volume::VolumeBuffer;
use crate::volume_loader::{VolumeDecoder, VolumeLoader, VolumeLoaderError};

use image::RgbaImage;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No base volume loaded")]
    NoVolume,

    #[error("Scene cannot be initialized, missing: {}", .missing.join(", "))]
    SceneNotReady { missing: Vec<&'static str> },

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error(transparent)]
    Loader(#[from] VolumeLoaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Files picked by the user; any subset may be absent.
#[derive(Clone, Debug, Default)]
pub struct InputPaths {
    pub base: Option<PathBuf>,
    pub t1: Option<PathBuf>,
    pub t2: Option<PathBuf>,
    pub labels: Option<PathBuf>,
}

/// Outcome of each file load, one slot per input.
#[derive(Debug, Default)]
pub struct LoadedInputs {
    pub base: Option<Result<VolumeBuffer, VolumeLoaderError>>,
    pub t1: Option<Result<VolumeBuffer, VolumeLoaderError>>,
    pub t2: Option<Result<VolumeBuffer, VolumeLoaderError>>,
    pub labels: Option<Result<String, std::io::Error>>,
}

impl InputPaths {
    /// Read every configured file concurrently. Loads complete independently;
    /// one failing leaves the others untouched.
    pub async fn load(&self, decoder: &impl VolumeDecoder) -> LoadedInputs {
        let (base, t1, t2, labels) = futures::join!(
            load_optional(self.base.as_deref(), decoder),
            load_optional(self.t1.as_deref(), decoder),
            load_optional(self.t2.as_deref(), decoder),
            read_optional(self.labels.as_deref()),
        );
        LoadedInputs {
            base,
            t1,
            t2,
            labels,
        }
    }
}

async fn load_optional(
    path: Option<&Path>,
    decoder: &impl VolumeDecoder,
) -> Option<Result<VolumeBuffer, VolumeLoaderError>> {
    match path {
        Some(path) => Some(VolumeLoader::load_from_path(path, decoder).await),
        None => None,
    }
}

async fn read_optional(path: Option<&Path>) -> Option<Result<String, std::io::Error>> {
    match path {
        Some(path) => Some(tokio::fs::read_to_string(path).await),
        None => None,
    }
}

pub struct Session<B> {
    config: ViewConfig,
    base: Option<VolumeBuffer>,
    t1: Option<VolumeBuffer>,
    t2: Option<VolumeBuffer>,
    labels_loaded: bool,
    store: AnnotationStore,
    scene: SceneState<B>,
    synchronizer: SceneSynchronizer,
    selection: SelectionController,
    compositor: SliceCompositor,
    rng: StdRng,
}

impl<B: SceneBackend> Session<B> {
    pub fn new(backend: B, config: ViewConfig) -> Self {
        Self::with_rng(backend, config, StdRng::from_entropy())
    }

    /// Session with deterministic annotation colors.
    pub fn with_seed(backend: B, config: ViewConfig, seed: u64) -> Self {
        Self::with_rng(backend, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(backend: B, config: ViewConfig, rng: StdRng) -> Self {
        Self {
            config,
            base: None,
            t1: None,
            t2: None,
            labels_loaded: false,
            store: AnnotationStore::new(),
            scene: SceneState::new(backend),
            synchronizer: SceneSynchronizer::selectable(),
            selection: SelectionController::new(),
            compositor: SliceCompositor::default(),
            rng,
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn scene(&self) -> &SceneState<B> {
        &self.scene
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    pub fn form_mut(&mut self) -> &mut AnnotationForm {
        self.selection.form_mut()
    }

    pub fn volume(&self, layer: SceneLayer) -> Option<&VolumeBuffer> {
        match layer {
            SceneLayer::Base => self.base.as_ref(),
            SceneLayer::Overlay(OverlaySlot::T1) => self.t1.as_ref(),
            SceneLayer::Overlay(OverlaySlot::T2) => self.t2.as_ref(),
        }
    }

    /// Install a decoded volume into its slot, replacing any previous one.
    ///
    /// A new base volume re-derives level/window and centers the slices.
    pub fn install_volume(&mut self, layer: SceneLayer, volume: VolumeBuffer) {
        log::info!("Installing {:?} volume {:?}", layer, volume.dims());
        match layer {
            SceneLayer::Base => {
                self.config.fit_to_volume(&volume);
                self.base = Some(volume);
            }
            SceneLayer::Overlay(slot) => {
                if let Some(base) = self.base.as_ref().filter(|b| b.dims() != volume.dims()) {
                    log::warn!(
                        "{:?} mask {:?} does not match base {:?}; it will not be composited",
                        slot,
                        volume.dims(),
                        base.dims()
                    );
                }
                match slot {
                    OverlaySlot::T1 => self.t1 = Some(volume),
                    OverlaySlot::T2 => self.t2 = Some(volume),
                }
            }
        }
        if self.scene.is_initialized() {
            self.refresh_layers();
            if layer == SceneLayer::Base {
                self.refresh_planes();
            }
        }
    }

    /// Replace the annotation list from an import file. Nothing changes on error.
    pub fn install_labels(&mut self, text: &str) -> Result<usize, SessionError> {
        let fields = parse_labels(text, &mut self.rng)?;
        let count = fields.len();
        self.selection.deselect(&mut self.scene);
        self.store.replace_all(fields);
        self.labels_loaded = true;
        self.selection
            .resync(&self.store, &mut self.scene, &self.synchronizer);
        log::info!("Installed {} annotations", count);
        Ok(count)
    }

    /// Install every successful load and report the failures as messages.
    pub fn install_loaded(&mut self, loaded: LoadedInputs) -> Vec<String> {
        let mut failures = Vec::new();
        let volumes = [
            (SceneLayer::Base, loaded.base),
            (SceneLayer::Overlay(OverlaySlot::T1), loaded.t1),
            (SceneLayer::Overlay(OverlaySlot::T2), loaded.t2),
        ];
        for (layer, result) in volumes {
            match result {
                Some(Ok(volume)) => self.install_volume(layer, volume),
                Some(Err(err)) => {
                    log::error!("Failed to load {:?} volume: {}", layer, err);
                    failures.push(format!("{layer:?} volume: {err}"));
                }
                None => {}
            }
        }
        let labels = match loaded.labels {
            Some(Ok(text)) => self.install_labels(&text).map(|_| ()),
            Some(Err(err)) => Err(err.into()),
            None => Ok(()),
        };
        if let Err(err) = labels {
            log::error!("Failed to load annotations: {}", err);
            failures.push(format!("Annotations: {err}"));
        }
        failures
    }

    /// Inputs still needed before the scene may be built.
    pub fn missing_requirements(&self) -> Vec<&'static str> {
        let required = self.config.requirements;
        let mut missing = Vec::new();
        if self.base.is_none() {
            missing.push("base volume");
        }
        if required.t1_overlay && self.t1.is_none() {
            missing.push("T1 overlay");
        }
        if required.t2_overlay && self.t2.is_none() {
            missing.push("T2 overlay");
        }
        if required.annotations && !self.labels_loaded {
            missing.push("annotations");
        }
        missing
    }

    pub fn can_initialize_scene(&self) -> bool {
        self.missing_requirements().is_empty()
    }

    /// Build the 3D scene. Fails without side effects while inputs are missing.
    pub fn initialize_scene(&mut self) -> Result<(), SessionError> {
        let missing = self.missing_requirements();
        if !missing.is_empty() {
            return Err(SessionError::SceneNotReady { missing });
        }
        let base = self.base.as_ref().ok_or(SessionError::NoVolume)?;
        let volumes = SceneVolumes {
            base,
            t1: self.t1.as_ref(),
            t2: self.t2.as_ref(),
        };
        let bounds = self.scene.initialize(&volumes, &self.config.scene_view());
        if let Some(bounds) = bounds {
            self.selection
                .set_default_position(bounds.center().map(f64::round));
        }
        self.selection
            .resync(&self.store, &mut self.scene, &self.synchronizer);
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.config.threshold = threshold;
        if self.scene.is_initialized() {
            self.refresh_layers();
        }
    }

    pub fn set_opacity(&mut self, layer: SceneLayer, opacity: f32) {
        self.config.set_opacity(layer, opacity);
        if self.scene.is_initialized() {
            let opacity = self.config.opacity(layer);
            let backend = self.scene.backend_mut();
            backend.set_isosurface_opacity(layer, opacity);
            backend.render();
        }
    }

    pub fn set_slice(
        &mut self,
        orientation: Orientation,
        slice: usize,
    ) -> Result<(), SessionError> {
        let dims = self.base.as_ref().ok_or(SessionError::NoVolume)?.dims();
        self.config.set_slice(orientation, slice, dims);
        if self.scene.is_initialized() {
            self.scene.show_plane(orientation, &self.config.scene_view());
            self.scene.backend_mut().render();
        }
        Ok(())
    }

    pub fn set_color_level_window(&mut self, level: f64, window: f64) {
        self.config.color_level = level;
        self.config.color_window = window;
        self.refresh_planes();
    }

    pub fn set_multi_view(&mut self, multi_view: bool) {
        self.config.multi_view = multi_view;
        self.refresh_planes();
    }

    pub fn set_grayscale_mapping(&mut self, mapping: GrayscaleMapping) {
        self.config.grayscale = mapping;
    }

    /// Markers for the plane's current slice, in raster coordinates.
    pub fn markers(&self, orientation: Orientation) -> Result<Vec<Marker>, SessionError> {
        let base = self.base.as_ref().ok_or(SessionError::NoVolume)?;
        let (_, height) = base.dims().plane_size(orientation);
        Ok(AnnotationProjector::project(
            self.store.as_slice(),
            &self.slice_request(orientation),
            height,
        ))
    }

    /// One full 2D frame: composited slice with annotation markers on top.
    pub fn render_plane(&self, orientation: Orientation) -> Result<RgbaImage, SessionError> {
        let base = self.base.as_ref().ok_or(SessionError::NoVolume)?;
        let overlays: Vec<OverlayLayer<'_>> = [
            (self.t1.as_ref(), T1_COLOR, self.config.t1_opacity),
            (self.t2.as_ref(), T2_COLOR, self.config.t2_opacity),
        ]
        .into_iter()
        .filter_map(|(volume, color, opacity)| {
            volume.map(|volume| OverlayLayer {
                volume,
                color,
                opacity,
            })
        })
        .collect();

        let request = self.slice_request(orientation);
        let mut raster = self.compositor.compose(base, &overlays, &request);
        AnnotationProjector::paint(&mut raster, &self.markers(orientation)?);
        Ok(raster)
    }

    pub fn select_annotation(&mut self, index: usize) -> Result<(), SessionError> {
        let result = self
            .selection
            .select_by_list(index, &self.store, &mut self.scene);
        checked(result)
    }

    /// Resolve a screen position in the 3D view and select what is under it.
    pub fn pick(&mut self, x: f64, y: f64) -> Result<Option<usize>, SessionError> {
        let Some(handle) = self
            .synchronizer
            .pick(&self.scene, x, y)
            .map(|proxy| proxy.handle)
        else {
            return Ok(None);
        };
        let index = self.selection.select_by_pick(handle, &mut self.scene)?;
        Ok(Some(index))
    }

    pub fn deselect(&mut self) {
        self.selection.deselect(&mut self.scene);
    }

    /// Add a record from the form with a random color and select it.
    pub fn add_annotation(&mut self) -> Result<usize, SessionError> {
        let color = Rgb::random(&mut self.rng);
        self.add_annotation_with_color(color)
    }

    pub fn add_annotation_with_color(&mut self, color: Rgb) -> Result<usize, SessionError> {
        let index = self
            .selection
            .add(color, &mut self.store, &mut self.scene, &self.synchronizer);
        self.select_annotation(index)?;
        Ok(index)
    }

    pub fn update_annotation(&mut self) -> Result<usize, SessionError> {
        let result = self
            .selection
            .update(&mut self.store, &mut self.scene, &self.synchronizer);
        checked(result)
    }

    pub fn delete_annotation(&mut self) -> Result<usize, SessionError> {
        let result = self
            .selection
            .delete(&mut self.store, &mut self.scene, &self.synchronizer);
        checked(result)
    }

    pub fn export_labels(&self) -> Result<String, SessionError> {
        Ok(self.store.to_json().map_err(AnnotationError::from)?)
    }

    pub async fn save_labels(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let json = self.export_labels()?;
        tokio::fs::write(path.as_ref(), json).await?;
        log::info!(
            "Saved {} annotations to {}",
            self.store.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    fn slice_request(&self, orientation: Orientation) -> SliceRequest {
        SliceRequest {
            orientation,
            slice: self.config.slice(orientation),
            flip_vertical: orientation.default_flip(),
            grayscale: self.config.grayscale(),
        }
    }

    fn refresh_layers(&mut self) {
        let Some(base) = self.base.as_ref() else {
            return;
        };
        let volumes = SceneVolumes {
            base,
            t1: self.t1.as_ref(),
            t2: self.t2.as_ref(),
        };
        self.scene.show_layers(&volumes, &self.config.scene_view());
        self.scene.backend_mut().render();
    }

    fn refresh_planes(&mut self) {
        if !self.scene.is_initialized() {
            return;
        }
        let view = self.config.scene_view();
        for orientation in Orientation::ALL {
            self.scene.show_plane(orientation, &view);
        }
        self.scene.backend_mut().render();
    }
}

/// Stale indices are a caller bug; trip in debug builds, report otherwise.
fn checked<T>(result: Result<T, SelectionError>) -> Result<T, SessionError> {
    debug_assert!(
        !matches!(
            &result,
            Err(SelectionError::Annotation(AnnotationError::OutOfRange { .. }))
        ),
        "stale annotation index: {:?}",
        result.as_ref().err()
    );
    Ok(result?)
}
