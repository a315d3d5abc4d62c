//! # Volume annotator library
//!
//! This crate serves a high-level API for inspecting a 3D scan together with
//! up to two overlay masks and a set of point annotations.
//!
//! A scan is held as a [`VolumeBuffer`], a flat scalar grid addressed
//! row-major with x varying fastest. The volume can be sliced in the three
//! different medical axes:
//!  - Axial (fixes z)
//!  - Coronal (fixes y)
//!  - Sagittal (fixes x)
//!
//! Each 2D frame is the grayscale base slice with the T1/T2 masks blended on
//! top and markers for every annotation within three voxels of the slice.
//! The 3D view is driven through the [`SceneBackend`] trait. Annotation
//! proxies in the scene are rebuilt from the [`AnnotationStore`] after every
//! change, and the [`SelectionController`] keeps at most one of them
//! highlighted.
//!
//! File decoding is delegated to a [`VolumeDecoder`]; loading reads files
//! asynchronously with tokio and decodes 32-bit or 64-bit float samples.
//! If the environment supports it slices are composed in parallel using
//! rayon.
//!
//! # Examples
//!
//! ## Composing an axial frame with an annotation
//!
//! ```no_run
//! # use volume_annotator::{HeadlessScene, Orientation, Session, ViewConfig, VolumeBuffer};
//! # use volume_annotator::enums::SceneLayer;
//! # use ndarray::Array3;
//! let scan = Array3::from_shape_fn((32, 64, 64), |(z, y, x)| ((x + y + z) % 256) as f64);
//! let mut session = Session::new(HeadlessScene::new(), ViewConfig::default());
//! session.install_volume(
//!     SceneLayer::Base,
//!     VolumeBuffer::from_array(scan).expect("should have built volume"),
//! );
//! session.form_mut().position = [20.0, 30.0, 16.0];
//! session
//!     .add_annotation()
//!     .expect("should have added the annotation");
//! let image = session
//!     .render_plane(Orientation::Axial)
//!     .expect("should have rendered the axial slice");
//! image.save("axial.png");
//! ```

pub mod annotation;
pub mod compositor;
pub mod config;
pub mod enums;
pub mod projector;
pub mod scene;
pub mod selection;
pub mod session;
pub mod volume;
pub mod volume_loader;

pub use annotation::{Annotation, AnnotationStore, Rgb};
pub use compositor::SliceCompositor;
pub use config::ViewConfig;
pub use enums::Orientation;
pub use projector::AnnotationProjector;
pub use scene::{HeadlessScene, SceneBackend, SceneSynchronizer};
pub use selection::SelectionController;
pub use session::Session;
pub use volume::VolumeBuffer;
pub use volume_loader::{VolumeDecoder, VolumeLoader};
