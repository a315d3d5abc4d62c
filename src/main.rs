use std::path::PathBuf;

use ndarray::Array3;
use volume_annotator::{
    HeadlessScene, Orientation, Session, ViewConfig, VolumeBuffer,
    annotation::LabelRecord,
    config::SceneRequirements,
    enums::{OverlaySlot, SceneLayer},
};

/// Synthetic head phantom: a bright ellipsoid with a small lesion mask inside.
fn phantom() -> (VolumeBuffer, VolumeBuffer) {
    let (nz, ny, nx) = (48, 96, 96);
    let inside = |x: usize, y: usize, z: usize, r: f64, c: (f64, f64, f64)| {
        let dx = (x as f64 - c.0) / r;
        let dy = (y as f64 - c.1) / r;
        let dz = (z as f64 - c.2) / (r / 2.0);
        dx * dx + dy * dy + dz * dz <= 1.0
    };
    let head = Array3::from_shape_fn((nz, ny, nx), |(z, y, x)| {
        if inside(x, y, z, 40.0, (48.0, 48.0, 24.0)) {
            100.0 + (x + y) as f64
        } else {
            0.0
        }
    });
    let lesion = Array3::from_shape_fn((nz, ny, nx), |(z, y, x)| {
        f64::from(inside(x, y, z, 8.0, (60.0, 40.0, 24.0)) as u8)
    });
    (
        VolumeBuffer::from_array(head).expect("phantom dims are non-zero"),
        VolumeBuffer::from_array(lesion).expect("phantom dims are non-zero"),
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let config = ViewConfig {
        requirements: SceneRequirements::base_only(),
        ..ViewConfig::default()
    };
    let mut session = Session::new(HeadlessScene::new(), config);
    let (head, lesion) = phantom();
    let lesion_label = LabelRecord::from_mask(&lesion, "lesion");
    session.install_volume(SceneLayer::Base, head);
    session.install_volume(SceneLayer::Overlay(OverlaySlot::T1), lesion);

    if let Some(path) = std::env::args().nth(1).map(PathBuf::from) {
        let text = tokio::fs::read_to_string(&path)
            .await
            .expect("should have read the annotation file");
        let count = session
            .install_labels(&text)
            .expect("should have parsed the annotation file");
        log::info!("Loaded {} annotations from {}", count, path.display());
    } else if let Some(label) = lesion_label {
        let form = session.form_mut();
        form.position = [label.x, label.y, label.z];
        form.tag = label.name.unwrap_or_default();
        form.info = label.info.unwrap_or_default();
        session
            .add_annotation()
            .expect("should have added the lesion label");
    }

    session
        .initialize_scene()
        .expect("should have initialized the scene");

    for orientation in Orientation::ALL {
        let image = session
            .render_plane(orientation)
            .expect("should have rendered the slice");
        let name = format!("{}.png", orientation.name());
        image.save(&name).expect("should have saved the image");
        log::info!("Wrote {}", name);
    }
}
