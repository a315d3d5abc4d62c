use volume_annotator::annotation::AnnotationFields;
use volume_annotator::compositor::{Grayscale, OverlayLayer, SliceRequest, T1_COLOR};
use volume_annotator::config::SceneRequirements;
use volume_annotator::enums::{OverlaySlot, SceneLayer};
use volume_annotator::selection::Selection;
use volume_annotator::volume::Dims;
use volume_annotator::{
    AnnotationProjector, AnnotationStore, HeadlessScene, Orientation, Rgb, SceneSynchronizer,
    Session, SliceCompositor, ViewConfig, VolumeBuffer,
};

fn fields(tag: &str, position: [f64; 3]) -> AnnotationFields {
    AnnotationFields {
        position,
        tag: tag.to_string(),
        info: String::new(),
        color: Rgb::new(0.0, 0.5, 1.0),
        size: 2.0,
    }
}

fn axial(slice: usize) -> SliceRequest {
    SliceRequest {
        orientation: Orientation::Axial,
        slice,
        flip_vertical: false,
        grayscale: Grayscale::clamp(),
    }
}

fn session_with_base(dims: Dims) -> Session<HeadlessScene> {
    let config = ViewConfig {
        requirements: SceneRequirements::base_only(),
        ..ViewConfig::default()
    };
    let mut session = Session::with_seed(HeadlessScene::new(), config, 42);
    let base = VolumeBuffer::from_scalars(dims, vec![100.0; dims.voxel_count()]).unwrap();
    session.install_volume(SceneLayer::Base, base);
    session
}

#[test]
fn added_annotation_projects_only_near_its_slice() {
    let mut store = AnnotationStore::new();
    store.add(fields("A", [1.0, 2.0, 3.0]));

    let on_slice = AnnotationProjector::project(store.as_slice(), &axial(3), 16);
    assert_eq!(on_slice.len(), 1);
    assert_eq!((on_slice[0].screen_x, on_slice[0].screen_y), (1.0, 2.0));

    let far = AnnotationProjector::project(store.as_slice(), &axial(10), 16);
    assert!(far.is_empty());
}

#[test]
fn delete_first_of_two_keeps_second_at_index_zero() {
    let mut store = AnnotationStore::new();
    store.add(fields("A", [1.0, 2.0, 3.0]));
    store.add(fields("B", [4.0, 5.0, 6.0]));
    let remaining = store.delete(0).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].index, 0);
    assert_eq!(remaining[0].tag, "B");
    assert_eq!(remaining[0].position, [4.0, 5.0, 6.0]);
}

#[test]
fn zero_base_with_full_mask_blends_halfway() {
    let dims = Dims::new(8, 6, 4);
    let base = VolumeBuffer::from_scalars(dims, vec![0.0; dims.voxel_count()]).unwrap();
    let mask = VolumeBuffer::from_scalars(dims, vec![1.0; dims.voxel_count()]).unwrap();
    let overlays = [OverlayLayer {
        volume: &mask,
        color: T1_COLOR,
        opacity: 0.5,
    }];
    for orientation in Orientation::ALL {
        let request = SliceRequest {
            orientation,
            slice: 1,
            flip_vertical: orientation.default_flip(),
            grayscale: Grayscale::clamp(),
        };
        let raster = SliceCompositor::default().compose(&base, &overlays, &request);
        assert!(raster.pixels().all(|p| p.0 == [128, 128, 0, 255]));
    }
}

#[test]
fn repeated_sync_keeps_one_proxy_per_record() {
    let mut session = session_with_base(Dims::new(8, 8, 8));
    for i in 0..3 {
        session.form_mut().position = [i as f64, 1.0, 1.0];
        session.add_annotation().unwrap();
    }
    let sync = SceneSynchronizer::selectable();
    let mut scene = volume_annotator::scene::SceneState::new(HeadlessScene::new());
    sync.sync(&mut scene, session.store());
    assert_eq!(scene.proxies().len(), 3);
    sync.sync(&mut scene, session.store());
    assert_eq!(scene.proxies().len(), 3);
    assert_eq!(scene.backend().spheres.len(), 3);
}

#[test]
fn deleting_selected_annotation_clears_highlight() {
    let mut session = session_with_base(Dims::new(16, 16, 16));
    session.initialize_scene().unwrap();
    for (i, tag) in ["A", "B", "C"].into_iter().enumerate() {
        session.form_mut().tag = tag.to_string();
        session.form_mut().position = [2.0 + 4.0 * i as f64, 8.0, 8.0];
        session.add_annotation().unwrap();
    }

    let picked = session.pick(6.0, 8.0).unwrap();
    assert_eq!(picked, Some(1));
    assert_eq!(session.selection().form().tag, "B");
    assert_eq!(session.scene().backend().highlighted().len(), 1);

    session.delete_annotation().unwrap();
    assert_eq!(session.selection().selection(), Selection::Unselected);
    assert!(session.scene().backend().highlighted().is_empty());

    let tags: Vec<_> = session.store().iter().map(|a| a.tag.clone()).collect();
    assert_eq!(tags, vec!["A", "C"]);
    let payloads: Vec<_> = session
        .scene()
        .proxies()
        .iter()
        .map(|p| p.payload.index)
        .collect();
    assert_eq!(payloads, vec![0, 1]);
}

#[test]
fn selection_moves_between_list_and_pick() {
    let mut session = session_with_base(Dims::new(16, 16, 16));
    session.initialize_scene().unwrap();
    for x in [2.0, 12.0] {
        session.form_mut().position = [x, 4.0, 4.0];
        session.add_annotation().unwrap();
    }

    session.select_annotation(0).unwrap();
    let first = session.scene().proxy_at(0).unwrap().handle;
    assert_eq!(session.scene().backend().highlighted(), vec![first]);

    assert_eq!(session.pick(12.0, 4.0).unwrap(), Some(1));
    let second = session.scene().proxy_at(1).unwrap().handle;
    assert_eq!(session.scene().backend().highlighted(), vec![second]);
    assert_eq!(
        session.selection().readout().map(|r| r.position.as_str()),
        Some("X:12,Y:4,Z:4")
    );

    assert_eq!(session.pick(100.0, 100.0).unwrap(), None);
    session.deselect();
    assert!(session.scene().backend().highlighted().is_empty());
}

#[test]
fn edited_annotation_shows_in_frame_and_scene() {
    let mut session = session_with_base(Dims::new(24, 24, 24));
    session.initialize_scene().unwrap();
    session.form_mut().position = [5.0, 5.0, 12.0];
    session
        .add_annotation_with_color(Rgb::new(0.0, 0.0, 1.0))
        .unwrap();
    session.select_annotation(0).unwrap();

    session.form_mut().position = [18.0, 6.0, 12.0];
    session.update_annotation().unwrap();

    let proxy = session.scene().proxy_at(0).unwrap();
    assert_eq!(proxy.payload.position, [18.0, 6.0, 12.0]);
    let markers = session.markers(Orientation::Axial).unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!((markers[0].screen_x, markers[0].screen_y), (18.0, 6.0));

    // Sagittal is flipped: z=12 on a 24-voxel axis lands on row 11.
    session.set_slice(Orientation::Sagittal, 18).unwrap();
    let sagittal = session.markers(Orientation::Sagittal).unwrap();
    assert_eq!((sagittal[0].screen_x, sagittal[0].screen_y), (6.0, 11.0));
}

#[test]
fn overlay_masks_render_in_their_colors() {
    let dims = Dims::new(4, 4, 4);
    let mut session = session_with_base(dims);
    session.set_grayscale_mapping(volume_annotator::enums::GrayscaleMapping::Clamp);
    let mut t2 = vec![0.0; dims.voxel_count()];
    t2[volume_annotator::volume::voxel_index(&dims, 1, 1, 2)] = 1.0;
    session.install_volume(
        SceneLayer::Overlay(OverlaySlot::T2),
        VolumeBuffer::from_scalars(dims, t2).unwrap(),
    );
    session.set_opacity(SceneLayer::Overlay(OverlaySlot::T2), 1.0);
    session.set_slice(Orientation::Axial, 2).unwrap();

    let frame = session.render_plane(Orientation::Axial).unwrap();
    assert_eq!(frame.get_pixel(1, 1).0, [0, 255, 0, 255]);
    assert_eq!(frame.get_pixel(3, 3).0, [100, 100, 100, 255]);
}

#[test]
fn zero_scan_on_default_view_renders_black_under_mask() {
    let dims = Dims::new(4, 4, 4);
    let mut session = Session::with_seed(HeadlessScene::new(), ViewConfig::default(), 3);
    session.install_volume(
        SceneLayer::Base,
        VolumeBuffer::from_scalars(dims, vec![0.0; dims.voxel_count()]).unwrap(),
    );

    let plain = session.render_plane(Orientation::Axial).unwrap();
    assert!(plain.pixels().all(|p| p.0 == [0, 0, 0, 255]));

    session.install_volume(
        SceneLayer::Overlay(OverlaySlot::T1),
        VolumeBuffer::from_scalars(dims, vec![1.0; dims.voxel_count()]).unwrap(),
    );
    for orientation in Orientation::ALL {
        let frame = session.render_plane(orientation).unwrap();
        assert!(frame.pixels().all(|p| p.0 == [128, 128, 0, 255]));
    }
}
