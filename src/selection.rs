//! Single source of truth for the highlighted annotation.
//!
//! List clicks and 3D picks both land here. The controller restores the
//! previous proxy's color before highlighting a new one, drives the edit
//! form, and triggers proxy resynchronization after store mutations, so at
//! most one proxy ever carries [`Rgb::HIGHLIGHT`].

use crate::annotation::{AnnotationError, AnnotationFields, AnnotationStore, DEFAULT_SIZE, Rgb};
use crate::scene::{ProxyHandle, SceneBackend, SceneState, SceneSynchronizer};

use thiserror::Error;

pub const DEFAULT_TAG: &str = "Label";

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("No annotation is selected")]
    NoSelection,

    #[error("Proxy {0:?} does not belong to any annotation")]
    UnknownProxy(ProxyHandle),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),
}

/// Edit-form field values.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationForm {
    pub position: [f64; 3],
    pub tag: String,
    pub info: String,
    pub size: f64,
    pub color: Rgb,
}

impl Default for AnnotationForm {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            tag: DEFAULT_TAG.to_string(),
            info: String::new(),
            size: DEFAULT_SIZE,
            color: Rgb::new(1.0, 1.0, 1.0),
        }
    }
}

impl AnnotationForm {
    pub fn to_fields(&self) -> AnnotationFields {
        AnnotationFields {
            position: self.position,
            tag: self.tag.clone(),
            info: self.info.clone(),
            color: self.color,
            size: self.size,
        }
    }

    fn fill_from(&mut self, fields: AnnotationFields) {
        self.position = fields.position;
        self.tag = fields.tag;
        self.info = fields.info;
        self.size = fields.size;
        self.color = fields.color;
    }
}

/// Text shown for the last picked proxy.
#[derive(Clone, Debug, PartialEq)]
pub struct PickReadout {
    pub position: String,
    pub tag: String,
    pub info: String,
}

impl PickReadout {
    fn new(fields: &AnnotationFields) -> Self {
        let [x, y, z] = fields.position.map(f64::round);
        Self {
            position: format!("X:{x},Y:{y},Z:{z}"),
            tag: fields.tag.clone(),
            info: fields.info.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    Unselected,
    Selected(usize),
}

/// Proxy currently drawn highlighted and the color to put back on it.
#[derive(Clone, Copy, Debug, PartialEq)]
struct HighlightSnapshot {
    handle: ProxyHandle,
    original: Rgb,
}

#[derive(Debug)]
pub struct SelectionController {
    selection: Selection,
    snapshot: Option<HighlightSnapshot>,
    form: AnnotationForm,
    default_position: [f64; 3],
    readout: Option<PickReadout>,
}

impl Default for SelectionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionController {
    pub fn new() -> Self {
        Self {
            selection: Selection::Unselected,
            snapshot: None,
            form: AnnotationForm::default(),
            default_position: [0.0; 3],
            readout: None,
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn selected_index(&self) -> Option<usize> {
        match self.selection {
            Selection::Selected(index) => Some(index),
            Selection::Unselected => None,
        }
    }

    pub fn highlighted_proxy(&self) -> Option<ProxyHandle> {
        self.snapshot.map(|s| s.handle)
    }

    pub fn form(&self) -> &AnnotationForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut AnnotationForm {
        &mut self.form
    }

    pub fn readout(&self) -> Option<&PickReadout> {
        self.readout.as_ref()
    }

    /// Position the form falls back to when cleared; also applied right away
    /// while nothing is selected.
    pub fn set_default_position(&mut self, position: [f64; 3]) {
        self.default_position = position;
        if self.selection == Selection::Unselected {
            self.form.position = position;
        }
    }

    /// Highlight the record at `index` after a click in the side list.
    pub fn select_by_list<B: SceneBackend>(
        &mut self,
        index: usize,
        store: &AnnotationStore,
        scene: &mut SceneState<B>,
    ) -> Result<(), SelectionError> {
        let record = store.get(index).ok_or(AnnotationError::OutOfRange {
            index,
            len: store.len(),
        })?;
        self.form.fill_from(record.fields());
        self.move_highlight(scene, index);
        self.selection = Selection::Selected(index);
        log::debug!("Selected annotation {} from list", index);
        Ok(())
    }

    /// Highlight the record behind a picked proxy, read from the proxy itself.
    pub fn select_by_pick<B: SceneBackend>(
        &mut self,
        handle: ProxyHandle,
        scene: &mut SceneState<B>,
    ) -> Result<usize, SelectionError> {
        let payload = scene
            .proxy(handle)
            .map(|p| p.payload.clone())
            .ok_or(SelectionError::UnknownProxy(handle))?;
        let fields = payload.fields();
        self.readout = Some(PickReadout::new(&fields));
        self.form.fill_from(fields);
        self.move_highlight(scene, payload.index);
        self.selection = Selection::Selected(payload.index);
        log::debug!("Selected annotation {} by pick", payload.index);
        Ok(payload.index)
    }

    /// Drop the highlight without touching the form.
    pub fn deselect<B: SceneBackend>(&mut self, scene: &mut SceneState<B>) {
        self.restore_highlight(scene);
        self.selection = Selection::Unselected;
    }

    /// Create a record from the form with the given color. Selection is unchanged.
    pub fn add<B: SceneBackend>(
        &mut self,
        color: Rgb,
        store: &mut AnnotationStore,
        scene: &mut SceneState<B>,
        synchronizer: &SceneSynchronizer,
    ) -> usize {
        let fields = AnnotationFields {
            color,
            ..self.form.to_fields()
        };
        let index = store.add(fields).len() - 1;
        self.resync(store, scene, synchronizer);
        index
    }

    /// Write the form back to the selected record.
    pub fn update<B: SceneBackend>(
        &mut self,
        store: &mut AnnotationStore,
        scene: &mut SceneState<B>,
        synchronizer: &SceneSynchronizer,
    ) -> Result<usize, SelectionError> {
        let index = self.selected_index().ok_or(SelectionError::NoSelection)?;
        store.update(index, self.form.to_fields())?;
        self.resync(store, scene, synchronizer);
        Ok(index)
    }

    /// Remove the selected record, reset the form and return to unselected.
    pub fn delete<B: SceneBackend>(
        &mut self,
        store: &mut AnnotationStore,
        scene: &mut SceneState<B>,
        synchronizer: &SceneSynchronizer,
    ) -> Result<usize, SelectionError> {
        let index = self.selected_index().ok_or(SelectionError::NoSelection)?;
        store.delete(index)?;
        self.restore_highlight(scene);
        self.selection = Selection::Unselected;
        self.readout = None;
        self.form = AnnotationForm {
            position: self.default_position,
            ..AnnotationForm::default()
        };
        self.resync(store, scene, synchronizer);
        Ok(index)
    }

    /// Rebuild proxies and re-apply the highlight to the selection's new proxy.
    pub fn resync<B: SceneBackend>(
        &mut self,
        store: &AnnotationStore,
        scene: &mut SceneState<B>,
        synchronizer: &SceneSynchronizer,
    ) {
        synchronizer.sync(scene, store);
        // The old highlighted proxy no longer exists.
        self.snapshot = None;
        if let Selection::Selected(index) = self.selection {
            if index < store.len() {
                self.move_highlight(scene, index);
            } else {
                self.selection = Selection::Unselected;
            }
        }
    }

    fn move_highlight<B: SceneBackend>(&mut self, scene: &mut SceneState<B>, index: usize) {
        let target = scene.proxy_at(index).map(|p| HighlightSnapshot {
            handle: p.handle,
            original: p.payload.color,
        });
        if self.snapshot.map(|s| s.handle) != target.map(|t| t.handle) {
            self.restore_highlight(scene);
        }
        if let Some(target) = target {
            scene.set_proxy_color(target.handle, Rgb::HIGHLIGHT);
            scene.backend_mut().render();
        }
        self.snapshot = target;
    }

    fn restore_highlight<B: SceneBackend>(&mut self, scene: &mut SceneState<B>) {
        if let Some(previous) = self.snapshot.take() {
            scene.set_proxy_color(previous.handle, previous.original);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::HeadlessScene;

    struct Fixture {
        store: AnnotationStore,
        scene: SceneState<HeadlessScene>,
        sync: SceneSynchronizer,
        controller: SelectionController,
    }

    impl Fixture {
        fn with_points(points: &[[f64; 3]]) -> Self {
            let mut fixture = Fixture {
                store: AnnotationStore::new(),
                scene: SceneState::new(HeadlessScene::new()),
                sync: SceneSynchronizer::selectable(),
                controller: SelectionController::new(),
            };
            for (i, &position) in points.iter().enumerate() {
                let form = fixture.controller.form_mut();
                form.position = position;
                form.tag = format!("P{i}");
                form.info = format!("info {i}");
                fixture.controller.add(
                    Rgb::new(0.0, 0.0, 1.0),
                    &mut fixture.store,
                    &mut fixture.scene,
                    &fixture.sync,
                );
            }
            fixture
        }

        fn highlighted(&self) -> Vec<ProxyHandle> {
            self.scene.backend().highlighted()
        }
    }

    #[test]
    fn list_selection_highlights_and_fills_form() {
        let mut f = Fixture::with_points(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        f.controller
            .select_by_list(1, &f.store, &mut f.scene)
            .unwrap();
        assert_eq!(f.controller.selection(), Selection::Selected(1));
        assert_eq!(f.controller.form().tag, "P1");
        assert_eq!(f.controller.form().position, [4.0, 5.0, 6.0]);
        assert_eq!(f.highlighted(), vec![f.scene.proxy_at(1).unwrap().handle]);
    }

    #[test]
    fn changing_selection_restores_previous_color() {
        let mut f = Fixture::with_points(&[[1.0, 2.0, 3.0], [20.0, 20.0, 6.0]]);
        f.controller
            .select_by_list(0, &f.store, &mut f.scene)
            .unwrap();
        let handle = f.scene.proxy_at(1).unwrap().handle;
        f.controller.select_by_pick(handle, &mut f.scene).unwrap();

        assert_eq!(f.highlighted(), vec![handle]);
        let first = f.scene.proxy_at(0).unwrap().handle;
        assert_eq!(
            f.scene.backend().spheres[&first].color,
            Rgb::new(0.0, 0.0, 1.0)
        );
    }

    #[test]
    fn reselecting_same_record_keeps_single_highlight() {
        let mut f = Fixture::with_points(&[[1.0, 2.0, 3.0]]);
        f.controller
            .select_by_list(0, &f.store, &mut f.scene)
            .unwrap();
        f.controller
            .select_by_list(0, &f.store, &mut f.scene)
            .unwrap();
        assert_eq!(f.highlighted().len(), 1);
    }

    #[test]
    fn pick_fills_readout_from_proxy() {
        let mut f = Fixture::with_points(&[[1.4, 2.6, 3.0]]);
        let handle = f.scene.proxy_at(0).unwrap().handle;
        let index = f.controller.select_by_pick(handle, &mut f.scene).unwrap();
        assert_eq!(index, 0);
        let readout = f.controller.readout().unwrap();
        assert_eq!(readout.position, "X:1,Y:3,Z:3");
        assert_eq!(readout.tag, "P0");
        assert_eq!(readout.info, "info 0");
    }

    #[test]
    fn unknown_proxy_is_rejected() {
        let mut f = Fixture::with_points(&[[1.0, 2.0, 3.0]]);
        assert!(matches!(
            f.controller.select_by_pick(ProxyHandle(999), &mut f.scene),
            Err(SelectionError::UnknownProxy(ProxyHandle(999)))
        ));
    }

    #[test]
    fn delete_of_selected_clears_selection_and_highlight() {
        let mut f = Fixture::with_points(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        f.controller.set_default_position([9.0, 9.0, 9.0]);
        f.controller
            .select_by_list(0, &f.store, &mut f.scene)
            .unwrap();
        f.controller
            .delete(&mut f.store, &mut f.scene, &f.sync)
            .unwrap();

        assert_eq!(f.controller.selection(), Selection::Unselected);
        assert!(f.highlighted().is_empty());
        assert_eq!(f.store.len(), 1);
        assert_eq!(f.scene.proxies().len(), 1);
        assert_eq!(f.controller.form().tag, DEFAULT_TAG);
        assert_eq!(f.controller.form().info, "");
        assert_eq!(f.controller.form().position, [9.0, 9.0, 9.0]);
    }

    #[test]
    fn update_and_delete_require_selection() {
        let mut f = Fixture::with_points(&[[1.0, 2.0, 3.0]]);
        assert!(matches!(
            f.controller.update(&mut f.store, &mut f.scene, &f.sync),
            Err(SelectionError::NoSelection)
        ));
        assert!(matches!(
            f.controller.delete(&mut f.store, &mut f.scene, &f.sync),
            Err(SelectionError::NoSelection)
        ));
    }

    #[test]
    fn update_survives_rebuild_with_highlight() {
        let mut f = Fixture::with_points(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        f.controller
            .select_by_list(1, &f.store, &mut f.scene)
            .unwrap();
        f.controller.form_mut().tag = "renamed".to_string();
        f.controller
            .update(&mut f.store, &mut f.scene, &f.sync)
            .unwrap();

        assert_eq!(f.store.get(1).unwrap().tag, "renamed");
        assert_eq!(f.scene.proxy_at(1).unwrap().payload.tag, "renamed");
        assert_eq!(f.highlighted(), vec![f.scene.proxy_at(1).unwrap().handle]);
        assert_eq!(f.scene.backend().spheres.len(), 2);
    }

    #[test]
    fn add_leaves_selection_alone() {
        let mut f = Fixture::with_points(&[[1.0, 2.0, 3.0]]);
        f.controller
            .select_by_list(0, &f.store, &mut f.scene)
            .unwrap();
        let index = f.controller.add(
            Rgb::new(0.5, 0.5, 0.5),
            &mut f.store,
            &mut f.scene,
            &f.sync,
        );
        assert_eq!(index, 1);
        assert_eq!(f.controller.selection(), Selection::Selected(0));
        assert_eq!(f.highlighted(), vec![f.scene.proxy_at(0).unwrap().handle]);
    }
}
