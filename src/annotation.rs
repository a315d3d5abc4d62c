//! Point annotation data model.
//!
//! Annotations live in an [`AnnotationStore`], an ordered collection whose
//! insertion order is the display order of the side list. Every record
//! carries its own position in that order as `index`; the store renumbers on
//! every insert and delete so `store[i].index == i` always holds.

use crate::volume::VolumeBuffer;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display radius used when an import omits `size`.
pub const DEFAULT_SIZE: f64 = 2.0;
/// Free text attached to labels generated from lesion masks.
pub const MASK_LABEL_INFO: &str = "This is a tumor.";

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Annotation index {index} out of range for {len} annotations")]
    OutOfRange { index: usize, len: usize },

    #[error("Annotation file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Annotation file must contain an array of labels")]
    NotAnArray,
}

/// Linear RGB color with channels in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const HIGHLIGHT: Rgb = Rgb::new(1.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        Self::new(rng.r#gen(), rng.r#gen(), rng.r#gen())
    }

    pub fn to_u8(self) -> [u8; 3] {
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [channel(self.r), channel(self.g), channel(self.b)]
    }
}

/// Editable content of an annotation, without its position in the store.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationFields {
    pub position: [f64; 3],
    pub tag: String,
    pub info: String,
    pub color: Rgb,
    pub size: f64,
}

/// A user-placed point of interest in voxel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub position: [f64; 3],
    pub tag: String,
    pub info: String,
    pub color: Rgb,
    pub size: f64,
    pub index: usize,
}

impl Annotation {
    fn from_fields(fields: AnnotationFields, index: usize) -> Self {
        let AnnotationFields {
            position,
            tag,
            info,
            color,
            size,
        } = fields;
        Self {
            position,
            tag,
            info,
            color,
            size,
            index,
        }
    }

    pub fn fields(&self) -> AnnotationFields {
        AnnotationFields {
            position: self.position,
            tag: self.tag.clone(),
            info: self.info.clone(),
            color: self.color,
            size: self.size,
        }
    }
}

/// One entry of the annotation import/export file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl LabelRecord {
    /// Fill in defaults for missing or empty fields and assign a random color.
    pub fn into_fields(self, rng: &mut impl Rng) -> AnnotationFields {
        let tag = self
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Label {}_{}_{}", self.x, self.y, self.z));
        let size = self.size.filter(|&s| s > 0.0).unwrap_or(DEFAULT_SIZE);
        AnnotationFields {
            position: [self.x, self.y, self.z],
            tag,
            info: self.info.unwrap_or_default(),
            color: Rgb::random(rng),
            size,
        }
    }

    /// Label at the centroid of a mask's nonzero voxels, each coordinate
    /// rounded to one decimal. `None` when no voxel is set.
    pub fn from_mask(mask: &VolumeBuffer, name: &str) -> Option<Self> {
        let dims = mask.dims();
        let plane = dims.nx * dims.ny;
        let (sum, count) = mask
            .scalars()
            .iter()
            .enumerate()
            .filter(|(_, value)| **value != 0.0)
            .fold(([0.0f64; 3], 0usize), |(mut sum, count), (i, _)| {
                sum[0] += (i % dims.nx) as f64;
                sum[1] += (i % plane / dims.nx) as f64;
                sum[2] += (i / plane) as f64;
                (sum, count + 1)
            });
        if count == 0 {
            return None;
        }
        let [x, y, z] = sum.map(|s| (s / count as f64 * 10.0).round() / 10.0);
        Some(Self {
            x,
            y,
            z,
            name: Some(name.to_string()),
            size: Some(DEFAULT_SIZE),
            info: Some(MASK_LABEL_INFO.to_string()),
        })
    }
}

/// Parse an annotation import file.
///
/// # Errors
///
/// Returns [`AnnotationError::NotAnArray`] when the top-level value is not an
/// array and [`AnnotationError::Parse`] when it is not valid JSON or an entry
/// lacks a numeric coordinate.
pub fn parse_labels(
    text: &str,
    rng: &mut impl Rng,
) -> Result<Vec<AnnotationFields>, AnnotationError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_array() {
        return Err(AnnotationError::NotAnArray);
    }
    let records: Vec<LabelRecord> = serde_json::from_value(value)?;
    Ok(records.into_iter().map(|r| r.into_fields(rng)).collect())
}

/// Ordered annotation collection with positional indices.
#[derive(Clone, Debug, Default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: impl IntoIterator<Item = AnnotationFields>) -> Self {
        let annotations = fields
            .into_iter()
            .enumerate()
            .map(|(index, f)| Annotation::from_fields(f, index))
            .collect();
        Self { annotations }
    }

    /// Append a record; its index is the new length minus one.
    pub fn add(&mut self, fields: AnnotationFields) -> &[Annotation] {
        let index = self.annotations.len();
        self.annotations.push(Annotation::from_fields(fields, index));
        self.debug_check_indices();
        &self.annotations
    }

    /// Replace the record at `index`, keeping its position.
    pub fn update(
        &mut self,
        index: usize,
        fields: AnnotationFields,
    ) -> Result<&[Annotation], AnnotationError> {
        self.check_index(index)?;
        self.annotations[index] = Annotation::from_fields(fields, index);
        Ok(&self.annotations)
    }

    /// Remove the record at `index` and shift every later record down by one.
    pub fn delete(&mut self, index: usize) -> Result<&[Annotation], AnnotationError> {
        self.check_index(index)?;
        self.annotations.remove(index);
        for annotation in &mut self.annotations[index..] {
            annotation.index -= 1;
        }
        self.debug_check_indices();
        Ok(&self.annotations)
    }

    pub fn replace_all(&mut self, fields: impl IntoIterator<Item = AnnotationFields>) {
        *self = Self::from_fields(fields);
    }

    pub fn get(&self, index: usize) -> Option<&Annotation> {
        self.annotations.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    pub fn as_slice(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn to_records(&self) -> Vec<LabelRecord> {
        self.annotations
            .iter()
            .map(|a| LabelRecord {
                x: a.position[0],
                y: a.position[1],
                z: a.position[2],
                name: Some(a.tag.clone()),
                size: Some(a.size),
                info: Some(a.info.clone()),
            })
            .collect()
    }

    /// Export in the import file shape. Colors are not part of the format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_records())
    }

    fn check_index(&self, index: usize) -> Result<(), AnnotationError> {
        if index >= self.annotations.len() {
            return Err(AnnotationError::OutOfRange {
                index,
                len: self.annotations.len(),
            });
        }
        Ok(())
    }

    fn debug_check_indices(&self) {
        debug_assert!(
            self.annotations.iter().enumerate().all(|(i, a)| a.index == i),
            "annotation indices out of sync with positions"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fields(tag: &str, position: [f64; 3]) -> AnnotationFields {
        AnnotationFields {
            position,
            tag: tag.to_string(),
            info: String::new(),
            color: Rgb::new(0.2, 0.4, 0.6),
            size: DEFAULT_SIZE,
        }
    }

    fn assert_indexed(store: &AnnotationStore) {
        for (i, annotation) in store.iter().enumerate() {
            assert_eq!(annotation.index, i);
        }
    }

    #[test]
    fn add_assigns_trailing_index() {
        let mut store = AnnotationStore::new();
        let records = store.add(fields("A", [1.0, 2.0, 3.0]));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].index, 0);
        store.add(fields("B", [4.0, 5.0, 6.0]));
        assert_eq!(store.get(1).unwrap().index, 1);
        assert_eq!(store.get(1).unwrap().tag, "B");
    }

    #[test]
    fn delete_renumbers_following_records() {
        let mut store = AnnotationStore::new();
        store.add(fields("A", [1.0, 2.0, 3.0]));
        store.add(fields("B", [4.0, 5.0, 6.0]));
        let records = store.delete(0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].index, 0);
        assert_eq!(records[0].tag, "B");
        assert_eq!(records[0].position, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn update_keeps_index() {
        let mut store = AnnotationStore::new();
        store.add(fields("A", [1.0, 2.0, 3.0]));
        store.add(fields("B", [4.0, 5.0, 6.0]));
        store.update(1, fields("C", [7.0, 8.0, 9.0])).unwrap();
        let updated = store.get(1).unwrap();
        assert_eq!(updated.index, 1);
        assert_eq!(updated.tag, "C");
        assert_eq!(store.get(0).unwrap().tag, "A");
    }

    #[test]
    fn stale_indices_are_out_of_range() {
        let mut store = AnnotationStore::new();
        store.add(fields("A", [0.0; 3]));
        assert!(matches!(
            store.update(1, fields("X", [0.0; 3])),
            Err(AnnotationError::OutOfRange { index: 1, len: 1 })
        ));
        store.delete(0).unwrap();
        assert!(matches!(
            store.delete(0),
            Err(AnnotationError::OutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn indices_hold_across_mixed_operations() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut store = AnnotationStore::new();
        for step in 0..200 {
            let roll: u8 = rng.gen_range(0..3);
            match roll {
                0 => {
                    store.add(fields(&format!("L{step}"), [step as f64; 3]));
                }
                1 if !store.is_empty() => {
                    let index = rng.gen_range(0..store.len());
                    store.update(index, fields("U", [0.0; 3])).unwrap();
                }
                _ if !store.is_empty() => {
                    let index = rng.gen_range(0..store.len());
                    store.delete(index).unwrap();
                }
                _ => {}
            }
            assert_indexed(&store);
        }
    }

    #[test]
    fn import_fills_defaults() {
        let mut rng = StdRng::seed_from_u64(1);
        let text = r#"[
            {"x": 10, "y": 20.5, "z": 30},
            {"x": 1, "y": 2, "z": 3, "name": "t1_lesion", "size": 4, "info": "This is a tumor."}
        ]"#;
        let labels = parse_labels(text, &mut rng).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].tag, "Label 10_20.5_30");
        assert_eq!(labels[0].size, DEFAULT_SIZE);
        assert_eq!(labels[0].info, "");
        assert_eq!(labels[1].tag, "t1_lesion");
        assert_eq!(labels[1].size, 4.0);
        assert_eq!(labels[1].info, "This is a tumor.");
        for label in &labels {
            for c in [label.color.r, label.color.g, label.color.b] {
                assert!((0.0..=1.0).contains(&c));
            }
        }
    }

    #[test]
    fn import_rejects_non_arrays() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            parse_labels(r#"{"x": 1, "y": 2, "z": 3}"#, &mut rng),
            Err(AnnotationError::NotAnArray)
        ));
        assert!(matches!(
            parse_labels("not json", &mut rng),
            Err(AnnotationError::Parse(_))
        ));
        assert!(matches!(
            parse_labels(r#"[{"x": 1, "y": 2}]"#, &mut rng),
            Err(AnnotationError::Parse(_))
        ));
    }

    #[test]
    fn export_matches_import_shape() {
        let mut store = AnnotationStore::new();
        store.add(AnnotationFields {
            info: "biopsy".to_string(),
            ..fields("A", [1.0, 2.0, 3.0])
        });
        let json = store.to_json().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let imported = parse_labels(&json, &mut rng).unwrap();
        assert_eq!(imported[0].tag, "A");
        assert_eq!(imported[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(imported[0].info, "biopsy");
    }

    #[test]
    fn mask_label_sits_at_centroid() {
        use crate::volume::{Dims, voxel_index};

        let dims = Dims::new(4, 4, 4);
        let mut scalars = vec![0.0; dims.voxel_count()];
        for (x, y, z) in [(1, 1, 1), (2, 1, 1), (2, 2, 3)] {
            scalars[voxel_index(&dims, x, y, z)] = 1.0;
        }
        let mask = VolumeBuffer::from_scalars(dims, scalars).unwrap();

        let record = LabelRecord::from_mask(&mask, "t1_1_2-3").unwrap();
        assert_eq!((record.x, record.y, record.z), (1.7, 1.3, 1.7));
        assert_eq!(record.name.as_deref(), Some("t1_1_2-3"));
        assert_eq!(record.size, Some(DEFAULT_SIZE));
        assert_eq!(record.info.as_deref(), Some(MASK_LABEL_INFO));

        let json = serde_json::to_string(&vec![record]).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let labels = parse_labels(&json, &mut rng).unwrap();
        assert_eq!(labels[0].tag, "t1_1_2-3");
        assert_eq!(labels[0].position, [1.7, 1.3, 1.7]);
    }

    #[test]
    fn empty_mask_has_no_label() {
        let mask =
            VolumeBuffer::from_scalars(crate::volume::Dims::new(3, 3, 3), vec![0.0; 27]).unwrap();
        assert!(LabelRecord::from_mask(&mask, "empty").is_none());
    }

    #[test]
    fn color_converts_to_bytes() {
        assert_eq!(Rgb::HIGHLIGHT.to_u8(), [255, 0, 0]);
        assert_eq!(Rgb::new(0.5, 1.5, -1.0).to_u8(), [128, 255, 0]);
    }
}
