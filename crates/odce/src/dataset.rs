//! Dataset and detection-results files.
//!
//! Both files share one layout: a top-level `dataset` object holding
//! `sequences`, each with `frames`. Ground-truth frames carry `obstacles`
//! and `water_edges`; results frames carry `detections`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::overlap::BBox;
use crate::sea_edge::SeaEdge;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors raised while reading input files or pairing their contents.
#[derive(Debug)]
pub enum DataError {
    /// The file could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid dataset JSON.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A category name or id outside the fixed enumeration.
    UnknownCategory { category: CategoryRef },
    /// Different number of selected sequences in ground truth and results.
    SequenceCountMismatch { ground_truth: usize, results: usize },
    /// Sequences at the same sorted position carry different ids.
    SequenceIdMismatch { ground_truth: i64, results: i64 },
    /// Different number of frames in a paired sequence.
    FrameCountMismatch {
        sequence: i64,
        ground_truth: usize,
        results: usize,
    },
    /// Frames at the same position carry different ids.
    FrameIdMismatch {
        sequence: i64,
        ground_truth: i64,
        results: i64,
    },
    /// A frame needed for danger-zone masking has no roll/pitch.
    MissingAttitude { sequence: i64, frame: i64 },
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => write!(f, "cannot read {}: {}", path.display(), source),
            Self::Json { path, source } => {
                write!(f, "invalid dataset JSON in {}: {}", path.display(), source)
            }
            Self::UnknownCategory { category } => write!(f, "unknown obstacle category {}", category),
            Self::SequenceCountMismatch {
                ground_truth,
                results,
            } => write!(
                f,
                "sequence count mismatch: {} in ground truth, {} in results",
                ground_truth, results
            ),
            Self::SequenceIdMismatch {
                ground_truth,
                results,
            } => write!(
                f,
                "sequence id mismatch: ground truth {} vs results {}",
                ground_truth, results
            ),
            Self::FrameCountMismatch {
                sequence,
                ground_truth,
                results,
            } => write!(
                f,
                "sequence {}: frame count mismatch: {} in ground truth, {} in results",
                sequence, ground_truth, results
            ),
            Self::FrameIdMismatch {
                sequence,
                ground_truth,
                results,
            } => write!(
                f,
                "sequence {}: frame id mismatch: ground truth {} vs results {}",
                sequence, ground_truth, results
            ),
            Self::MissingAttitude { sequence, frame } => write!(
                f,
                "sequence {} frame {}: roll/pitch required for danger-zone masking",
                sequence, frame
            ),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ── Categories ─────────────────────────────────────────────────────────────

/// Obstacle category with its fixed numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Ship = 0,
    Person = 1,
    Other = 2,
}

impl Category {
    /// All categories in id order.
    pub const ALL: [Category; 3] = [Category::Ship, Category::Person, Category::Other];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ship => "ship",
            Self::Person => "person",
            Self::Other => "other",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| i64::from(c.id()) == id)
    }
}

/// Category as written in an input file: a name, or a numeric id in results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Id(i64),
    Name(String),
}

impl CategoryRef {
    /// Resolve against the fixed category enumeration.
    pub fn resolve(&self) -> Result<Category, DataError> {
        let found = match self {
            Self::Id(id) => Category::from_id(*id),
            Self::Name(name) => Category::from_name(name),
        };
        found.ok_or_else(|| DataError::UnknownCategory {
            category: self.clone(),
        })
    }
}

impl std::fmt::Display for CategoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {}", id),
            Self::Name(name) => write!(f, "`{}`", name),
        }
    }
}

/// Resolved annotation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleKind {
    /// Region hidden from scoring; never becomes a ground-truth box.
    Negative,
    Object(Category),
}

// ── Flags ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Number(f64),
}

impl From<RawFlag> for bool {
    fn from(raw: RawFlag) -> Self {
        match raw {
            RawFlag::Bool(b) => b,
            RawFlag::Number(n) => n > 0.0,
        }
    }
}

/// Deserialize a flag written either as a boolean or as a number (`> 0` is set).
pub(crate) fn deserialize_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    RawFlag::deserialize(d).map(bool::from)
}

fn deserialize_optional_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Option::<RawFlag>::deserialize(d).map(|v| v.map(bool::from))
}

/// Keep a present key as `Some` even when its value is `null`.
fn deserialize_present<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<serde_json::Value>, D::Error> {
    serde_json::Value::deserialize(d).map(Some)
}

/// Serialize a flag as `0`/`1`.
pub(crate) fn serialize_flag_as_int<S: Serializer>(v: &bool, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u8(u8::from(*v))
}

fn serialize_optional_flag<S: Serializer>(v: &Option<bool>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(b) => serialize_flag_as_int(b, s),
        None => s.serialize_none(),
    }
}

// ── File model ─────────────────────────────────────────────────────────────

/// Top-level dataset or results file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    pub dataset: Dataset,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub sequences: Vec<Sequence>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: i64,
    /// Frames directory relative to the dataset root, e.g.
    /// `/kope100-00006790-00007090/frames/`.
    #[serde(default)]
    pub path: String,
    /// Every obstacle in every frame was annotated.
    #[serde(
        default,
        deserialize_with = "deserialize_flag",
        serialize_with = "serialize_flag_as_int"
    )]
    pub exhaustive: bool,
    /// Present when the sequence has a static `ignore_mask.png`. Only the
    /// key counts: the value is not a reliable file name and may be `null`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub mask: Option<serde_json::Value>,
    #[serde(default)]
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: i64,
    /// IMU roll, degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    /// IMU pitch, degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default)]
    pub image_file_name: String,
    /// Per-frame override of the sequence exhaustive flag.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_flag",
        serialize_with = "serialize_optional_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub exhaustive: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub water_edges: Vec<SeaEdge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obstacles: Vec<Obstacle>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detections: Vec<Detection>,
}

/// Ground-truth obstacle annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub bbox: BBox,
    /// Category name, or `negative`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Annotated area; the box area when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
}

impl Obstacle {
    pub const NEGATIVE: &'static str = "negative";

    pub fn kind(&self) -> Result<ObstacleKind, DataError> {
        if self.kind == Self::NEGATIVE {
            return Ok(ObstacleKind::Negative);
        }
        CategoryRef::Name(self.kind.clone())
            .resolve()
            .map(ObstacleKind::Object)
    }

    pub fn area(&self) -> f64 {
        self.area.unwrap_or_else(|| self.bbox.area())
    }
}

/// Detected obstacle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    #[serde(rename = "type")]
    pub category: CategoryRef,
}

// ── Loading and lookups ────────────────────────────────────────────────────

impl DatasetFile {
    /// Load a dataset or results file.
    pub fn from_json_file(path: &Path) -> Result<Self, DataError> {
        let data = std::fs::read_to_string(path).map_err(|source| DataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: Self = serde_json::from_str(&data).map_err(|source| DataError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(
            "loaded {} ({} sequences)",
            path.display(),
            file.dataset.sequences.len()
        );
        Ok(file)
    }

    pub fn sequence(&self, id: i64) -> Option<&Sequence> {
        self.dataset.sequences.iter().find(|s| s.id == id)
    }
}

impl Sequence {
    /// Directory name of the sequence: the first non-empty component of `path`.
    pub fn dir_name(&self) -> Option<&str> {
        self.path.split('/').find(|c| !c.is_empty())
    }

    /// Calibration base name: the directory name up to its first `-`.
    pub fn calibration_base_name(&self) -> Option<&str> {
        self.dir_name()
            .and_then(|dir| dir.split('-').next())
            .filter(|base| !base.is_empty())
    }

    pub fn has_static_mask(&self) -> bool {
        self.mask.is_some()
    }

    /// Effective exhaustive flag of a frame. A non-exhaustive sequence can
    /// not be overridden per frame.
    pub fn frame_exhaustive(&self, frame: &Frame) -> bool {
        self.exhaustive && frame.exhaustive.unwrap_or(true)
    }

    pub fn frame(&self, id: i64) -> Option<&Frame> {
        self.frames.iter().find(|f| f.id == id)
    }
}

impl Frame {
    /// `(roll, pitch)` in degrees, when both are annotated.
    pub fn attitude(&self) -> Option<(f64, f64)> {
        Some((self.roll?, self.pitch?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUND_TRUTH: &str = r#"{
        "dataset": {
            "name": "test",
            "sequences": [{
                "id": 3,
                "path": "/kope100-00006790-00007090/frames/",
                "exhaustive": 1,
                "mask": "kope100-00006790-00007090.png",
                "frames": [{
                    "id": 0,
                    "roll": 1.5,
                    "pitch": -0.5,
                    "image_file_name": "00006790L.jpg",
                    "exhaustive": 0,
                    "water_edges": [{"x_axis": [0, 10], "y_axis": [5, 6]}],
                    "obstacles": [
                        {"bbox": [1, 2, 3, 4], "type": "ship", "area": 12, "id": 9},
                        {"bbox": [5, 5, 2, 2], "type": "negative", "area": 4}
                    ]
                }]
            }]
        }
    }"#;

    #[test]
    fn parses_ground_truth_layout() {
        let file: DatasetFile = serde_json::from_str(GROUND_TRUTH).unwrap();
        let seq = &file.dataset.sequences[0];
        assert_eq!(seq.id, 3);
        assert!(seq.exhaustive);
        assert!(seq.has_static_mask());
        assert_eq!(seq.dir_name(), Some("kope100-00006790-00007090"));
        assert_eq!(seq.calibration_base_name(), Some("kope100"));

        let frame = &seq.frames[0];
        assert_eq!(frame.attitude(), Some((1.5, -0.5)));
        assert_eq!(frame.exhaustive, Some(false));
        assert!(!seq.frame_exhaustive(frame));
        assert_eq!(frame.water_edges.len(), 1);
        assert_eq!(frame.obstacles[0].bbox, BBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(
            frame.obstacles[0].kind().unwrap(),
            ObstacleKind::Object(Category::Ship)
        );
        assert_eq!(frame.obstacles[1].kind().unwrap(), ObstacleKind::Negative);
        assert!(frame.detections.is_empty());
    }

    #[test]
    fn detections_accept_names_and_ids() {
        let frame: Frame = serde_json::from_str(
            r#"{"id": 1, "detections": [
                {"bbox": [0, 0, 1, 1], "type": "person"},
                {"bbox": [0, 0, 1, 1], "type": 2}
            ]}"#,
        )
        .unwrap();
        assert_eq!(frame.detections[0].category.resolve().unwrap(), Category::Person);
        assert_eq!(frame.detections[1].category.resolve().unwrap(), Category::Other);
        assert_eq!(frame.attitude(), None);
    }

    #[test]
    fn unknown_categories_are_errors() {
        assert!(matches!(
            CategoryRef::Name("buoy".into()).resolve(),
            Err(DataError::UnknownCategory { .. })
        ));
        assert!(CategoryRef::Id(3).resolve().is_err());
        assert!(CategoryRef::Id(-1).resolve().is_err());
        let obstacle = Obstacle {
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            kind: "kayak".into(),
            area: None,
        };
        let err = obstacle.kind().unwrap_err();
        assert!(err.to_string().contains("kayak"));
    }

    #[test]
    fn frame_override_only_narrows_exhaustive_sequences() {
        let mut seq = Sequence {
            exhaustive: false,
            ..Sequence::default()
        };
        let mut frame = Frame {
            exhaustive: Some(true),
            ..Frame::default()
        };
        assert!(!seq.frame_exhaustive(&frame));
        seq.exhaustive = true;
        assert!(seq.frame_exhaustive(&frame));
        frame.exhaustive = None;
        assert!(seq.frame_exhaustive(&frame));
        frame.exhaustive = Some(false);
        assert!(!seq.frame_exhaustive(&frame));
    }

    #[test]
    fn flags_accept_booleans_and_numbers() {
        let seq: Sequence = serde_json::from_str(r#"{"id": 0, "exhaustive": true}"#).unwrap();
        assert!(seq.exhaustive);
        let seq: Sequence = serde_json::from_str(r#"{"id": 0, "exhaustive": 0}"#).unwrap();
        assert!(!seq.exhaustive);
        let seq: Sequence = serde_json::from_str(r#"{"id": 0}"#).unwrap();
        assert!(!seq.exhaustive);
        assert!(!seq.has_static_mask());
    }

    #[test]
    fn mask_key_counts_even_when_null() {
        let seq: Sequence = serde_json::from_str(r#"{"id": 0, "mask": null}"#).unwrap();
        assert!(seq.has_static_mask());
        let seq: Sequence = serde_json::from_str(r#"{"id": 0, "mask": "a.png"}"#).unwrap();
        assert!(seq.has_static_mask());
        let seq: Sequence = serde_json::from_str(r#"{"id": 0}"#).unwrap();
        assert!(!seq.has_static_mask());
    }

    #[test]
    fn missing_obstacle_area_falls_back_to_box_area() {
        let obstacle: Obstacle =
            serde_json::from_str(r#"{"bbox": [0, 0, 4, 5], "type": "other"}"#).unwrap();
        assert_eq!(obstacle.area(), 20.0);
    }

    #[test]
    fn base_name_uses_first_path_component() {
        let seq = Sequence {
            path: "stru02-00000010-00000400/frames".into(),
            ..Sequence::default()
        };
        assert_eq!(seq.calibration_base_name(), Some("stru02"));
        let seq = Sequence::default();
        assert_eq!(seq.calibration_base_name(), None);
    }
}
