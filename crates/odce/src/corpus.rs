//! Evaluation corpus assembly.
//!
//! Paired ground-truth and results sequences are merged into one flat,
//! COCO-compatible corpus. For every frame an ignore mask is built from the
//! evaluation mode, the annotation completeness and the sequence's static
//! mask; each box is then flagged as ignored when the mask covers most of
//! it. In danger-zone mode an ignored box that matches nothing on the other
//! side is dropped instead of being flagged.
//!
//! Image and annotation ids are global running counters in
//! (sequence id, frame order) order. They are threaded explicitly through
//! [`assemble_frame`] as an [`IdCursor`].

use std::collections::BTreeSet;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::config::EvaluationConfig;
use crate::danger_zone::build_danger_zone_mask;
use crate::dataset::{
    deserialize_flag, serialize_flag_as_int, Category, DataError, DatasetFile, Frame,
    ObstacleKind, Sequence,
};
use crate::mask::{IgnoreMask, MaskError};
use crate::overlap::{bbox_in_mask, overlaps_any, BBox};
use crate::resources::{ResourceError, SequenceAssets, SequenceResources};
use crate::sea_edge::build_sea_edge_mask;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors that abort corpus assembly.
#[derive(Debug)]
pub enum AssemblyError {
    Data(DataError),
    Resource(ResourceError),
    /// Mask construction failed for a frame.
    Mask {
        sequence: i64,
        frame: i64,
        source: MaskError,
    },
}

impl std::fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data(e) => write!(f, "{}", e),
            Self::Resource(e) => write!(f, "{}", e),
            Self::Mask {
                sequence,
                frame,
                source,
            } => write!(f, "sequence {} frame {}: {}", sequence, frame, source),
        }
    }
}

impl std::error::Error for AssemblyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Data(e) => Some(e),
            Self::Resource(e) => Some(e),
            Self::Mask { source, .. } => Some(source),
        }
    }
}

impl From<DataError> for AssemblyError {
    fn from(e: DataError) -> Self {
        Self::Data(e)
    }
}

impl From<ResourceError> for AssemblyError {
    fn from(e: ResourceError) -> Self {
        Self::Resource(e)
    }
}

// ── Options ────────────────────────────────────────────────────────────────

/// Which geometric ignore mask is combined with the static sequence mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalMode {
    /// Static mask only.
    #[serde(rename = "full")]
    Full,
    /// Everything above the annotated sea edge is ignored.
    #[serde(rename = "edge")]
    Edge,
    /// Everything outside the danger zone is ignored.
    #[serde(rename = "dz")]
    DangerZone,
}

impl EvalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Edge => "edge",
            Self::DangerZone => "dz",
        }
    }
}

impl std::fmt::Display for EvalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EvalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "edge" => Ok(Self::Edge),
            "dz" => Ok(Self::DangerZone),
            _ => Err(format!("unknown evaluation mode {:?} (expected full, edge or dz)", s)),
        }
    }
}

/// What to assemble.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyOptions {
    pub mode: EvalMode,
    /// Collapse all categories to id 0.
    pub ignore_class: bool,
    /// Sequence ids to keep; `None` keeps all.
    pub sequences: Option<BTreeSet<i64>>,
}

impl AssemblyOptions {
    pub fn new(mode: EvalMode, ignore_class: bool) -> Self {
        Self {
            mode,
            ignore_class,
            sequences: None,
        }
    }

    pub fn with_sequences(mut self, sequences: Option<BTreeSet<i64>>) -> Self {
        self.sequences = sequences;
        self
    }

    fn selects(&self, id: i64) -> bool {
        self.sequences
            .as_ref()
            .map_or(true, |set| set.is_empty() || set.contains(&id))
    }
}

// ── Corpus model ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusInfo {
    pub year: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusCategory {
    pub id: u32,
    pub name: String,
    pub supercategory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEntry {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u32,
    pub bbox: BBox,
    pub iscrowd: u8,
    pub area: f64,
    pub segmentation: Vec<serde_json::Value>,
    #[serde(
        deserialize_with = "deserialize_flag",
        serialize_with = "serialize_flag_as_int"
    )]
    pub ignore: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEntry {
    pub image_id: u64,
    pub category_id: u32,
    pub bbox: BBox,
    pub score: f64,
    #[serde(
        deserialize_with = "deserialize_flag",
        serialize_with = "serialize_flag_as_int"
    )]
    pub ignore: bool,
}

/// Ground-truth half of the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub info: CorpusInfo,
    pub categories: Vec<CorpusCategory>,
    pub images: Vec<ImageEntry>,
    pub annotations: Vec<AnnotationEntry>,
}

impl Default for GroundTruth {
    fn default() -> Self {
        Self {
            info: CorpusInfo { year: 2022 },
            categories: Category::ALL
                .iter()
                .map(|c| CorpusCategory {
                    id: c.id(),
                    name: c.name().to_string(),
                    supercategory: "obstacle".to_string(),
                })
                .collect(),
            images: Vec::new(),
            annotations: Vec::new(),
        }
    }
}

/// Images, annotations and detections of all selected sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCorpus {
    pub ground_truth: GroundTruth,
    pub detections: Vec<DetectionEntry>,
}

impl EvaluationCorpus {
    /// Emitted annotations of one image.
    pub fn annotations_of(&self, image_id: u64) -> impl Iterator<Item = &AnnotationEntry> {
        self.ground_truth
            .annotations
            .iter()
            .filter(move |a| a.image_id == image_id)
    }

    /// Emitted detections of one image.
    pub fn detections_of(&self, image_id: u64) -> impl Iterator<Item = &DetectionEntry> {
        self.detections
            .iter()
            .filter(move |d| d.image_id == image_id)
    }
}

/// Next global image and annotation ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdCursor {
    pub image_id: u64,
    pub annotation_id: u64,
}

/// Corpus entries produced by one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEntries {
    pub image: ImageEntry,
    pub annotations: Vec<AnnotationEntry>,
    pub detections: Vec<DetectionEntry>,
}

// ── Sequence context ───────────────────────────────────────────────────────

/// Validated per-sequence inputs shared by its frames.
#[derive(Debug, Clone)]
pub struct SequenceContext {
    pub sequence_id: i64,
    pub camera: CameraModel,
    pub width: u32,
    pub height: u32,
    pub static_mask: Option<GrayImage>,
}

impl SequenceContext {
    /// Validate loaded assets against the configuration.
    pub fn new(
        sequence_id: i64,
        assets: SequenceAssets,
        config: &EvaluationConfig,
    ) -> Result<Self, ResourceError> {
        let [width, height] = assets.calibration.image_size;
        if let Some(expected) = config.expected_image_size {
            if expected != [width, height] {
                return Err(ResourceError::UnexpectedResolution {
                    sequence: sequence_id,
                    expected,
                    got: [width, height],
                });
            }
        }
        if let Some(mask) = &assets.static_mask {
            if mask.dimensions() != (width, height) {
                return Err(ResourceError::MaskSizeMismatch {
                    sequence: sequence_id,
                    expected: [width, height],
                    got: [mask.width(), mask.height()],
                });
            }
        }
        let camera = assets
            .calibration
            .camera_model()
            .map_err(|source| ResourceError::Calibration {
                sequence: sequence_id,
                source,
            })?;
        Ok(Self {
            sequence_id,
            camera,
            width,
            height,
            static_mask: assets.static_mask,
        })
    }

    /// Load and validate the context of `sequence`.
    pub fn load<R: SequenceResources + ?Sized>(
        sequence: &Sequence,
        resources: &R,
        config: &EvaluationConfig,
    ) -> Result<Self, ResourceError> {
        Self::new(sequence.id, resources.load(sequence)?, config)
    }
}

// ── Masks ──────────────────────────────────────────────────────────────────

/// Ignore mask of a frame before negative annotations are applied.
///
/// | exhaustive | mode   | mask                                  |
/// |------------|--------|---------------------------------------|
/// | yes        | `full` | static                                |
/// | yes        | `edge` | sea edge OR static                    |
/// | yes        | `dz`   | outside danger zone OR static         |
/// | no         | `dz`   | outside danger zone OR static         |
/// | no         | other  | everything                            |
pub fn frame_mask(
    mode: EvalMode,
    exhaustive: bool,
    frame: &Frame,
    ctx: &SequenceContext,
    config: &EvaluationConfig,
) -> Result<IgnoreMask, AssemblyError> {
    let (w, h) = (ctx.width, ctx.height);
    if !exhaustive && mode != EvalMode::DangerZone {
        return Ok(IgnoreMask::ignore_all(w, h));
    }

    let mask_err = |source| AssemblyError::Mask {
        sequence: ctx.sequence_id,
        frame: frame.id,
        source,
    };
    let mut mask = IgnoreMask::keep_all(w, h);
    match mode {
        EvalMode::Full => {}
        EvalMode::Edge => {
            let layer = build_sea_edge_mask(&frame.water_edges, w, h);
            mask.combine(&layer).map_err(mask_err)?;
        }
        EvalMode::DangerZone => {
            let (roll, pitch) = frame.attitude().ok_or(DataError::MissingAttitude {
                sequence: ctx.sequence_id,
                frame: frame.id,
            })?;
            let layer =
                build_danger_zone_mask(roll, pitch, &ctx.camera, w, h, &config.danger_zone)
                    .map_err(mask_err)?;
            mask.combine(&layer).map_err(mask_err)?;
        }
    }
    if let Some(static_mask) = &ctx.static_mask {
        mask.combine(static_mask).map_err(mask_err)?;
    }
    Ok(mask)
}

// ── Assembly ───────────────────────────────────────────────────────────────

/// Decide the fate of one box: `None` drops it, `Some(ignore)` emits it.
fn box_verdict<'a, I>(
    bbox: &BBox,
    others: I,
    mask: &IgnoreMask,
    mode: EvalMode,
    config: &EvaluationConfig,
) -> Option<bool>
where
    I: IntoIterator<Item = &'a BBox>,
{
    let ignore = bbox_in_mask(mask, bbox, config.coverage_threshold);
    if ignore && mode == EvalMode::DangerZone && !overlaps_any(bbox, others, config.overlap_threshold)
    {
        return None;
    }
    Some(ignore)
}

/// Build the corpus entries of one frame pair and advance the id cursor.
pub fn assemble_frame(
    sequence: &Sequence,
    gt_frame: &Frame,
    dt_frame: &Frame,
    ctx: &SequenceContext,
    options: &AssemblyOptions,
    config: &EvaluationConfig,
    cursor: IdCursor,
) -> Result<(FrameEntries, IdCursor), AssemblyError> {
    let exhaustive = sequence.frame_exhaustive(gt_frame);
    let mut mask = frame_mask(options.mode, exhaustive, gt_frame, ctx, config)?;

    let mut objects = Vec::with_capacity(gt_frame.obstacles.len());
    for obstacle in &gt_frame.obstacles {
        match obstacle.kind()? {
            ObstacleKind::Negative => mask.ignore_region(&obstacle.bbox),
            ObstacleKind::Object(category) => objects.push((obstacle, category)),
        }
    }
    let detections = dt_frame
        .detections
        .iter()
        .map(|d| d.category.resolve().map(|c| (d, c)))
        .collect::<Result<Vec<_>, _>>()?;

    let category_id = |c: Category| if options.ignore_class { 0 } else { c.id() };
    let image_id = cursor.image_id;
    let mut annotation_id = cursor.annotation_id;

    let mut annotations = Vec::with_capacity(objects.len());
    for (obstacle, category) in objects {
        let others = detections.iter().map(|(d, _)| &d.bbox);
        let Some(ignore) = box_verdict(&obstacle.bbox, others, &mask, options.mode, config) else {
            tracing::trace!(
                "sequence {} frame {}: dropped annotation {:?}",
                sequence.id,
                gt_frame.id,
                obstacle.bbox
            );
            continue;
        };
        annotations.push(AnnotationEntry {
            id: annotation_id,
            image_id,
            category_id: category_id(category),
            bbox: obstacle.bbox,
            iscrowd: 0,
            area: obstacle.area(),
            segmentation: Vec::new(),
            ignore,
        });
        annotation_id += 1;
    }

    let mut emitted = Vec::with_capacity(detections.len());
    for (detection, category) in detections {
        let others = gt_frame.obstacles.iter().map(|o| &o.bbox);
        let Some(ignore) = box_verdict(&detection.bbox, others, &mask, options.mode, config)
        else {
            tracing::trace!(
                "sequence {} frame {}: dropped detection {:?}",
                sequence.id,
                gt_frame.id,
                detection.bbox
            );
            continue;
        };
        emitted.push(DetectionEntry {
            image_id,
            category_id: category_id(category),
            bbox: detection.bbox,
            score: 1.0,
            ignore,
        });
    }

    tracing::debug!(
        "sequence {} frame {} -> image {}: exhaustive={}, {} annotations, {} detections, {} px ignored",
        sequence.id,
        gt_frame.id,
        image_id,
        exhaustive,
        annotations.len(),
        emitted.len(),
        mask.ignored_count()
    );

    let entries = FrameEntries {
        image: ImageEntry {
            id: image_id,
            width: ctx.width,
            height: ctx.height,
            file_name: gt_frame.image_file_name.clone(),
        },
        annotations,
        detections: emitted,
    };
    let next = IdCursor {
        image_id: image_id + 1,
        annotation_id,
    };
    Ok((entries, next))
}

/// Select, sort and pair ground-truth and results sequences by id.
pub fn pair_sequences<'a>(
    ground_truth: &'a DatasetFile,
    results: &'a DatasetFile,
    options: &AssemblyOptions,
) -> Result<Vec<(&'a Sequence, &'a Sequence)>, DataError> {
    let select = |file: &'a DatasetFile| {
        let mut seqs: Vec<&Sequence> = file
            .dataset
            .sequences
            .iter()
            .filter(|s| options.selects(s.id))
            .collect();
        seqs.sort_by_key(|s| s.id);
        seqs
    };
    let gt = select(ground_truth);
    let dt = select(results);
    if gt.len() != dt.len() {
        return Err(DataError::SequenceCountMismatch {
            ground_truth: gt.len(),
            results: dt.len(),
        });
    }
    gt.into_iter()
        .zip(dt)
        .map(|(g, d)| {
            if g.id != d.id {
                return Err(DataError::SequenceIdMismatch {
                    ground_truth: g.id,
                    results: d.id,
                });
            }
            Ok((g, d))
        })
        .collect()
}

/// Check that two sequences list the same frames in the same order.
fn check_frames(gt: &Sequence, dt: &Sequence) -> Result<(), DataError> {
    if gt.frames.len() != dt.frames.len() {
        return Err(DataError::FrameCountMismatch {
            sequence: gt.id,
            ground_truth: gt.frames.len(),
            results: dt.frames.len(),
        });
    }
    for (g, d) in gt.frames.iter().zip(&dt.frames) {
        if g.id != d.id {
            return Err(DataError::FrameIdMismatch {
                sequence: gt.id,
                ground_truth: g.id,
                results: d.id,
            });
        }
    }
    Ok(())
}

/// Assemble the evaluation corpus from a dataset and a results file.
///
/// All pairing checks run before any frame is processed, so a structural
/// mismatch never yields a partial corpus.
pub fn assemble<R: SequenceResources + ?Sized>(
    ground_truth: &DatasetFile,
    results: &DatasetFile,
    resources: &R,
    options: &AssemblyOptions,
    config: &EvaluationConfig,
) -> Result<EvaluationCorpus, AssemblyError> {
    let pairs = pair_sequences(ground_truth, results, options)?;
    for (gt, dt) in &pairs {
        check_frames(gt, dt)?;
    }

    let mut corpus = EvaluationCorpus::default();
    let mut cursor = IdCursor::default();
    for (gt_seq, dt_seq) in pairs {
        let ctx = SequenceContext::load(gt_seq, resources, config)?;
        let before = (
            corpus.ground_truth.annotations.len(),
            corpus.detections.len(),
        );
        for (gt_frame, dt_frame) in gt_seq.frames.iter().zip(&dt_seq.frames) {
            let (entries, next) =
                assemble_frame(gt_seq, gt_frame, dt_frame, &ctx, options, config, cursor)?;
            corpus.ground_truth.images.push(entries.image);
            corpus.ground_truth.annotations.extend(entries.annotations);
            corpus.detections.extend(entries.detections);
            cursor = next;
        }
        tracing::info!(
            "sequence {} ({}): {} frames, {} annotations, {} detections",
            gt_seq.id,
            gt_seq.dir_name().unwrap_or("?"),
            gt_seq.frames.len(),
            corpus.ground_truth.annotations.len() - before.0,
            corpus.detections.len() - before.1
        );
    }

    tracing::info!(
        "corpus [{}{}]: {} images, {} annotations, {} detections",
        options.mode,
        if options.ignore_class { ", class-agnostic" } else { "" },
        corpus.ground_truth.images.len(),
        corpus.ground_truth.annotations.len(),
        corpus.detections.len()
    );
    Ok(corpus)
}
