//! odce: ground-truth and detection corpus preparation for maritime
//! obstacle detection benchmarks.
//!
//! A benchmark run pairs a dataset file (annotated sequences of frames) with a
//! results file (detections on the same frames) and turns them into a single
//! COCO-compatible corpus. Per frame, an ignore mask decides which boxes take
//! part in scoring:
//!
//! 1. **Static mask**: optional per-sequence `ignore_mask.png`.
//! 2. **Sea edge**: everything above the annotated water edge ([`sea_edge`]).
//! 3. **Danger zone**: everything outside a fixed-radius circle on the
//!    estimated sea plane, projected through the calibrated camera
//!    ([`plane`], [`danger_zone`]).
//!
//! The corpus is scored by an external metric engine ([`MetricEngine`]) and
//! reduced to F1 scores for the three challenge setups.
//!
//! # Public API
//! - [`assemble`] with [`AssemblyOptions`] builds an [`EvaluationCorpus`]
//! - [`evaluate_challenge`] runs all three setups
//! - [`FsResources`] reads calibration and static masks beside the dataset file

pub mod calibration;
pub mod camera;
pub mod config;
pub mod corpus;
pub mod danger_zone;
pub mod dataset;
pub mod mask;
pub mod overlap;
pub mod plane;
pub mod resources;
pub mod score;
pub mod sea_edge;

pub use calibration::{CalibrationError, StereoCalibration};
pub use camera::{CameraIntrinsics, CameraModel, RadialTangentialDistortion};
pub use config::EvaluationConfig;
pub use corpus::{
    assemble, frame_mask, AssemblyError, AssemblyOptions, EvalMode, EvaluationCorpus, IdCursor,
    SequenceContext,
};
pub use danger_zone::{build_danger_zone_mask, DangerZoneParams};
pub use dataset::{Category, CategoryRef, DataError, DatasetFile};
pub use mask::{IgnoreMask, MaskError};
pub use overlap::{bbox_in_mask, iou, iou_overlaps, BBox};
pub use plane::SeaPlane;
pub use resources::{FsResources, ResourceError, SequenceAssets, SequenceResources};
pub use score::{
    evaluate_challenge, evaluate_setup, f_score, reduce_stats, ChallengeResults, EngineError,
    EngineParams, EvaluationError, FScores, MetricEngine, ProcessEngine, Setup, NUM_STATS,
};
pub use sea_edge::{build_sea_edge_mask, SeaEdge};
