//! Per-sequence resources: camera calibration and static ignore mask.

use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::calibration::{CalibrationError, StereoCalibration};
use crate::dataset::Sequence;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors raised while locating or validating sequence resources.
#[derive(Debug)]
pub enum ResourceError {
    /// The sequence path does not yield a calibration base name.
    BadSequencePath { sequence: i64, path: String },
    /// No calibration file for the sequence.
    MissingCalibration { sequence: i64, path: PathBuf },
    /// The calibration file exists but could not be loaded.
    Calibration {
        sequence: i64,
        source: CalibrationError,
    },
    /// The sequence declares a static mask that is missing or unreadable.
    MissingMask {
        sequence: i64,
        path: PathBuf,
        reason: String,
    },
    /// Calibration image size differs from the configured resolution.
    UnexpectedResolution {
        sequence: i64,
        expected: [u32; 2],
        got: [u32; 2],
    },
    /// Static mask size differs from the calibration image size.
    MaskSizeMismatch {
        sequence: i64,
        expected: [u32; 2],
        got: [u32; 2],
    },
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadSequencePath { sequence, path } => write!(
                f,
                "sequence {}: cannot derive calibration name from path {:?}",
                sequence, path
            ),
            Self::MissingCalibration { sequence, path } => write!(
                f,
                "sequence {}: calibration file {} does not exist",
                sequence,
                path.display()
            ),
            Self::Calibration { sequence, source } => {
                write!(f, "sequence {}: {}", sequence, source)
            }
            Self::MissingMask {
                sequence,
                path,
                reason,
            } => write!(
                f,
                "sequence {}: cannot load static mask {}: {}",
                sequence,
                path.display(),
                reason
            ),
            Self::UnexpectedResolution {
                sequence,
                expected,
                got,
            } => write!(
                f,
                "sequence {}: calibration image size {}x{}, expected {}x{}",
                sequence, got[0], got[1], expected[0], expected[1]
            ),
            Self::MaskSizeMismatch {
                sequence,
                expected,
                got,
            } => write!(
                f,
                "sequence {}: static mask is {}x{}, frames are {}x{}",
                sequence, got[0], got[1], expected[0], expected[1]
            ),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Calibration { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ── Resource lookup ────────────────────────────────────────────────────────

/// Resources shared by all frames of a sequence.
#[derive(Debug, Clone)]
pub struct SequenceAssets {
    pub calibration: StereoCalibration,
    /// Raw static mask (non-zero = ignore), if the sequence declares one.
    pub static_mask: Option<GrayImage>,
}

/// Source of per-sequence calibration and static masks.
pub trait SequenceResources {
    fn load(&self, sequence: &Sequence) -> Result<SequenceAssets, ResourceError>;
}

/// Resources laid out beside the dataset file:
///
/// ```text
/// <root>/calibration/calibration-<base>.yaml
/// <root>/sequences/<sequence-dir>/ignore_mask.png
/// ```
#[derive(Debug, Clone)]
pub struct FsResources {
    root: PathBuf,
}

impl FsResources {
    pub const MASK_FILE_NAME: &'static str = "ignore_mask.png";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resources rooted at the directory holding the dataset JSON file.
    pub fn for_dataset_file(dataset_json: &Path) -> Self {
        let root = dataset_json
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn calibration_path(&self, sequence: &Sequence) -> Result<PathBuf, ResourceError> {
        let base = sequence
            .calibration_base_name()
            .ok_or_else(|| ResourceError::BadSequencePath {
                sequence: sequence.id,
                path: sequence.path.clone(),
            })?;
        Ok(self
            .root
            .join("calibration")
            .join(format!("calibration-{}.yaml", base)))
    }

    pub fn mask_path(&self, sequence: &Sequence) -> Result<PathBuf, ResourceError> {
        let dir = sequence
            .dir_name()
            .ok_or_else(|| ResourceError::BadSequencePath {
                sequence: sequence.id,
                path: sequence.path.clone(),
            })?;
        Ok(self
            .root
            .join("sequences")
            .join(dir)
            .join(Self::MASK_FILE_NAME))
    }
}

impl SequenceResources for FsResources {
    fn load(&self, sequence: &Sequence) -> Result<SequenceAssets, ResourceError> {
        let calib_path = self.calibration_path(sequence)?;
        if !calib_path.is_file() {
            return Err(ResourceError::MissingCalibration {
                sequence: sequence.id,
                path: calib_path,
            });
        }
        let calibration =
            StereoCalibration::from_file(&calib_path).map_err(|source| {
                ResourceError::Calibration {
                    sequence: sequence.id,
                    source,
                }
            })?;

        let static_mask = if sequence.has_static_mask() {
            let mask_path = self.mask_path(sequence)?;
            let img = image::open(&mask_path).map_err(|e| ResourceError::MissingMask {
                sequence: sequence.id,
                path: mask_path.clone(),
                reason: e.to_string(),
            })?;
            tracing::debug!("sequence {}: static mask {}", sequence.id, mask_path.display());
            Some(img.to_luma8())
        } else {
            None
        };

        Ok(SequenceAssets {
            calibration,
            static_mask,
        })
    }
}
