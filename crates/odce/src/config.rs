//! Evaluation configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::danger_zone::DangerZoneParams;
use crate::overlap::{DEFAULT_COVERAGE_THRESHOLD, DEFAULT_OVERLAP_THRESHOLD};

/// Resolution of the benchmark's left camera, `[width, height]`.
pub const EXPECTED_IMAGE_SIZE: [u32; 2] = [1278, 958];

/// Top-level evaluation configuration.
///
/// Every field has a default; a JSON file only needs to list the fields it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Danger-zone geometry.
    pub danger_zone: DangerZoneParams,
    /// Required calibration image size. `None` accepts any camera rig.
    pub expected_image_size: Option<[u32; 2]>,
    /// IoU thresholds handed to the metric engine.
    pub iou_thresholds: Vec<f64>,
    /// IoU above which an annotation and a detection count as matched.
    pub overlap_threshold: f64,
    /// Masked fraction above which a box counts as ignored.
    pub coverage_threshold: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            danger_zone: DangerZoneParams::default(),
            expected_image_size: Some(EXPECTED_IMAGE_SIZE),
            iou_thresholds: vec![0.3, 0.3],
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
        }
    }
}

impl EvaluationConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), String> {
        let dz = &self.danger_zone;
        if !(dz.range_m.is_finite() && dz.range_m > 0.0) {
            return Err(format!("danger_zone.range_m must be positive, got {}", dz.range_m));
        }
        if !(dz.camera_fov_deg.is_finite() && dz.camera_fov_deg > 0.0 && dz.camera_fov_deg < 180.0)
        {
            return Err(format!(
                "danger_zone.camera_fov_deg must be in (0, 180), got {}",
                dz.camera_fov_deg
            ));
        }
        if !dz.image_margin_px.is_finite() || dz.image_margin_px < 0.0 {
            return Err(format!(
                "danger_zone.image_margin_px must be non-negative, got {}",
                dz.image_margin_px
            ));
        }
        if self.iou_thresholds.is_empty() {
            return Err("iou_thresholds must not be empty".to_string());
        }
        if let Some(t) = self
            .iou_thresholds
            .iter()
            .chain([&self.overlap_threshold, &self.coverage_threshold])
            .find(|t| !(0.0..=1.0).contains(*t))
        {
            return Err(format!("thresholds must lie in [0, 1], got {}", t));
        }
        Ok(())
    }
}
