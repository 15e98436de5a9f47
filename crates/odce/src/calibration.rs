//! Stereo camera calibration files.
//!
//! Calibration is stored as an OpenCV FileStorage YAML document. Only the
//! subset written by stereo calibration tools is understood: top-level
//! `!!opencv-matrix` nodes (`rows`, `cols`, `dt`, flow-sequence `data`) and
//! plain number sequences such as `imageSize`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nalgebra::Matrix3;

use crate::camera::{CameraIntrinsics, CameraModel, RadialTangentialDistortion};

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors raised while loading a calibration file.
#[derive(Debug)]
pub enum CalibrationError {
    /// The file could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A required key is absent.
    MissingKey { key: String },
    /// A node could not be parsed.
    MalformedNode { key: String, reason: String },
    /// A matrix node has an unexpected shape.
    BadShape {
        key: String,
        expected: &'static str,
        rows: usize,
        cols: usize,
    },
    /// `imageSize` is not a pair of positive integers.
    BadImageSize { values: Vec<f64> },
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "cannot read calibration {}: {}", path.display(), source)
            }
            Self::MissingKey { key } => write!(f, "calibration key `{}` is missing", key),
            Self::MalformedNode { key, reason } => {
                write!(f, "calibration key `{}` is malformed: {}", key, reason)
            }
            Self::BadShape {
                key,
                expected,
                rows,
                cols,
            } => write!(
                f,
                "calibration matrix `{}` is {}x{}, expected {}",
                key, rows, cols, expected
            ),
            Self::BadImageSize { values } => {
                write!(f, "calibration imageSize {:?} is not a positive pair", values)
            }
        }
    }
}

impl std::error::Error for CalibrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ── Calibration ────────────────────────────────────────────────────────────

/// Calibration of a stereo rig. Only the left camera (`M1`, `D1`) and the
/// declared image size are required.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoCalibration {
    /// Left camera matrix.
    pub m1: Matrix3<f64>,
    /// Left distortion coefficients `(k1, k2, p1, p2[, k3])`.
    pub d1: Vec<f64>,
    pub m2: Option<Matrix3<f64>>,
    pub d2: Option<Vec<f64>>,
    /// Rotation from the left to the right camera.
    pub r: Option<Matrix3<f64>>,
    /// Translation from the left to the right camera.
    pub t: Option<Vec<f64>>,
    /// Declared image size `[width, height]`.
    pub image_size: [u32; 2],
}

impl StereoCalibration {
    /// Load and validate a calibration file.
    pub fn from_file(path: &Path) -> Result<Self, CalibrationError> {
        let text = std::fs::read_to_string(path).map_err(|source| CalibrationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let calib = Self::parse(&text)?;
        tracing::debug!(
            "loaded calibration {} ({}x{})",
            path.display(),
            calib.image_size[0],
            calib.image_size[1]
        );
        Ok(calib)
    }

    /// Parse calibration YAML text.
    pub fn parse(text: &str) -> Result<Self, CalibrationError> {
        let nodes = split_top_level(text);
        let matrix = |key: &'static str| -> Result<Option<MatrixNode>, CalibrationError> {
            nodes
                .get(key)
                .map(|body| parse_matrix(key, body))
                .transpose()
        };

        let m1 = require("M1", matrix("M1")?)?.into_matrix3("M1")?;
        let d1 = require("D1", matrix("D1")?)?.into_vector("D1")?;
        let m2 = matrix("M2")?.map(|m| m.into_matrix3("M2")).transpose()?;
        let d2 = matrix("D2")?.map(|m| m.into_vector("D2")).transpose()?;
        let r = matrix("R")?.map(|m| m.into_matrix3("R")).transpose()?;
        let t = matrix("T")?.map(|m| m.into_vector("T")).transpose()?;

        let size_body = require("imageSize", nodes.get("imageSize"))?;
        let image_size = parse_image_size(size_body)?;

        let calib = Self {
            m1,
            d1,
            m2,
            d2,
            r,
            t,
            image_size,
        };
        calib.camera_model()?;
        Ok(calib)
    }

    /// Left camera model used for danger-zone projection.
    pub fn camera_model(&self) -> Result<CameraModel, CalibrationError> {
        let intrinsics = CameraIntrinsics::from_matrix(&self.m1);
        if !intrinsics.is_valid() {
            return Err(CalibrationError::MalformedNode {
                key: "M1".to_string(),
                reason: "focal lengths must be finite and non-zero".to_string(),
            });
        }
        let distortion = RadialTangentialDistortion::from_coefficients(&self.d1).ok_or_else(
            || CalibrationError::MalformedNode {
                key: "D1".to_string(),
                reason: format!("expected 4 or 5 coefficients, got {}", self.d1.len()),
            },
        )?;
        Ok(CameraModel {
            intrinsics,
            distortion,
        })
    }

    pub fn width(&self) -> u32 {
        self.image_size[0]
    }

    pub fn height(&self) -> u32 {
        self.image_size[1]
    }
}

// ── FileStorage YAML subset ────────────────────────────────────────────────

struct MatrixNode {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl MatrixNode {
    fn into_matrix3(self, key: &str) -> Result<Matrix3<f64>, CalibrationError> {
        if self.rows != 3 || self.cols != 3 {
            return Err(CalibrationError::BadShape {
                key: key.to_string(),
                expected: "3x3",
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(Matrix3::from_row_slice(&self.data))
    }

    fn into_vector(self, key: &str) -> Result<Vec<f64>, CalibrationError> {
        if self.rows != 1 && self.cols != 1 {
            return Err(CalibrationError::BadShape {
                key: key.to_string(),
                expected: "a row or column vector",
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(self.data)
    }
}

/// Group the document into top-level `key -> body` entries. The body holds
/// the remainder of the key line followed by its indented continuation lines.
fn split_top_level(text: &str) -> BTreeMap<String, String> {
    let mut nodes = BTreeMap::new();
    let mut current: Option<(String, String)> = None;
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with('%') || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with("---") || trimmed.starts_with("...") {
            continue;
        }
        let indented = line.starts_with(' ') || line.starts_with('\t');
        if !indented {
            if let Some((key, rest)) = trimmed.split_once(':') {
                if let Some((k, body)) = current.take() {
                    nodes.insert(k, body);
                }
                current = Some((key.trim().to_string(), rest.trim().to_string()));
                continue;
            }
        }
        if let Some((_, body)) = current.as_mut() {
            body.push('\n');
            body.push_str(trimmed.trim_start());
        }
    }
    if let Some((k, body)) = current {
        nodes.insert(k, body);
    }
    nodes
}

fn require<T>(key: &str, node: Option<T>) -> Result<T, CalibrationError> {
    node.ok_or_else(|| CalibrationError::MissingKey {
        key: key.to_string(),
    })
}

fn malformed(key: &str, reason: impl Into<String>) -> CalibrationError {
    CalibrationError::MalformedNode {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_matrix(key: &str, body: &str) -> Result<MatrixNode, CalibrationError> {
    if !body.starts_with("!!opencv-matrix") {
        return Err(malformed(key, "not an opencv-matrix node"));
    }
    let mut rows = None;
    let mut cols = None;
    let mut data_text: Option<String> = None;
    // Inside a flow sequence that wraps over several lines.
    let mut in_flow = false;
    for line in body.lines().skip(1) {
        let block_item = line.trim_start().starts_with('-');
        if in_flow || block_item {
            if let Some(text) = data_text.as_mut() {
                text.push(' ');
                text.push_str(line);
                in_flow = in_flow && !line.contains(']');
                continue;
            }
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        match field.trim() {
            "rows" => rows = value.trim().parse::<usize>().ok(),
            "cols" => cols = value.trim().parse::<usize>().ok(),
            "data" => {
                in_flow = value.contains('[') && !value.contains(']');
                data_text = Some(value.to_string());
            }
            _ => {}
        }
    }
    let rows = rows.ok_or_else(|| malformed(key, "missing or invalid `rows`"))?;
    let cols = cols.ok_or_else(|| malformed(key, "missing or invalid `cols`"))?;
    let data_text = data_text.ok_or_else(|| malformed(key, "missing `data`"))?;
    let data = parse_number_sequence(key, &data_text)?;
    if data.len() != rows * cols {
        return Err(malformed(
            key,
            format!("{} values for a {}x{} matrix", data.len(), rows, cols),
        ));
    }
    Ok(MatrixNode { rows, cols, data })
}

/// Numbers of a flow sequence (`[a, b, ...]`) or a block sequence (`- a`).
fn parse_number_sequence(key: &str, text: &str) -> Result<Vec<f64>, CalibrationError> {
    let text = text.trim();
    let inner = if let Some(open) = text.strip_prefix('[') {
        open.rsplit_once(']')
            .map(|(inner, _)| inner)
            .ok_or_else(|| malformed(key, "unterminated sequence"))?
    } else {
        text
    };
    inner
        .split(|c: char| c == ',' || c.is_whitespace())
        // Block sequence items start with a lone `-`.
        .filter(|tok| !tok.is_empty() && *tok != "-")
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| malformed(key, format!("`{}` is not a number", tok)))
        })
        .collect()
}

fn parse_image_size(body: &str) -> Result<[u32; 2], CalibrationError> {
    let values = parse_number_sequence("imageSize", body)?;
    if let [w, h] = values[..] {
        if w >= 1.0 && h >= 1.0 && w.fract() == 0.0 && h.fract() == 0.0 {
            return Ok([w as u32, h as u32]);
        }
    }
    Err(CalibrationError::BadImageSize { values })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "%YAML:1.0
---
M1: !!opencv-matrix
   rows: 3
   cols: 3
   dt: d
   data: [ 1.2e+03, 0., 6.39e+02, 0., 1.21e+03,
       4.79e+02, 0., 0., 1. ]
D1: !!opencv-matrix
   rows: 1
   cols: 5
   dt: d
   data: [ -1.5e-01, 1.e-01, 1.e-03, -2.e-03, 0. ]
M2: !!opencv-matrix
   rows: 3
   cols: 3
   dt: d
   data: [ 1.19e+03, 0., 6.4e+02, 0., 1.19e+03, 4.8e+02, 0., 0., 1. ]
D2: !!opencv-matrix
   rows: 1
   cols: 4
   dt: d
   data: [ 0., 0., 0., 0. ]
R: !!opencv-matrix
   rows: 3
   cols: 3
   dt: d
   data: [ 1., 0., 0., 0., 1., 0., 0., 0., 1. ]
T: !!opencv-matrix
   rows: 3
   cols: 1
   dt: d
   data: [ -2.5e-01, 0., 0. ]
imageSize: [ 1278, 958 ]
";

    #[test]
    fn parses_full_stereo_file() {
        let calib = StereoCalibration::parse(SAMPLE).unwrap();
        assert_eq!(calib.image_size, [1278, 958]);
        assert_eq!(calib.m1[(0, 0)], 1200.0);
        assert_eq!(calib.m1[(1, 2)], 479.0);
        assert_eq!(calib.d1, vec![-0.15, 0.1, 0.001, -0.002, 0.0]);
        assert_eq!(calib.d2.as_deref(), Some(&[0.0; 4][..]));
        assert_eq!(calib.r, Some(Matrix3::identity()));
        assert_eq!(calib.t, Some(vec![-0.25, 0.0, 0.0]));

        let model = calib.camera_model().unwrap();
        assert_eq!(model.intrinsics.fx, 1200.0);
        assert_eq!(model.intrinsics.cx, 639.0);
        assert_eq!(model.distortion.k1, -0.15);
        assert_eq!(model.distortion.p2, -0.002);
    }

    #[test]
    fn optional_nodes_may_be_absent() {
        let text = "%YAML:1.0
---
M1: !!opencv-matrix
   rows: 3
   cols: 3
   dt: d
   data: [ 800., 0., 320., 0., 800., 240., 0., 0., 1. ]
D1: !!opencv-matrix
   rows: 4
   cols: 1
   dt: d
   data: [ 0., 0., 0., 0. ]
imageSize:
   - 640
   - 480
";
        let calib = StereoCalibration::parse(text).unwrap();
        assert_eq!(calib.image_size, [640, 480]);
        assert!(calib.m2.is_none());
        assert!(calib.t.is_none());
        assert_eq!(calib.camera_model().unwrap().distortion.k3, 0.0);
    }

    #[test]
    fn matrix_fields_may_follow_data() {
        let text = "%YAML:1.0
---
M1: !!opencv-matrix
   data: [ 800., 0., 320., 0., 800.,
       240., 0., 0., 1. ]
   dt: d
   rows: 3
   cols: 3
D1: !!opencv-matrix
   dt: d
   data:
      - -0.1
      - 0.
      - 0.
      - 0.
   cols: 4
   rows: 1
imageSize: [ 640, 480 ]
";
        let calib = StereoCalibration::parse(text).unwrap();
        assert_eq!(calib.m1[(1, 2)], 240.0);
        assert_eq!(calib.d1, vec![-0.1, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_left_camera_is_an_error() {
        let text = "%YAML:1.0\n---\nimageSize: [ 10, 10 ]\n";
        match StereoCalibration::parse(text) {
            Err(CalibrationError::MissingKey { key }) => assert_eq!(key, "M1"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn wrong_matrix_shape_is_an_error() {
        let text = SAMPLE.replacen("rows: 3\n   cols: 3", "rows: 1\n   cols: 9", 1);
        assert!(matches!(
            StereoCalibration::parse(&text),
            Err(CalibrationError::BadShape { rows: 1, cols: 9, .. })
        ));
    }

    #[test]
    fn wrong_distortion_length_is_an_error() {
        let text = SAMPLE.replacen(
            "cols: 5\n   dt: d\n   data: [ -1.5e-01, 1.e-01, 1.e-03, -2.e-03, 0. ]",
            "cols: 3\n   dt: d\n   data: [ -1.5e-01, 1.e-01, 1.e-03 ]",
            1,
        );
        assert!(matches!(
            StereoCalibration::parse(&text),
            Err(CalibrationError::MalformedNode { ref key, .. }) if key == "D1"
        ));
    }

    #[test]
    fn bad_image_size_is_an_error() {
        let text = SAMPLE.replace("imageSize: [ 1278, 958 ]", "imageSize: [ 1278 ]");
        assert!(matches!(
            StereoCalibration::parse(&text),
            Err(CalibrationError::BadImageSize { .. })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = StereoCalibration::from_file(Path::new("/nonexistent/calibration-x.yaml"))
            .unwrap_err();
        assert!(err.to_string().contains("calibration-x.yaml"));
    }
}
