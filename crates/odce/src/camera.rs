//! Camera intrinsics and radial-tangential distortion model.
//!
//! Only forward projection is needed here: sampled 3-D points on the sea plane
//! are pushed through the calibrated model of the left camera to obtain pixel
//! coordinates. The pose is always identity (points are already expressed in
//! the camera frame).

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Extract intrinsics from a 3x3 camera matrix `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    ///
    /// Skew is ignored.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    /// Returns `true` when focal lengths are finite and non-zero.
    pub fn is_valid(self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    /// Convert normalized pinhole coordinates to pixel coordinates.
    pub fn normalized_to_pixel(self, normalized_xy: [f64; 2]) -> [f64; 2] {
        [
            self.fx * normalized_xy[0] + self.cx,
            self.fy * normalized_xy[1] + self.cy,
        ]
    }
}

/// Brown-Conrady radial-tangential distortion coefficients.
///
/// Coefficient order follows the usual calibration vector layout
/// `(k1, k2, p1, p2[, k3])`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RadialTangentialDistortion {
    /// Radial coefficient k1.
    pub k1: f64,
    /// Radial coefficient k2.
    pub k2: f64,
    /// Tangential coefficient p1.
    pub p1: f64,
    /// Tangential coefficient p2.
    pub p2: f64,
    /// Radial coefficient k3.
    pub k3: f64,
}

impl RadialTangentialDistortion {
    /// Build from a flat coefficient vector of length 4 or 5.
    ///
    /// Returns `None` for any other length.
    pub fn from_coefficients(coeffs: &[f64]) -> Option<Self> {
        match *coeffs {
            [k1, k2, p1, p2] => Some(Self {
                k1,
                k2,
                p1,
                p2,
                k3: 0.0,
            }),
            [k1, k2, p1, p2, k3] => Some(Self { k1, k2, p1, p2, k3 }),
            _ => None,
        }
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort_normalized(self, normalized_xy: [f64; 2]) -> [f64; 2] {
        let x = normalized_xy[0];
        let y = normalized_xy[1];
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        [x * radial + x_tan, y * radial + y_tan]
    }
}

/// Complete camera model (intrinsics + radial-tangential distortion).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    /// Camera intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// Distortion coefficients.
    pub distortion: RadialTangentialDistortion,
}

impl CameraModel {
    /// Project a point given in camera coordinates (X right, Y down, Z forward)
    /// into distorted image pixel coordinates.
    ///
    /// A point on the `Z = 0` plane is divided by one instead of zero, matching
    /// the usual projection routine convention. Returns `None` when the
    /// result is not finite.
    pub fn project_point(self, camera_xyz: [f64; 3]) -> Option<[f64; 2]> {
        let [x, y, z] = camera_xyz;
        let inv_z = if z != 0.0 { 1.0 / z } else { 1.0 };
        let xd = self.distortion.distort_normalized([x * inv_z, y * inv_z]);
        let pix = self.intrinsics.normalized_to_pixel(xd);
        if pix[0].is_finite() && pix[1].is_finite() {
            Some(pix)
        } else {
            None
        }
    }

    /// Project a batch of camera-frame points, dropping non-finite results.
    pub fn project_points(self, points: &[[f64; 3]]) -> Vec<[f64; 2]> {
        points
            .iter()
            .filter_map(|p| self.project_point(*p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_camera() -> CameraModel {
        CameraModel {
            intrinsics: CameraIntrinsics {
                fx: 900.0,
                fy: 920.0,
                cx: 640.0,
                cy: 480.0,
            },
            distortion: RadialTangentialDistortion {
                k1: -0.12,
                k2: 0.03,
                p1: 0.001,
                p2: -0.0008,
                k3: 0.0,
            },
        }
    }

    #[test]
    fn intrinsics_validation_rejects_zero_focal() {
        let k = CameraIntrinsics {
            fx: 0.0,
            fy: 500.0,
            cx: 0.0,
            cy: 0.0,
        };
        assert!(!k.is_valid());
    }

    #[test]
    fn intrinsics_from_matrix_reads_focal_and_principal_point() {
        let m = Matrix3::new(800.0, 0.0, 639.5, 0.0, 810.0, 478.0, 0.0, 0.0, 1.0);
        let k = CameraIntrinsics::from_matrix(&m);
        assert_eq!(k.fx, 800.0);
        assert_eq!(k.fy, 810.0);
        assert_eq!(k.cx, 639.5);
        assert_eq!(k.cy, 478.0);
    }

    #[test]
    fn distortion_from_coefficients_accepts_four_or_five() {
        let d4 = RadialTangentialDistortion::from_coefficients(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(d4.k3, 0.0);
        let d5 =
            RadialTangentialDistortion::from_coefficients(&[0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
        assert_eq!(d5.k3, 0.5);
        assert!(RadialTangentialDistortion::from_coefficients(&[0.1; 8]).is_none());
        assert!(RadialTangentialDistortion::from_coefficients(&[]).is_none());
    }

    #[test]
    fn zero_distortion_projection_is_pinhole() {
        let cam = CameraModel {
            distortion: RadialTangentialDistortion::default(),
            ..sample_camera()
        };
        let p = cam.project_point([1.0, -0.5, 10.0]).unwrap();
        assert_relative_eq!(p[0], 640.0 + 90.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 480.0 - 46.0, epsilon = 1e-9);
    }

    #[test]
    fn optical_axis_projects_to_principal_point() {
        let cam = sample_camera();
        let p = cam.project_point([0.0, 0.0, 5.0]).unwrap();
        assert_relative_eq!(p[0], 640.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 480.0, epsilon = 1e-12);
    }

    #[test]
    fn barrel_distortion_pulls_points_inward() {
        let cam = CameraModel {
            distortion: RadialTangentialDistortion {
                k1: -0.2,
                ..Default::default()
            },
            ..sample_camera()
        };
        let ideal = CameraModel {
            distortion: RadialTangentialDistortion::default(),
            ..cam
        };
        let pt = [3.0, 2.0, 6.0];
        let d = cam.project_point(pt).unwrap();
        let u = ideal.project_point(pt).unwrap();
        assert!((d[0] - 640.0).abs() < (u[0] - 640.0).abs());
        assert!((d[1] - 480.0).abs() < (u[1] - 480.0).abs());
    }

    #[test]
    fn zero_depth_uses_unit_divisor() {
        let cam = CameraModel {
            distortion: RadialTangentialDistortion::default(),
            ..sample_camera()
        };
        let p = cam.project_point([0.1, 0.2, 0.0]).unwrap();
        assert_relative_eq!(p[0], 640.0 + 90.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 480.0 + 184.0, epsilon = 1e-9);
    }
}
