//! Sea-plane estimate from vehicle attitude.
//!
//! The plane lives in the vehicle frame (X forward, Y left, Z up) with the
//! origin moved to the camera's optical center.

use nalgebra::{Rotation3, Vector3, Vector4};

/// Plane `A x + B y + C z + D = 0`, stored with a unit-norm coefficient vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeaPlane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl SeaPlane {
    /// Estimate the sea plane from IMU roll/pitch (degrees, sensor sign
    /// convention) and the assumed camera height above the water.
    pub fn from_attitude(roll_deg: f64, pitch_deg: f64, camera_height: f64) -> Self {
        // Measured attitude -> tilt of the plane relative to the camera.
        let roll = (-roll_deg).to_radians();
        let pitch = (-pitch_deg).to_radians();

        let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), roll);
        let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), pitch);
        let n = rx * ry * Vector3::z();

        let coeffs = Vector4::new(n.x, n.y, n.z, camera_height).normalize();
        Self {
            a: coeffs.x,
            b: coeffs.y,
            c: coeffs.z,
            d: coeffs.w,
        }
    }

    /// Height `z` of the plane above the horizontal point `(x, y)`.
    ///
    /// Undefined (non-finite) for a vertical plane, which attitude angles
    /// below 90 degrees never produce.
    pub fn height_at(&self, x: f64, y: f64) -> f64 {
        -(self.a * x + self.b * y + self.d) / self.c
    }

    pub fn coefficients(&self) -> [f64; 4] {
        [self.a, self.b, self.c, self.d]
    }
}
