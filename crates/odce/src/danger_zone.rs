//! Ignore mask for the danger zone around the vehicle.
//!
//! The danger zone is a circle of fixed radius on the sea plane, centered on
//! the camera. Points sampled along the visible part of its boundary are
//! projected into the image; the polygon they form together with the bottom
//! image strip is the area of interest (`0`), the rest is ignored (`255`).

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::mask::{fill_polygon, MaskError};
use crate::plane::SeaPlane;

/// Geometry of the danger zone and of its boundary sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DangerZoneParams {
    /// Danger-zone radius, in meters.
    pub range_m: f64,
    /// Assumed camera height above the sea plane, in meters.
    pub camera_height_m: f64,
    /// Horizontal angle spanned by the boundary samples, in degrees.
    ///
    /// Wider than the real camera field of view so that at least one sample
    /// lands beyond each image border.
    pub camera_fov_deg: f64,
    /// Tolerance around the image borders when keeping projected samples, in pixels.
    pub image_margin_px: f64,
}

impl Default for DangerZoneParams {
    fn default() -> Self {
        Self {
            range_m: 15.0,
            camera_height_m: 1.0,
            camera_fov_deg: 80.0,
            image_margin_px: 10.0,
        }
    }
}

impl DangerZoneParams {
    /// Number of boundary samples (about two per degree).
    pub fn num_samples(&self) -> usize {
        (self.camera_fov_deg.ceil().max(0.0) as usize) * 2
    }

    /// Sample angles in degrees, evenly spanning `90 +/- fov/2` inclusive.
    pub fn sample_angles_deg(&self) -> Vec<f64> {
        let n = self.num_samples();
        let start = 90.0 - self.camera_fov_deg / 2.0;
        let stop = 90.0 + self.camera_fov_deg / 2.0;
        match n {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (stop - start) / (n - 1) as f64;
                (0..n).map(|i| start + step * i as f64).collect()
            }
        }
    }
}

/// Boundary samples on the estimated sea plane, in camera coordinates
/// (X right, Y down, Z forward).
pub fn boundary_points(roll_deg: f64, pitch_deg: f64, params: &DangerZoneParams) -> Vec<[f64; 3]> {
    let plane = SeaPlane::from_attitude(roll_deg, pitch_deg, params.camera_height_m);
    params
        .sample_angles_deg()
        .into_iter()
        .map(|deg| {
            let r = deg.to_radians();
            let x = params.range_m * r.sin();
            let y = params.range_m * r.cos();
            let z = plane.height_at(x, y);
            // Vehicle (forward, left, up) -> camera (right, down, forward).
            [-y, -z, x]
        })
        .collect()
}

/// Closed danger-zone polygon in integer pixel coordinates.
///
/// The polygon starts and ends at the bottom-left corner `(0, height)`,
/// climbs to the first visible boundary sample, follows the boundary and
/// returns along the right border and the bottom edge.
pub fn danger_zone_polygon(
    roll_deg: f64,
    pitch_deg: f64,
    camera: &CameraModel,
    width: u32,
    height: u32,
    params: &DangerZoneParams,
) -> Result<Vec<[i32; 2]>, MaskError> {
    let points = boundary_points(roll_deg, pitch_deg, params);
    let projected = camera.project_points(&points);

    let margin = params.image_margin_px;
    let (w, h) = (f64::from(width), f64::from(height));
    let visible: Vec<[i32; 2]> = projected
        .iter()
        .filter(|p| (-margin..=w + margin).contains(&p[0]))
        .filter(|p| (-margin..=h + margin).contains(&p[1]))
        .map(|p| [p[0] as i32, p[1] as i32])
        .collect();

    let (Some(first), Some(last)) = (visible.first(), visible.last()) else {
        return Err(MaskError::NoVisibleBoundary {
            samples: points.len(),
        });
    };

    let (wi, hi) = (width as i32, height as i32);
    let mut polygon = Vec::with_capacity(visible.len() + 5);
    polygon.push([0, hi]);
    polygon.push([0, first[1]]);
    polygon.extend_from_slice(&visible);
    polygon.push([wi, last[1]]);
    polygon.push([wi, hi]);
    polygon.push([0, hi]);

    tracing::trace!(
        "danger-zone polygon: {}/{} boundary samples visible",
        visible.len(),
        points.len()
    );
    Ok(polygon)
}

/// Build the danger-zone raster: `0` inside the zone, `255` outside.
///
/// Fails with [`MaskError::NoVisibleBoundary`] when no boundary sample
/// projects inside the (margin-extended) image.
pub fn build_danger_zone_mask(
    roll_deg: f64,
    pitch_deg: f64,
    camera: &CameraModel,
    width: u32,
    height: u32,
    params: &DangerZoneParams,
) -> Result<GrayImage, MaskError> {
    let polygon = danger_zone_polygon(roll_deg, pitch_deg, camera, width, height, params)?;
    let mut raster = GrayImage::from_pixel(width, height, Luma([255]));
    fill_polygon(&mut raster, &polygon, 0);
    Ok(raster)
}
