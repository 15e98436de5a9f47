//! Ignore mask from annotated sea-edge polylines.
//!
//! Each polyline is closed up to the top image row and the enclosed region
//! (everything above the water edge) is filled with `255`. Pixels below the
//! edge stay `0`.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::mask::fill_polygon;

/// One annotated sea-edge polyline, as parallel coordinate lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeaEdge {
    #[serde(default)]
    pub x_axis: Vec<f64>,
    #[serde(default)]
    pub y_axis: Vec<f64>,
}

impl SeaEdge {
    pub fn new(x_axis: Vec<f64>, y_axis: Vec<f64>) -> Self {
        Self { x_axis, y_axis }
    }

    pub fn is_empty(&self) -> bool {
        self.x_axis.is_empty() || self.y_axis.is_empty()
    }

    /// Closed polygon: the polyline plus both of its end columns at `y = 0`.
    ///
    /// Returns `None` for an empty curve. Coordinates are truncated to whole
    /// pixels; unequal coordinate lists are paired up to the shorter length.
    pub fn closed_polygon(&self) -> Option<Vec<[i32; 2]>> {
        if self.is_empty() {
            return None;
        }
        if self.x_axis.len() != self.y_axis.len() {
            tracing::warn!(
                "sea edge has {} x and {} y coordinates; pairing the first {}",
                self.x_axis.len(),
                self.y_axis.len(),
                self.x_axis.len().min(self.y_axis.len())
            );
        }
        let curve: Vec<[i32; 2]> = self
            .x_axis
            .iter()
            .zip(&self.y_axis)
            .map(|(&x, &y)| [x as i32, y as i32])
            .collect();
        let first = curve.first()?;
        let last = curve.last()?;

        let mut polygon = Vec::with_capacity(curve.len() + 2);
        polygon.push([first[0], 0]);
        polygon.extend_from_slice(&curve);
        polygon.push([last[0], 0]);
        Some(polygon)
    }
}

/// Build the sea-edge raster: `255` above the annotated edges, `0` below.
///
/// An empty edge list yields an all-zero raster.
pub fn build_sea_edge_mask(edges: &[SeaEdge], width: u32, height: u32) -> GrayImage {
    let mut raster = GrayImage::new(width, height);
    for polygon in edges.iter().filter_map(SeaEdge::closed_polygon) {
        fill_polygon(&mut raster, &polygon, 255);
    }
    raster
}
