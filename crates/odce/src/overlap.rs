//! Axis-aligned box overlap and mask coverage.

use serde::{Deserialize, Serialize};

use crate::mask::IgnoreMask;

/// IoU at or below this value does not count as an overlap.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.3;
/// A box is ignored when strictly more than this fraction of it is masked.
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 0.5;

/// Axis-aligned bounding box `(x, y, w, h)` in pixels.
///
/// Serialized as a flat `[x, y, w, h]` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`, clipped to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// Box rounded to whole pixels (ties to even) as `(x, y, w, h)`.
    fn rounded(&self) -> (i64, i64, i64, i64) {
        (
            self.x.round_ties_even() as i64,
            self.y.round_ties_even() as i64,
            self.w.round_ties_even() as i64,
            self.h.round_ties_even() as i64,
        )
    }

    /// Pixel area of the rounded box, before clipping.
    pub fn pixel_area(&self) -> i64 {
        let (_, _, w, h) = self.rounded();
        w * h
    }

    /// Rounded pixel rectangle clipped to a `width x height` image, or `None`
    /// when nothing of the box lies inside.
    pub fn pixel_region(&self, width: u32, height: u32) -> Option<PixelRegion> {
        let (x, y, w, h) = self.rounded();
        let clip = |v: i64, hi: u32| v.clamp(0, i64::from(hi)) as u32;
        let region = PixelRegion {
            x0: clip(x, width),
            y0: clip(y, height),
            x1: clip(x + w, width),
            y1: clip(y + h, height),
        };
        if region.x1 <= region.x0 || region.y1 <= region.y0 {
            return None;
        }
        Some(region)
    }
}

/// Intersection-over-union of two boxes, always in `[0, 1]`.
///
/// Disjoint boxes and degenerate (zero-union) pairs give `0`.
pub fn iou(a: &BBox, b: &BBox) -> f64 {
    let x_left = a.x.max(b.x);
    let y_top = a.y.max(b.y);
    let x_right = a.right().min(b.right());
    let y_bottom = a.bottom().min(b.bottom());

    if x_right < x_left || y_bottom < y_top {
        return 0.0;
    }

    let intersection = (x_right - x_left) * (y_bottom - y_top);
    let union = a.area() + b.area() - intersection;
    if !union.is_finite() || union <= 0.0 {
        return 0.0;
    }

    let v = intersection / union;
    debug_assert!(
        (0.0..=1.0 + 1e-12).contains(&v),
        "IoU out of range: {v} for {a:?} / {b:?}"
    );
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// IoU of `bbox` against each of `others`; values at or below `threshold`
/// are reported as `0`.
pub fn iou_overlaps<'a, I>(bbox: &BBox, others: I, threshold: f64) -> Vec<f64>
where
    I: IntoIterator<Item = &'a BBox>,
{
    others
        .into_iter()
        .map(|o| {
            let v = iou(bbox, o);
            if v > threshold {
                v
            } else {
                0.0
            }
        })
        .collect()
}

/// `true` when `bbox` overlaps any of `others` by more than `threshold`.
pub fn overlaps_any<'a, I>(bbox: &BBox, others: I, threshold: f64) -> bool
where
    I: IntoIterator<Item = &'a BBox>,
{
    iou_overlaps(bbox, others, threshold)
        .iter()
        .any(|&v| v != 0.0)
}

/// Fraction of the rounded box area covered by ignored mask pixels.
///
/// The denominator is the full rounded box area, so parts of the box outside
/// the image count as not ignored. Zero-area boxes give `0`.
pub fn mask_coverage(mask: &IgnoreMask, bbox: &BBox) -> f64 {
    let area = bbox.pixel_area();
    if area <= 0 {
        return 0.0;
    }
    mask.ignored_pixels_in(bbox) as f64 / area as f64
}

/// `true` when strictly more than `threshold` of the box lies in the ignore
/// region.
pub fn bbox_in_mask(mask: &IgnoreMask, bbox: &BBox, threshold: f64) -> bool {
    mask_coverage(mask, bbox) > threshold
}
