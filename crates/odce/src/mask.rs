//! Binary ignore masks and polygon rasterisation.
//!
//! Mask builders produce raw `GrayImage` rasters with `{0, 255}` values.
//! [`IgnoreMask`] is the reduced form the assembler consults: every pixel is
//! either `0` (keep) or `1` (ignore), and layers are merged with a logical OR.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

use crate::overlap::BBox;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors raised while building or combining masks.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskError {
    /// A layer does not match the frame dimensions.
    DimensionMismatch {
        /// Frame dimensions `[width, height]`.
        expected: [u32; 2],
        /// Layer dimensions `[width, height]`.
        got: [u32; 2],
    },
    /// No sampled danger-zone boundary point projected inside the image.
    NoVisibleBoundary {
        /// Number of boundary samples that were projected.
        samples: usize,
    },
}

impl std::fmt::Display for MaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DimensionMismatch { expected, got } => write!(
                f,
                "mask dimension mismatch: expected {}x{}, got {}x{}",
                expected[0], expected[1], got[0], got[1]
            ),
            Self::NoVisibleBoundary { samples } => write!(
                f,
                "danger-zone boundary is not visible: none of {} projected samples fall inside the image",
                samples
            ),
        }
    }
}

impl std::error::Error for MaskError {}

// ── Rasterisation ──────────────────────────────────────────────────────────

/// Fill a closed polygon given by integer pixel vertices.
///
/// Consecutive duplicate vertices and a trailing copy of the first vertex are
/// removed before drawing. An empty polygon draws nothing and a polygon that
/// collapses onto one pixel draws that pixel.
pub fn fill_polygon(raster: &mut GrayImage, vertices: &[[i32; 2]], value: u8) {
    let mut poly: Vec<Point<i32>> = Vec::with_capacity(vertices.len());
    for v in vertices {
        let p = Point::new(v[0], v[1]);
        if poly.last() != Some(&p) {
            poly.push(p);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    match poly.as_slice() {
        [] => {}
        // Every vertex landed on one pixel: draw just that pixel.
        [p] => {
            if let (Ok(x), Ok(y)) = (u32::try_from(p.x), u32::try_from(p.y)) {
                if x < raster.width() && y < raster.height() {
                    raster.put_pixel(x, y, Luma([value]));
                }
            }
        }
        _ => draw_polygon_mut(raster, &poly, Luma([value])),
    }
}

/// Reduce a raster in place so that every non-zero pixel becomes `1`.
pub fn clamp_to_binary(raster: &mut GrayImage) {
    for p in raster.pixels_mut() {
        p.0[0] = u8::from(p.0[0] > 0);
    }
}

fn check_dimensions(expected: (u32, u32), layer: &GrayImage) -> Result<(), MaskError> {
    if layer.dimensions() != expected {
        return Err(MaskError::DimensionMismatch {
            expected: [expected.0, expected.1],
            got: [layer.width(), layer.height()],
        });
    }
    Ok(())
}

// ── IgnoreMask ─────────────────────────────────────────────────────────────

/// Per-frame `{0, 1}` mask: `1` marks pixels excluded from scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct IgnoreMask {
    raster: GrayImage,
}

impl IgnoreMask {
    /// Mask with every pixel kept.
    pub fn keep_all(width: u32, height: u32) -> Self {
        Self {
            raster: GrayImage::new(width, height),
        }
    }

    /// Mask with every pixel ignored.
    pub fn ignore_all(width: u32, height: u32) -> Self {
        Self {
            raster: GrayImage::from_pixel(width, height, Luma([1])),
        }
    }

    /// Wrap a raw raster, reducing its values to `{0, 1}`.
    pub fn from_raster(mut raster: GrayImage) -> Self {
        clamp_to_binary(&mut raster);
        Self { raster }
    }

    /// OR a raw layer into the mask. The layer may hold any values; the
    /// result stays binary.
    pub fn combine(&mut self, layer: &GrayImage) -> Result<(), MaskError> {
        check_dimensions(self.raster.dimensions(), layer)?;
        for (dst, src) in self.raster.pixels_mut().zip(layer.pixels()) {
            dst.0[0] = u8::from(dst.0[0] > 0 || src.0[0] > 0);
        }
        Ok(())
    }

    /// Mark the pixel region of `bbox` as ignored.
    pub fn ignore_region(&mut self, bbox: &BBox) {
        let (w, h) = self.raster.dimensions();
        let Some(r) = bbox.pixel_region(w, h) else {
            return;
        };
        for y in r.y0..r.y1 {
            for x in r.x0..r.x1 {
                self.raster.put_pixel(x, y, Luma([1]));
            }
        }
    }

    /// Number of ignored pixels inside the (clipped) pixel region of `bbox`.
    pub fn ignored_pixels_in(&self, bbox: &BBox) -> u64 {
        let (w, h) = self.raster.dimensions();
        let Some(r) = bbox.pixel_region(w, h) else {
            return 0;
        };
        let mut sum = 0u64;
        for y in r.y0..r.y1 {
            for x in r.x0..r.x1 {
                sum += u64::from(self.raster.get_pixel(x, y).0[0]);
            }
        }
        sum
    }

    pub fn is_ignored(&self, x: u32, y: u32) -> bool {
        self.raster.get_pixel(x, y).0[0] != 0
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// Total number of ignored pixels.
    pub fn ignored_count(&self) -> u64 {
        self.raster.pixels().map(|p| u64::from(p.0[0])).sum()
    }

    /// Borrow the underlying `{0, 1}` raster.
    pub fn as_raster(&self) -> &GrayImage {
        &self.raster
    }

    /// Render as a viewable image (`0` keep -> black, `1` ignore -> white).
    pub fn to_visual(&self) -> GrayImage {
        let mut out = self.raster.clone();
        for p in out.pixels_mut() {
            p.0[0] = if p.0[0] > 0 { 255 } else { 0 };
        }
        out
    }
}
