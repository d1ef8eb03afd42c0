//! Region mask builder — one feathered disk per region, unioned by maximum.
//!
//! Each region contributes a disk inscribed in its rectangle: fully on out to
//! `min(width, height) / K`, then a one-pixel linear falloff to zero. Disks are
//! evaluated at pixel centers in filter space and cropped to the canvas.

use crate::coords;
use crate::pipeline::PipelineError;
use crate::types::Region;
use image::{GrayImage, Luma};

/// Width of the linear falloff ring at a disk's edge, in pixels.
const FEATHER_WIDTH: f32 = 1.0;

/// Radius divisor for automatically detected faces.
const DETECTED_RADIUS_DIVISOR: f32 = 1.5;

/// Radius divisor for manually placed regions.
const MANUAL_RADIUS_DIVISOR: f32 = 1.8;

/// Feather profile: picks the radius divisor `K` for a region's disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feather {
    /// Regions produced by a face detector (`K = 1.5`).
    Detected,
    /// Regions placed by hand with an overlay (`K = 1.8`).
    Manual,
}

impl Feather {
    pub fn radius_divisor(self) -> f32 {
        match self {
            Feather::Detected => DETECTED_RADIUS_DIVISOR,
            Feather::Manual => MANUAL_RADIUS_DIVISOR,
        }
    }
}

/// Single-channel coverage plane, values in [0, 1], rows stored top-down.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl Mask {
    /// All-zero mask (preserve everything).
    pub fn clear(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    /// Mask with every pixel set to `value` (clamped to [0, 1]).
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value.clamp(0.0, 1.0); width as usize * height as usize],
        }
    }

    /// Feathered disk for one region, cropped to a `width × height` canvas.
    ///
    /// The region may be in any coordinate space; it is brought into filter
    /// space first. Zero-area regions produce an all-zero mask.
    pub fn disk(region: Region, width: u32, height: u32, feather: Feather) -> Self {
        let mut mask = Self::clear(width, height);
        let region = coords::to_filter(region, width as f32, height as f32);
        if region.is_empty() || width == 0 || height == 0 {
            return mask;
        }

        let (cx, cy) = region.center();
        let inner = region.width.min(region.height) / feather.radius_divisor();
        let outer = inner + FEATHER_WIDTH;

        // Only pixels whose centers can fall inside `outer` are visited.
        let canvas_h = height as f32;
        let col_lo = (cx - outer - 0.5).floor().max(0.0) as u32;
        let col_hi = ((cx + outer + 0.5).ceil().max(0.0) as u32).min(width);
        // Filter y of a row's pixel centers is `canvas_h - row - 0.5`.
        let row_lo = ((canvas_h - cy - outer - 0.5).floor().max(0.0)) as u32;
        let row_hi = (((canvas_h - cy + outer + 0.5).ceil()).max(0.0) as u32).min(height);

        for row in row_lo..row_hi {
            let fy = canvas_h - row as f32 - 0.5;
            for col in col_lo..col_hi {
                let fx = col as f32 + 0.5;
                let d = ((fx - cx).powi(2) + (fy - cy).powi(2)).sqrt();
                let v = falloff(d, inner, outer);
                if v > 0.0 {
                    mask.values[row as usize * width as usize + col as usize] = v;
                }
            }
        }

        mask
    }

    /// Per-pixel maximum of two masks of the same size.
    ///
    /// Commutative and idempotent. Both masks must cover the same canvas.
    pub fn union(&self, other: &Mask) -> Mask {
        let mut out = self.clone();
        out.union_in_place(other);
        out
    }

    fn union_in_place(&mut self, other: &Mask) {
        debug_assert_eq!(
            (self.width, self.height),
            (other.width, other.height),
            "masks of different canvas sizes"
        );
        for (a, &b) in self.values.iter_mut().zip(other.values.iter()) {
            *a = a.max(b);
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Coverage at column `x`, row `y` (top-down).
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[(y * self.width + x) as usize]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Fraction of pixels with any coverage.
    pub fn coverage(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().filter(|&&v| v > 0.0).count() as f32 / self.values.len() as f32
    }

    /// Render as an 8-bit grayscale image (0 = keep, 255 = replace).
    pub fn to_luma8(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([(self.get(x, y) * 255.0).round().clamp(0.0, 255.0) as u8])
        })
    }
}

/// Radial profile: 1 inside `inner`, linear down to 0 at `outer`, 0 beyond.
fn falloff(d: f32, inner: f32, outer: f32) -> f32 {
    if d <= inner {
        1.0
    } else if d >= outer {
        0.0
    } else {
        (outer - d) / (outer - inner)
    }
}

/// Build the union mask of all `regions` over a `width × height` canvas.
///
/// Returns [`PipelineError::InvalidMasking`] for an empty region list; "no
/// regions" is a pass-through case for the caller, never a blank mask.
pub fn build_mask(
    regions: &[Region],
    width: u32,
    height: u32,
    feather: Feather,
) -> Result<Mask, PipelineError> {
    let mut running: Option<Mask> = None;

    for region in regions {
        let disk = Mask::disk(*region, width, height, feather);
        running = Some(match running {
            None => disk,
            Some(mut mask) => {
                mask.union_in_place(&disk);
                mask
            }
        });
    }

    let mask = running.ok_or(PipelineError::InvalidMasking)?;
    tracing::debug!(
        regions = regions.len(),
        width,
        height,
        coverage = mask.coverage(),
        "built union mask"
    );
    Ok(mask)
}
