//! Mask-guided blend of the pixelated image over the original.

use crate::mask::Mask;
use crate::pipeline::PipelineError;
use image::RgbaImage;

/// Blend `pixelated` over `base` using `mask` as the stencil.
///
/// Per channel: `pixelated * m + base * (1 - m)`. Where `m` is 0 the base pixel
/// is copied bit for bit, where it is 1 the pixelated pixel is.
///
/// Fails with [`PipelineError::InvalidCompositeResult`] when the three inputs
/// disagree on dimensions, and [`PipelineError::InvalidRasterization`] if the
/// blended samples cannot be assembled into an image buffer.
pub fn composite(
    base: &RgbaImage,
    pixelated: &RgbaImage,
    mask: &Mask,
) -> Result<RgbaImage, PipelineError> {
    let (width, height) = base.dimensions();
    if pixelated.dimensions() != (width, height)
        || (mask.width(), mask.height()) != (width, height)
    {
        tracing::warn!(
            base = ?(width, height),
            pixelated = ?pixelated.dimensions(),
            mask = ?(mask.width(), mask.height()),
            "composite inputs disagree on size"
        );
        return Err(PipelineError::InvalidCompositeResult);
    }

    let mut samples = Vec::with_capacity(base.as_raw().len());
    for ((b, p), &m) in base
        .pixels()
        .zip(pixelated.pixels())
        .zip(mask.values().iter())
    {
        if m <= 0.0 {
            samples.extend_from_slice(&b.0);
        } else if m >= 1.0 {
            samples.extend_from_slice(&p.0);
        } else {
            for c in 0..4 {
                let v = p.0[c] as f32 * m + b.0[c] as f32 * (1.0 - m);
                samples.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
    }

    RgbaImage::from_raw(width, height, samples).ok_or(PipelineError::InvalidRasterization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn noise(width: u32, height: u32, seed: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503) ^ seed) as u8;
            Rgba([v, v.wrapping_add(80), v.wrapping_mul(3), 255])
        })
    }

    #[test]
    fn test_zero_mask_returns_base() {
        let base = noise(32, 24, 1);
        let pix = noise(32, 24, 99);
        let out = composite(&base, &pix, &Mask::clear(32, 24)).unwrap();
        assert_eq!(out, base);
    }

    #[test]
    fn test_full_mask_returns_pixelated() {
        let base = noise(32, 24, 1);
        let pix = noise(32, 24, 99);
        let out = composite(&base, &pix, &Mask::filled(32, 24, 1.0)).unwrap();
        assert_eq!(out, pix);
    }

    #[test]
    fn test_half_mask_blends_linearly() {
        let base = RgbaImage::from_pixel(2, 2, Rgba([0, 100, 200, 255]));
        let pix = RgbaImage::from_pixel(2, 2, Rgba([100, 200, 0, 255]));
        let out = composite(&base, &pix, &Mask::filled(2, 2, 0.5)).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [50, 150, 100, 255]);
    }

    #[test]
    fn test_size_mismatch_is_invalid_composite() {
        let base = noise(10, 10, 1);
        let pix = noise(10, 11, 2);
        let result = composite(&base, &pix, &Mask::clear(10, 10));
        assert!(matches!(result, Err(PipelineError::InvalidCompositeResult)));

        let pix = noise(10, 10, 2);
        let result = composite(&base, &pix, &Mask::clear(9, 10));
        assert!(matches!(result, Err(PipelineError::InvalidCompositeResult)));
    }
}
