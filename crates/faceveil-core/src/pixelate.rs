//! Full-image pixelation by square-block averaging.

use image::{Rgba, RgbaImage};

/// Blocks per longest image side. Ties block coarseness to resolution so a
/// face covers roughly the same number of blocks at any source size.
const BLOCKS_PER_LONG_SIDE: f32 = 60.0;

/// Block edge length in pixels for an image of the given size.
pub fn block_size(width: u32, height: u32) -> f32 {
    width.max(height) as f32 / BLOCKS_PER_LONG_SIDE
}

/// Pixelate the whole image.
///
/// Blocks are `max(width, height) / 60` pixels square (never below one pixel),
/// anchored at the top-left corner; each is filled with the rounded
/// per-channel average of the pixels it covers. A constant image is returned
/// unchanged.
pub fn pixelate(image: &RgbaImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    let block = block_size(width, height).max(1.0);
    pixelate_with_block(image, block)
}

fn pixelate_with_block(image: &RgbaImage, block: f32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let cols = (width as f32 / block).ceil() as usize;
    let rows = (height as f32 / block).ceil() as usize;
    let cell = |x: u32, y: u32| -> usize {
        let cx = ((x as f32 / block) as usize).min(cols - 1);
        let cy = ((y as f32 / block) as usize).min(rows - 1);
        cy * cols + cx
    };

    // Pass 1: per-block channel sums.
    let mut sums = vec![[0u64; 4]; cols * rows];
    let mut counts = vec![0u64; cols * rows];
    for (x, y, px) in image.enumerate_pixels() {
        let i = cell(x, y);
        for (c, &v) in px.0.iter().enumerate() {
            sums[i][c] += v as u64;
        }
        counts[i] += 1;
    }

    let averages: Vec<[u8; 4]> = sums
        .iter()
        .zip(counts.iter())
        .map(|(&sum, &n)| {
            if n == 0 {
                return [0; 4];
            }
            // Rounded integer mean.
            sum.map(|s| ((s + n / 2) / n) as u8)
        })
        .collect();

    tracing::debug!(width, height, block, cols, rows, "pixelated image");

    // Pass 2: fill.
    RgbaImage::from_fn(width, height, |x, y| Rgba(averages[cell(x, y)]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    #[test]
    fn test_block_size_formula() {
        assert!((block_size(600, 800) - 800.0 / 60.0).abs() < 1e-6);
        assert!((block_size(1920, 1080) - 32.0).abs() < 1e-6);
        assert!((block_size(30, 10) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_uniform_image_unchanged() {
        for (w, h) in [(1, 1), (7, 3), (120, 90), (600, 800), (61, 1)] {
            let img = RgbaImage::from_pixel(w, h, Rgba([12, 200, 77, 255]));
            assert_eq!(pixelate(&img), img, "{w}x{h}");
        }
    }

    #[test]
    fn test_dimensions_preserved() {
        let img = gradient(123, 45);
        assert_eq!(pixelate(&img).dimensions(), (123, 45));
    }

    #[test]
    fn test_small_image_is_identity() {
        // Longest side under 60 → block clamps to one pixel.
        let img = gradient(40, 20);
        assert_eq!(pixelate(&img), img);
    }

    #[test]
    fn test_blocks_are_flat() {
        // 120x120 → block size 2.0 exactly.
        let img = gradient(120, 120);
        let out = pixelate(&img);
        for by in (0..120).step_by(2) {
            for bx in (0..120).step_by(2) {
                let p = out.get_pixel(bx, by);
                assert_eq!(out.get_pixel(bx + 1, by), p);
                assert_eq!(out.get_pixel(bx, by + 1), p);
                assert_eq!(out.get_pixel(bx + 1, by + 1), p);
            }
        }
    }

    #[test]
    fn test_block_value_is_rounded_average() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([10, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([11, 0, 0, 255]));
        let out = pixelate_with_block(&img, 2.0);
        // (10 + 11 + 0 + 0) / 4 = 5.25 → 5
        assert_eq!(out.get_pixel(1, 1).0, [5, 0, 0, 255]);
    }

    #[test]
    fn test_fractional_block_covers_edges() {
        // 600x800 → block 13.33; the last partial column/row must still be filled
        // from its own pixels.
        let img = gradient(600, 800);
        let out = pixelate(&img);
        let p = out.get_pixel(599, 799);
        assert_eq!(out.get_pixel(598, 798), p);
    }
}
