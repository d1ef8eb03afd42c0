//! Conversions between normalized detector space, pixel space and filter space.
//!
//! Pixel space and normalized space share a top-left origin. Filter space is
//! pixel-sized but bottom-left origin, so only the vertical axis changes when
//! crossing into it. None of these functions clamp; negative or out-of-canvas
//! coordinates pass straight through.
//!
//! The directed conversions are total: they trust the caller about the input
//! space and never inspect the region's tag. Use [`to_filter`] to dispatch on
//! the tag instead.

use crate::types::{CoordinateSpace, Region};

/// Scale a normalized detector region up to pixel space.
pub fn to_pixel_space(region: Region, canvas_width: f32, canvas_height: f32) -> Region {
    Region::pixel(
        region.x * canvas_width,
        region.y * canvas_height,
        region.width * canvas_width,
        region.height * canvas_height,
    )
}

/// Flip a pixel-space region into filter space.
///
/// `filter_y = canvas_height - pixel_y - height`.
pub fn to_filter_space(region: Region, canvas_height: f32) -> Region {
    Region::filter(
        region.x,
        flip_y(region.y, region.height, canvas_height),
        region.width,
        region.height,
    )
}

/// Flip a filter-space region back into pixel space.
pub fn from_filter_space(region: Region, canvas_height: f32) -> Region {
    Region::pixel(
        region.x,
        flip_y(region.y, region.height, canvas_height),
        region.width,
        region.height,
    )
}

/// Bring a region of any space into filter space for a canvas of the given size.
pub fn to_filter(region: Region, canvas_width: f32, canvas_height: f32) -> Region {
    match region.space {
        CoordinateSpace::NormalizedDetector => to_filter_space(
            to_pixel_space(region, canvas_width, canvas_height),
            canvas_height,
        ),
        CoordinateSpace::Pixel => to_filter_space(region, canvas_height),
        CoordinateSpace::Filter => region,
    }
}

fn flip_y(y: f32, height: f32, canvas_height: f32) -> f32 {
    canvas_height - y - height
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_pixel_space_scales_each_axis() {
        let r = to_pixel_space(Region::normalized(0.4, 0.3, 0.2, 0.15), 600.0, 800.0);
        assert_eq!(r.space, CoordinateSpace::Pixel);
        assert!((r.x - 240.0).abs() < 1e-3);
        assert!((r.y - 240.0).abs() < 1e-3);
        assert!((r.width - 120.0).abs() < 1e-3);
        assert!((r.height - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_to_filter_space_flips_y_only() {
        let r = to_filter_space(Region::pixel(10.0, 20.0, 30.0, 40.0), 100.0);
        assert_eq!(r, Region::filter(10.0, 40.0, 30.0, 40.0));
    }

    #[test]
    fn test_flip_roundtrip_is_identity() {
        let cases = [
            Region::pixel(0.0, 0.0, 10.0, 10.0),
            Region::pixel(13.5, 77.25, 4.0, 19.0),
            Region::pixel(-5.0, -8.0, 30.0, 2.0),
            Region::pixel(50.0, 90.0, 0.0, 0.0),
        ];
        for r in cases {
            let flipped = to_filter_space(r, 100.0);
            let back = from_filter_space(flipped, 100.0);
            assert_eq!(back, r, "roundtrip of {r:?}");
            // Flipping twice with the filter-space flip lands on the same y.
            let twice = to_filter_space(from_filter_space(to_filter_space(r, 100.0), 100.0), 100.0);
            assert_eq!(twice, flipped);
        }
    }

    #[test]
    fn test_degenerate_region_passes_through() {
        let r = to_filter_space(Region::pixel(5.0, 5.0, 0.0, 0.0), 10.0);
        assert_eq!(r, Region::filter(5.0, 5.0, 0.0, 0.0));
    }

    #[test]
    fn test_negative_coordinates_not_clamped() {
        let r = to_pixel_space(Region::normalized(-0.1, -0.2, 0.5, 0.5), 100.0, 100.0);
        assert!(r.x < 0.0 && r.y < 0.0);
    }

    #[test]
    fn test_to_filter_dispatches_on_space() {
        let n = to_filter(Region::normalized(0.4, 0.3, 0.2, 0.15), 600.0, 800.0);
        assert_eq!(n.space, CoordinateSpace::Filter);
        assert!((n.y - 440.0).abs() < 1e-3);

        let p = to_filter(Region::pixel(240.0, 240.0, 120.0, 120.0), 600.0, 800.0);
        assert_eq!(p, Region::filter(240.0, 440.0, 120.0, 120.0));

        let f = Region::filter(1.0, 2.0, 3.0, 4.0);
        assert_eq!(to_filter(f, 600.0, 800.0), f);
    }

    #[test]
    fn test_directed_conversions_ignore_space_tag() {
        // Mislabelled input is converted as if it were in the expected space.
        let r = to_pixel_space(Region::pixel(0.5, 0.5, 0.25, 0.25), 100.0, 40.0);
        assert_eq!(r, Region::pixel(50.0, 20.0, 25.0, 10.0));

        let f = to_filter_space(Region::normalized(0.0, 10.0, 5.0, 5.0), 40.0);
        assert_eq!(f, Region::filter(0.0, 25.0, 5.0, 5.0));
    }
}
