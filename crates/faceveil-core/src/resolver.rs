//! Maps an on-screen overlay back onto the source bitmap.
//!
//! The image view may show the bitmap scaled or cropped, so each axis gets its
//! own ratio of source pixels per view point. Only the overlay's axis-aligned
//! frame is used; an accumulated rotation does not change the region.

use crate::coords;
use crate::overlay::OverlayGeometry;
use crate::types::{ImageSize, Region, ViewRect};

/// Resolve an overlay into a filter-space region of the source image.
///
/// * `image_view` — the image view's frame, in the coordinate space the
///   overlay is positioned in.
/// * `overlay_frame` — the overlay's frame in that same space.
/// * `overlay_bounds` — the content rect inside the overlay, relative to
///   `overlay_frame`'s origin (e.g. inset by handle padding).
///
/// Total over its inputs: a zero-sized `image_view` yields non-finite
/// coordinates on that axis, and such a region masks nothing.
pub fn resolve_region(
    source: ImageSize,
    image_view: ViewRect,
    overlay_frame: ViewRect,
    overlay_bounds: ViewRect,
) -> Region {
    let width_ratio = source.width / image_view.width;
    let height_ratio = source.height / image_view.height;

    // Content corners in the image view's local coordinates.
    let local_x = overlay_frame.x + overlay_bounds.x - image_view.x;
    let local_y = overlay_frame.y + overlay_bounds.y - image_view.y;

    let pixel = Region::pixel(
        local_x * width_ratio,
        local_y * height_ratio,
        overlay_bounds.width * width_ratio,
        overlay_bounds.height * height_ratio,
    );
    let region = coords::to_filter_space(pixel, source.height);

    tracing::debug!(
        width_ratio,
        height_ratio,
        ?pixel,
        ?region,
        "resolved overlay region"
    );
    region
}

/// Resolve an [`OverlayGeometry`] positioned over `image_view`.
pub fn resolve_overlay(source: ImageSize, image_view: ViewRect, overlay: &OverlayGeometry) -> Region {
    let frame = overlay.frame();
    let bounds = ViewRect::new(0.0, 0.0, frame.width, frame.height);
    resolve_region(source, image_view, frame, bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoordinateSpace;

    fn approx(a: Region, b: Region) -> bool {
        a.space == b.space
            && (a.x - b.x).abs() < 1e-3
            && (a.y - b.y).abs() < 1e-3
            && (a.width - b.width).abs() < 1e-3
            && (a.height - b.height).abs() < 1e-3
    }

    #[test]
    fn test_identity_view() {
        // View shows the 200x100 bitmap at 1:1 at the origin.
        let r = resolve_region(
            ImageSize::new(200.0, 100.0),
            ViewRect::new(0.0, 0.0, 200.0, 100.0),
            ViewRect::new(10.0, 20.0, 30.0, 40.0),
            ViewRect::new(0.0, 0.0, 30.0, 40.0),
        );
        assert!(approx(r, Region::filter(10.0, 40.0, 30.0, 40.0)), "{r:?}");
    }

    #[test]
    fn test_scaled_and_offset_view() {
        // 1200x800 bitmap shown in a 300x400 view (x4, x2) placed at (50, 60).
        let r = resolve_region(
            ImageSize::new(1200.0, 800.0),
            ViewRect::new(50.0, 60.0, 300.0, 400.0),
            ViewRect::new(75.0, 85.0, 70.0, 70.0),
            // 10pt handle padding on every side.
            ViewRect::new(10.0, 10.0, 50.0, 50.0),
        );
        // local (35, 35) → pixel (140, 70), size (200, 100); flip: 800 - 70 - 100.
        assert_eq!(r.space, CoordinateSpace::Filter);
        assert!(approx(r, Region::filter(140.0, 630.0, 200.0, 100.0)), "{r:?}");
    }

    #[test]
    fn test_resolve_overlay_uses_scaled_frame() {
        let overlay = OverlayGeometry::new(100.0, 100.0, 40.0, 40.0).scaled_by(1.5);
        let r = resolve_overlay(
            ImageSize::new(400.0, 400.0),
            ViewRect::new(0.0, 0.0, 200.0, 200.0),
            &overlay,
        );
        // Frame 60x60 at (70, 70) → pixel (140, 140, 120, 120) → filter y 140.
        assert!(approx(r, Region::filter(140.0, 140.0, 120.0, 120.0)), "{r:?}");
    }

    #[test]
    fn test_rotation_does_not_change_region() {
        let source = ImageSize::new(400.0, 300.0);
        let view = ViewRect::new(0.0, 0.0, 200.0, 150.0);
        let overlay = OverlayGeometry::new(80.0, 60.0, 50.0, 20.0);
        let rotated = overlay.rotated_by(0.7);
        assert_eq!(
            resolve_overlay(source, view, &overlay),
            resolve_overlay(source, view, &rotated)
        );
    }

    #[test]
    fn test_zero_sized_view_masks_nothing() {
        let source = ImageSize::new(200.0, 100.0);
        let r = resolve_region(
            source,
            ViewRect::new(0.0, 0.0, 0.0, 100.0),
            ViewRect::new(10.0, 20.0, 30.0, 40.0),
            ViewRect::new(0.0, 0.0, 30.0, 40.0),
        );
        assert!(!r.x.is_finite() && !r.width.is_finite(), "{r:?}");
        assert!(r.y.is_finite() && r.height.is_finite(), "{r:?}");

        let mask = crate::mask::Mask::disk(r, 200, 100, crate::mask::Feather::Manual);
        assert_eq!(mask.coverage(), 0.0);
    }
}
