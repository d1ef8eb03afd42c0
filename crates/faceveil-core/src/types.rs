use serde::{Deserialize, Serialize};

/// Coordinate system a [`Region`] is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Unit square, origin top-left, as produced by face detectors.
    NormalizedDetector,
    /// Source bitmap pixels, origin top-left.
    Pixel,
    /// Source bitmap pixels, origin bottom-left (vertically flipped).
    Filter,
}

/// Axis-aligned rectangle of interest, tagged with its coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub space: CoordinateSpace,
}

impl Region {
    pub fn new(x: f32, y: f32, width: f32, height: f32, space: CoordinateSpace) -> Self {
        Self { x, y, width, height, space }
    }

    pub fn normalized(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, width, height, CoordinateSpace::NormalizedDetector)
    }

    pub fn pixel(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, width, height, CoordinateSpace::Pixel)
    }

    pub fn filter(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, width, height, CoordinateSpace::Filter)
    }

    /// Geometric center `(x, y)` in the region's own space.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// True when the region covers no area.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// A well-formed detector observation: finite, non-negative size, in
    /// normalized detector space.
    pub fn is_valid_observation(&self) -> bool {
        self.space == CoordinateSpace::NormalizedDetector
            && [self.x, self.y, self.width, self.height]
                .iter()
                .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

/// Width and height of a source bitmap in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: f32,
    pub height: f32,
}

impl ImageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &image::RgbaImage) -> Self {
        Self::new(image.width() as f32, image.height() as f32)
    }
}

/// Rectangle in on-screen view coordinates (points, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rect of the given size centered on `(cx, cy)`.
    pub fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }
}
