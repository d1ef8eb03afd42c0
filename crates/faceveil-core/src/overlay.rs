//! Manipulable overlay ("sticker") state.
//!
//! The overlay is an explicit value updated by pure transforms: each gesture
//! step produces a new [`OverlayGeometry`] rather than mutating a view. Only
//! the axis-aligned frame feeds region resolution; rotation is carried along
//! but not applied there.

use crate::types::ViewRect;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_SCALE: f32 = 0.5;
pub const DEFAULT_MAX_SCALE: f32 = 2.0;

/// Current placement of an on-screen overlay, in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayGeometry {
    pub center_x: f32,
    pub center_y: f32,
    /// Unscaled content size.
    pub base_width: f32,
    pub base_height: f32,
    /// Accumulated scale factor.
    pub scale: f32,
    /// Accumulated rotation in radians.
    pub rotation: f32,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl OverlayGeometry {
    pub fn new(center_x: f32, center_y: f32, base_width: f32, base_height: f32) -> Self {
        Self {
            center_x,
            center_y,
            base_width,
            base_height,
            scale: 1.0,
            rotation: 0.0,
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
        }
    }

    pub fn with_scale_limits(mut self, min_scale: f32, max_scale: f32) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    /// Translate by `(dx, dy)`, keeping the center inside a
    /// `container_width × container_height` container.
    pub fn moved(self, dx: f32, dy: f32, container_width: f32, container_height: f32) -> Self {
        Self {
            center_x: (self.center_x + dx).max(0.0).min(container_width),
            center_y: (self.center_y + dy).max(0.0).min(container_height),
            ..self
        }
    }

    /// Multiply the accumulated scale by `factor`, clamped to the scale limits.
    ///
    /// Limits of (0, 0) disable clamping.
    pub fn scaled_by(self, factor: f32) -> Self {
        let mut factor = factor;
        let limited = !(self.min_scale == 0.0 && self.max_scale == 0.0);
        if limited && self.scale > 0.0 {
            if factor * self.scale <= self.min_scale {
                factor = self.min_scale / self.scale;
            } else if factor * self.scale >= self.max_scale {
                factor = self.max_scale / self.scale;
            }
        }
        Self {
            scale: self.scale * factor,
            ..self
        }
    }

    pub fn rotated_by(self, radians: f32) -> Self {
        Self {
            rotation: self.rotation + radians,
            ..self
        }
    }

    /// Apply one single-hand scale+rotate step.
    pub fn apply(self, delta: GestureDelta) -> Self {
        self.scaled_by(delta.scale).rotated_by(delta.rotation)
    }

    /// Axis-aligned content frame in view coordinates. Rotation is ignored.
    pub fn frame(&self) -> ViewRect {
        ViewRect::centered(
            self.center_x,
            self.center_y,
            self.base_width * self.scale,
            self.base_height * self.scale,
        )
    }
}

/// Incremental scale and rotation from one drag step of a single-hand
/// resize/rotate handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureDelta {
    pub scale: f32,
    pub rotation: f32,
}

impl GestureDelta {
    pub const IDENTITY: GestureDelta = GestureDelta {
        scale: 1.0,
        rotation: 0.0,
    };

    /// Derive the delta from the handle's previous and current touch points,
    /// both measured relative to the overlay's `anchor` center.
    ///
    /// Scale is the ratio of distances to the anchor, rotation the change in
    /// angle around it. A previous point sitting on the anchor yields
    /// [`GestureDelta::IDENTITY`].
    pub fn from_touch(anchor: (f32, f32), previous: (f32, f32), current: (f32, f32)) -> Self {
        let prev_radius = distance(previous, anchor);
        if prev_radius <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let cur_radius = distance(current, anchor);
        let cur_angle = (current.1 - anchor.1).atan2(current.0 - anchor.0);
        let prev_angle = (previous.1 - anchor.1).atan2(previous.0 - anchor.0);
        Self {
            scale: cur_radius / prev_radius,
            rotation: cur_angle - prev_angle,
        }
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}
