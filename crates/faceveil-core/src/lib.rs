//! faceveil-core — Mask-driven face obscuring pipeline.
//!
//! Regions of interest (from a face detector or a hand-placed overlay) are
//! turned into a feathered union mask, the source is pixelated once, and the
//! pixelated copy is blended over the original only where the mask is set.

pub mod composite;
pub mod coords;
pub mod detector;
pub mod engine;
pub mod mask;
pub mod overlay;
pub mod pipeline;
pub mod pixelate;
pub mod resolver;
pub mod types;

use std::path::PathBuf;

pub use detector::{DetectionError, FaceDetector, FixedDetector, ScrfdDetector};
pub use engine::{spawn_engine, AbortSignal, BlockingDetector, DetectorHandle};
pub use mask::{build_mask, Feather, Mask};
pub use overlay::{GestureDelta, OverlayGeometry};
pub use pipeline::{
    blur_faces, blur_region, blur_regions, fallback_to_original, CancelToken, PipelineError,
};
pub use types::{CoordinateSpace, ImageSize, Region, ViewRect};

/// Default location of ONNX model files: `$XDG_DATA_HOME/faceveil/models`,
/// falling back to `~/.local/share/faceveil/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("faceveil")
        .join("models")
}
