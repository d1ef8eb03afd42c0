//! Pipeline entry points: detect → mask → pixelate → composite.

use crate::composite::composite;
use crate::detector::{DetectionError, FaceDetector};
use crate::mask::{build_mask, Feather};
use crate::pixelate::pixelate;
use crate::types::Region;
use image::RgbaImage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source image has no pixel data")]
    InvalidImage,
    #[error("detector returned an observation that is not a normalized rectangle")]
    InvalidObservation,
    #[error("no regions to mask")]
    InvalidMasking,
    #[error("compositing produced no output")]
    InvalidCompositeResult,
    #[error("composited image could not be rasterized")]
    InvalidRasterization,
    #[error("face detection was cancelled")]
    DetectionCancelled,
    #[error("face detection failed: {0}")]
    Detection(#[source] DetectionError),
}

impl PipelineError {
    /// Deliberate abort rather than a processing failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::DetectionCancelled)
    }
}

impl From<DetectionError> for PipelineError {
    fn from(err: DetectionError) -> Self {
        match err {
            DetectionError::InvalidImage => PipelineError::InvalidImage,
            DetectionError::InvalidObservation => PipelineError::InvalidObservation,
            DetectionError::Aborted => PipelineError::DetectionCancelled,
            other => PipelineError::Detection(other),
        }
    }
}

/// Cooperative cancellation signal shared between a caller and a running
/// [`blur_faces`] call.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_valid(image: &RgbaImage) -> Result<(), PipelineError> {
    if image.width() == 0 || image.height() == 0 || image.as_raw().is_empty() {
        return Err(PipelineError::InvalidImage);
    }
    Ok(())
}

/// Detect faces and obscure every one of them.
///
/// Detection races against `cancel`; if the token fires first the detection
/// future is dropped and [`PipelineError::DetectionCancelled`] is returned
/// without masking. An invalid observation fails the whole batch, and zero
/// faces surface as [`PipelineError::InvalidMasking`].
pub async fn blur_faces<D: FaceDetector>(
    detector: &D,
    image: &RgbaImage,
    cancel: &CancelToken,
) -> Result<RgbaImage, PipelineError> {
    ensure_valid(image)?;
    if cancel.is_cancelled() {
        return Err(PipelineError::DetectionCancelled);
    }

    let regions = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("face detection cancelled");
            return Err(PipelineError::DetectionCancelled);
        }
        detected = detector.detect(image) => detected?,
    };

    if !regions.iter().all(Region::is_valid_observation) {
        tracing::warn!(faces = regions.len(), "rejecting malformed detection batch");
        return Err(PipelineError::InvalidObservation);
    }
    tracing::info!(faces = regions.len(), "faces detected");

    blur_regions(image, &regions, Feather::Detected)
}

/// Obscure a single manually placed region (manual feather).
pub fn blur_region(image: &RgbaImage, region: Region) -> Result<RgbaImage, PipelineError> {
    blur_regions(image, &[region], Feather::Manual)
}

/// Mask, pixelate and composite `image` over `regions`.
pub fn blur_regions(
    image: &RgbaImage,
    regions: &[Region],
    feather: Feather,
) -> Result<RgbaImage, PipelineError> {
    ensure_valid(image)?;
    let (width, height) = image.dimensions();
    let mask = build_mask(regions, width, height, feather)?;
    let pixelated = pixelate(image);
    composite(image, &pixelated, &mask)
}

/// Pick the image to show the user for a pipeline result.
///
/// Successful output is shown as-is; any failure other than cancellation falls
/// back to the untouched original; cancellation shows nothing new.
pub fn fallback_to_original(
    result: Result<RgbaImage, PipelineError>,
    original: &RgbaImage,
) -> Option<RgbaImage> {
    match result {
        Ok(image) => Some(image),
        Err(err) if err.is_cancellation() => None,
        Err(err) => {
            tracing::warn!(error = %err, "pipeline failed; showing original image");
            Some(original.clone())
        }
    }
}
