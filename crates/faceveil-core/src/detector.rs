//! Face detection capability.
//!
//! The pipeline only needs normalized face rectangles, so detection is a trait:
//! [`FaceDetector`] is the async, cancel-by-drop interface the pipeline awaits,
//! [`FixedDetector`] returns preset regions, and [`ScrfdDetector`] is a
//! blocking SCRFD backend meant to run behind the engine thread.

use crate::engine::{AbortSignal, BlockingDetector};
use crate::types::Region;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use ndarray::Array4;
use ort::session::{RunOptions, Session};
use ort::value::TensorRef;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

// --- Named constants ---
const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// SCRFD model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("image has no pixel data")]
    InvalidImage,
    #[error("detector returned an observation that is not a normalized rectangle")]
    InvalidObservation,
    #[error("model file not found: {0} — download det_10g.onnx from insightface")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detection aborted by caller")]
    Aborted,
    #[error("detector engine is not running")]
    EngineClosed,
    #[error("failed to start detector engine: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Something that finds faces in an image.
///
/// Returns regions in normalized detector space (unit square, top-left
/// origin). Dropping the returned future abandons the request.
pub trait FaceDetector {
    fn detect(
        &self,
        image: &RgbaImage,
    ) -> impl Future<Output = Result<Vec<Region>, DetectionError>> + Send;
}

/// Detector that always reports the same regions.
///
/// Useful when faces were located elsewhere (e.g. a JSON region list) and in
/// tests.
#[derive(Debug, Clone, Default)]
pub struct FixedDetector {
    regions: Vec<Region>,
}

impl FixedDetector {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }
}

impl FaceDetector for FixedDetector {
    async fn detect(&self, image: &RgbaImage) -> Result<Vec<Region>, DetectionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectionError::InvalidImage);
        }
        Ok(self.regions.clone())
    }
}

/// Metadata for mapping letterboxed model coordinates back to the frame.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// Raw detection in source-frame pixels.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// SCRFD face detector running on ONNX Runtime.
pub struct ScrfdDetector {
    session: Session,
    confidence_threshold: f32,
    stride_indices: [StrideOutputIndices; 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from `model_path`.
    pub fn load(
        model_path: &Path,
        intra_threads: usize,
        confidence_threshold: f32,
    ) -> Result<Self, DetectionError> {
        if !model_path.exists() {
            return Err(DetectionError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        // Scores and boxes for three strides; keypoint outputs are unused.
        if output_names.len() < 6 {
            return Err(DetectionError::InferenceFailed(format!(
                "SCRFD model requires score/bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            confidence_threshold,
            stride_indices,
        })
    }

    /// Resize into the square model input with letterbox padding and build a
    /// normalized NCHW tensor.
    fn preprocess(image: &RgbaImage) -> (Array4<f32>, LetterboxInfo) {
        let (width, height) = image.dimensions();
        let size = SCRFD_INPUT_SIZE as f32;
        let scale = (size / width as f32).min(size / height as f32);

        let new_w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
        let pad_x = (SCRFD_INPUT_SIZE as u32 - new_w) as f32 / 2.0;
        let pad_y = (SCRFD_INPUT_SIZE as u32 - new_h) as f32 / 2.0;

        let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

        // Padding with the mean normalizes to 0.0.
        let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
        let x0 = pad_x.floor() as usize;
        let y0 = pad_y.floor() as usize;
        for (x, y, px) in resized.enumerate_pixels() {
            let (tx, ty) = (x0 + x as usize, y0 + y as usize);
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = (px.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (tensor, LetterboxInfo { scale, pad_x, pad_y })
    }
}

impl BlockingDetector for ScrfdDetector {
    fn detect_blocking(
        &mut self,
        image: &RgbaImage,
        abort: &AbortSignal,
    ) -> Result<Vec<Region>, DetectionError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::InvalidImage);
        }

        let (input, letterbox) = Self::preprocess(image);
        if abort.is_aborted() {
            return Err(DetectionError::Aborted);
        }

        // Terminating the run options makes ONNX Runtime bail out of `run`.
        let run_options: Arc<RunOptions> = Arc::new(RunOptions::new()?);
        let terminate = Arc::clone(&run_options);
        abort.on_abort(move || {
            if let Err(e) = terminate.terminate() {
                tracing::warn!(error = %e, "failed to terminate SCRFD run");
            }
        });

        let outputs = match self.session.run_with_options(
            ort::inputs![TensorRef::from_array_view(input.view())?],
            &*run_options,
        ) {
            Ok(outputs) => outputs,
            Err(_) if abort.is_aborted() => {
                tracing::debug!("SCRFD run terminated");
                return Err(DetectionError::Aborted);
            }
            Err(e) => return Err(e.into()),
        };

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[pos];
            let (_, scores) = outputs[score_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectionError::InferenceFailed(format!("scores stride {stride}: {e}"))
            })?;
            let (_, bboxes) = outputs[bbox_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectionError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
            })?;
            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                &letterbox,
                self.confidence_threshold,
            ));
        }

        let kept = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = kept.len(), "SCRFD detection finished");
        Ok(kept
            .iter()
            .map(|c| normalize(c, width as f32, height as f32))
            .collect())
    }
}

/// Find score/bbox tensors by name ("score_8", "bbox_16", ...).
///
/// Falls back to the standard positional order when names are generic:
/// [0-2] scores, [3-5] boxes, [6-8] keypoints.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(found) => {
            tracing::debug!("SCRFD: using name-based output tensor mapping");
            [found[0], found[1], found[2]]
        }
        None => {
            tracing::debug!(?names, "SCRFD: output names not recognized, using positional mapping");
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

/// Decode anchor-free box offsets for one stride level into frame pixels.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<Candidate> {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = scores.get(idx).copied().unwrap_or(0.0);
            if score <= threshold {
                return None;
            }
            let off = idx * 4;
            let d = bboxes.get(off..off + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid_w) as f32 * s;
            let ay = (cell / grid_w) as f32 * s;

            let unbox = |v: f32, pad: f32| (v - pad) / letterbox.scale;
            Some(Candidate {
                x1: unbox(ax - d[0] * s, letterbox.pad_x),
                y1: unbox(ay - d[1] * s, letterbox.pad_y),
                x2: unbox(ax + d[2] * s, letterbox.pad_x),
                y2: unbox(ay + d[3] * s, letterbox.pad_y),
                score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression, highest score first.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::new();
    for c in candidates {
        if keep.iter().all(|k| iou(k, &c) <= iou_threshold) {
            keep.push(c);
        }
    }
    keep
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    let area = |c: &Candidate| (c.x2 - c.x1).max(0.0) * (c.y2 - c.y1).max(0.0);
    let union = area(a) + area(b) - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Clip a candidate to the frame and express it in the unit square.
fn normalize(c: &Candidate, width: f32, height: f32) -> Region {
    let x1 = c.x1.clamp(0.0, width);
    let y1 = c.y1.clamp(0.0, height);
    let x2 = c.x2.clamp(0.0, width);
    let y2 = c.y2.clamp(0.0, height);
    Region::normalized(
        x1 / width,
        y1 / height,
        (x2 - x1).max(0.0) / width,
        (y2 - y1).max(0.0) / height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn cand(x: f32, y: f32, w: f32, h: f32, score: f32) -> Candidate {
        Candidate { x1: x, y1: y, x2: x + w, y2: y + h, score }
    }

    #[tokio::test]
    async fn test_fixed_detector_returns_regions() {
        let regions = vec![Region::normalized(0.1, 0.2, 0.3, 0.4)];
        let det = FixedDetector::new(regions.clone());
        let img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        assert_eq!(det.detect(&img).await.unwrap(), regions);
    }

    #[tokio::test]
    async fn test_fixed_detector_rejects_empty_image() {
        let det = FixedDetector::default();
        let img = RgbaImage::new(0, 0);
        assert!(matches!(det.detect(&img).await, Err(DetectionError::InvalidImage)));
    }

    #[test]
    fn test_load_missing_model() {
        let result = ScrfdDetector::load(Path::new("/nonexistent/det_10g.onnx"), 1, 0.5);
        assert!(matches!(result, Err(DetectionError::ModelNotFound(_))));
    }

    #[test]
    fn test_iou_cases() {
        let a = cand(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        let far = cand(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &far).abs() < 1e-6);
        let half = cand(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let kept = nms(
            vec![
                cand(5.0, 5.0, 100.0, 100.0, 0.8),
                cand(0.0, 0.0, 100.0, 100.0, 0.9),
                cand(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            0.4,
        );
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
        assert!((kept[1].score - 0.7).abs() < 1e-6);
        assert!(nms(Vec::new(), 0.4).is_empty());
    }

    #[test]
    fn test_discover_output_indices() {
        let named: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32",
            "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(discover_output_indices(&named), [(2, 0), (5, 3), (8, 6)]);

        let generic: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&generic), [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_decode_stride_maps_through_letterbox() {
        // One confident anchor at cell (1, 1) of stride 32, unit offsets.
        let stride = 32;
        let grid = SCRFD_INPUT_SIZE / stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let idx = (grid + 1) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.95;
        let mut bboxes = vec![0.0f32; anchors * 4];
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let letterbox = LetterboxInfo { scale: 2.0, pad_x: 0.0, pad_y: 16.0 };
        let dets = decode_stride(&scores, &bboxes, stride, &letterbox, 0.5);
        assert_eq!(dets.len(), 1);
        let d = dets[0];
        // Anchor (32, 32) ± 32 → [0, 64] in model space.
        assert!((d.x1 - 0.0).abs() < 1e-4 && (d.x2 - 32.0).abs() < 1e-4);
        assert!((d.y1 + 8.0).abs() < 1e-4 && (d.y2 - 24.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalize_clips_to_frame() {
        let r = normalize(&cand(-10.0, 20.0, 60.0, 40.0, 0.9), 100.0, 200.0);
        assert!(r.is_valid_observation());
        assert!((r.x - 0.0).abs() < 1e-6);
        assert!((r.y - 0.1).abs() < 1e-6);
        assert!((r.width - 0.5).abs() < 1e-6);
        assert!((r.height - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_letterbox() {
        let img = RgbaImage::from_pixel(320, 160, Rgba([255, 255, 255, 255]));
        let (tensor, lb) = ScrfdDetector::preprocess(&img);
        assert_eq!(tensor.shape(), &[1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE]);
        assert!((lb.scale - 2.0).abs() < 1e-6);
        assert!((lb.pad_x - 0.0).abs() < 1e-6);
        assert!((lb.pad_y - 160.0).abs() < 1e-6);
        // Padding rows normalize to zero, content rows to (255 - mean) / std.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let expected = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        assert!((tensor[[0, 1, 320, 320]] - expected).abs() < 0.01);
    }
}
