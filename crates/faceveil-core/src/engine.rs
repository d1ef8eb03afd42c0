//! Detector engine: runs a blocking detector backend on a dedicated OS thread.
//!
//! Async callers talk to the thread through an mpsc request queue and get
//! their answer on a oneshot channel. Every request carries an [`AbortSignal`]
//! that fires when the caller stops waiting (its future was dropped, e.g. on
//! cancellation). Queued requests whose caller is gone are skipped; a backend
//! already running hooks the signal to stop its inference early.

use crate::detector::{DetectionError, FaceDetector};
use crate::types::Region;
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};

/// Requests that can wait in the queue while the engine is busy.
const REQUEST_QUEUE_DEPTH: usize = 4;

type AbortHook = Box<dyn FnOnce() + Send>;

/// Fires once when the caller of a detection request gives up on it.
///
/// Backends register hooks with [`on_abort`](Self::on_abort) to interrupt
/// work in progress; a hook registered after the signal fired runs at once.
#[derive(Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

#[derive(Default)]
struct AbortInner {
    aborted: AtomicBool,
    hooks: Mutex<Vec<AbortHook>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Fire the signal, running every registered hook exactly once.
    pub fn abort(&self) {
        let hooks = {
            let mut hooks = self.inner.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            if self.inner.aborted.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *hooks)
        };
        for hook in hooks {
            hook();
        }
    }

    /// Run `hook` when the signal fires (immediately if it already has).
    pub fn on_abort(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut hooks = self.inner.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.inner.aborted.load(Ordering::SeqCst) {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }
}

impl std::fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Aborts its signal when dropped unless disarmed first.
struct AbortOnDrop {
    signal: Option<AbortSignal>,
}

impl AbortOnDrop {
    fn disarm(mut self) {
        self.signal = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            tracing::debug!("detection abandoned by caller; aborting");
            signal.abort();
        }
    }
}

/// Synchronous detection backend owned by the engine thread.
pub trait BlockingDetector: Send + 'static {
    /// Detect faces in `image`. Long-running backends should stop early and
    /// return [`DetectionError::Aborted`] once `abort` fires.
    fn detect_blocking(
        &mut self,
        image: &RgbaImage,
        abort: &AbortSignal,
    ) -> Result<Vec<Region>, DetectionError>;
}

struct DetectRequest {
    image: RgbaImage,
    abort: AbortSignal,
    reply: oneshot::Sender<Result<Vec<Region>, DetectionError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct DetectorHandle {
    tx: mpsc::Sender<DetectRequest>,
}

impl FaceDetector for DetectorHandle {
    async fn detect(&self, image: &RgbaImage) -> Result<Vec<Region>, DetectionError> {
        let abort = AbortSignal::new();
        let guard = AbortOnDrop {
            signal: Some(abort.clone()),
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DetectRequest {
                image: image.clone(),
                abort,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DetectionError::EngineClosed)?;
        let reply = reply_rx.await;
        guard.disarm();
        reply.map_err(|_| DetectionError::EngineClosed)?
    }
}

/// Move `backend` onto a new engine thread and return a handle to it.
///
/// The thread exits once every handle has been dropped.
pub fn spawn_engine<B: BlockingDetector>(mut backend: B) -> Result<DetectorHandle, DetectionError> {
    let (tx, mut rx) = mpsc::channel::<DetectRequest>(REQUEST_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("faceveil-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                if req.abort.is_aborted() || req.reply.is_closed() {
                    tracing::debug!("skipping detection request abandoned by caller");
                    continue;
                }
                let result = backend.detect_blocking(&req.image, &req.abort);
                if req.reply.send(result).is_err() {
                    tracing::debug!("caller went away during detection; result dropped");
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(DetectorHandle { tx })
}
