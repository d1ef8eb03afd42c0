use std::path::PathBuf;

use faceveil_core::detector::{DEFAULT_CONFIDENCE_THRESHOLD, SCRFD_MODEL_FILE};

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Minimum SCRFD score for a detection to count as a face.
    pub confidence_threshold: f32,
    /// Cancel detection after this many seconds (0 disables the timeout).
    pub detect_timeout_secs: u64,
    /// ONNX Runtime intra-op threads for the detector.
    pub intra_threads: usize,
}

impl Config {
    /// Load configuration from `FACEVEIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            model_dir: std::env::var("FACEVEIL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| faceveil_core::default_model_dir()),
            confidence_threshold: env_parse(
                "FACEVEIL_CONFIDENCE_THRESHOLD",
                DEFAULT_CONFIDENCE_THRESHOLD,
            ),
            detect_timeout_secs: env_parse("FACEVEIL_DETECT_TIMEOUT_SECS", 0),
            intra_threads: env_parse("FACEVEIL_INTRA_THREADS", 2),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(SCRFD_MODEL_FILE)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
