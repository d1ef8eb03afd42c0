use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use faceveil_core::{
    blur_faces, blur_region, build_mask, coords, fallback_to_original, resolver, spawn_engine,
    CancelToken, DetectorHandle, FaceDetector, Feather, FixedDetector, ImageSize,
    OverlayGeometry, PipelineError, Region, ScrfdDetector, ViewRect,
};
use image::RgbaImage;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "faceveil", about = "Pixelate faces or hand-picked regions in photos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces and pixelate them
    Faces {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// JSON list of normalized face regions to use instead of the detector
        #[arg(long)]
        regions: Option<PathBuf>,
    },
    /// Pixelate one rectangle given in pixels (origin top-left)
    Region {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        x: f32,
        #[arg(long, allow_hyphen_values = true)]
        y: f32,
        #[arg(long)]
        width: f32,
        #[arg(long)]
        height: f32,
    },
    /// Pixelate under a sticker placed on a view showing the image
    Sticker {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Size of the view displaying the image, in points
        #[arg(long, value_parser = positive_dimension)]
        view_width: f32,
        #[arg(long, value_parser = positive_dimension)]
        view_height: f32,
        /// Sticker center in view points
        #[arg(long, allow_hyphen_values = true)]
        center_x: f32,
        #[arg(long, allow_hyphen_values = true)]
        center_y: f32,
        /// Unscaled sticker edge length in view points
        #[arg(long)]
        size: f32,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        /// Accumulated rotation in radians (does not affect the region)
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        rotation: f32,
    },
    /// Print detected face regions as JSON
    Detect { input: PathBuf },
    /// Write the union mask for a region list as a grayscale image
    Mask {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        regions: PathBuf,
        /// Use the smaller manual-placement feather
        #[arg(long)]
        manual: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Faces {
            input,
            output,
            regions,
        } => {
            let source = load_image(&input)?;
            let cancel = CancelToken::new();
            arm_cancellation(&cancel, config.detect_timeout_secs);

            let result = match regions {
                Some(path) => {
                    let detector = FixedDetector::new(read_regions(&path)?);
                    blur_faces(&detector, &source, &cancel).await
                }
                None => match start_detector(&config) {
                    Ok(handle) => blur_faces(&handle, &source, &cancel).await,
                    Err(err) => Err(err),
                },
            };
            present(result, &source, &output)?;
        }
        Commands::Region {
            input,
            output,
            x,
            y,
            width,
            height,
        } => {
            let source = load_image(&input)?;
            let region = coords::to_filter_space(
                Region::pixel(x, y, width, height),
                source.height() as f32,
            );
            present(blur_region(&source, region), &source, &output)?;
        }
        Commands::Sticker {
            input,
            output,
            view_width,
            view_height,
            center_x,
            center_y,
            size,
            scale,
            rotation,
        } => {
            let source = load_image(&input)?;
            let overlay = OverlayGeometry::new(center_x, center_y, size, size)
                .scaled_by(scale)
                .rotated_by(rotation);
            let region = resolver::resolve_overlay(
                ImageSize::of(&source),
                ViewRect::new(0.0, 0.0, view_width, view_height),
                &overlay,
            );
            tracing::info!(?overlay, ?region, "sticker resolved");
            present(blur_region(&source, region), &source, &output)?;
        }
        Commands::Detect { input } => {
            let source = load_image(&input)?;
            let handle = start_detector(&config)?;
            let regions = handle.detect(&source).await?;
            println!("{}", serde_json::to_string_pretty(&regions)?);
        }
        Commands::Mask {
            input,
            output,
            regions,
            manual,
        } => {
            let source = load_image(&input)?;
            let feather = if manual { Feather::Manual } else { Feather::Detected };
            let mask = build_mask(&read_regions(&regions)?, source.width(), source.height(), feather)?;
            mask.to_luma8()
                .save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "Wrote mask to {} ({:.1}% covered)",
                output.display(),
                mask.coverage() * 100.0
            );
        }
    }

    Ok(())
}

fn load_image(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .to_rgba8();
    tracing::debug!(path = %path.display(), width = image.width(), height = image.height(), "loaded image");
    Ok(image)
}

fn read_regions(path: &Path) -> Result<Vec<Region>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let regions: Vec<Region> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("invalid region list in {}", path.display()))?;
    Ok(regions)
}

fn start_detector(config: &Config) -> Result<DetectorHandle, PipelineError> {
    let detector = ScrfdDetector::load(
        &config.scrfd_model_path(),
        config.intra_threads,
        config.confidence_threshold,
    )?;
    Ok(spawn_engine(detector)?)
}

/// Cancel detection on Ctrl-C, and after the configured timeout if any.
fn arm_cancellation(cancel: &CancelToken, timeout_secs: u64) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; cancelling detection");
            on_signal.cancel();
        }
    });

    if timeout_secs > 0 {
        let on_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
            tracing::warn!(timeout_secs, "detection timed out; cancelling");
            on_timeout.cancel();
        });
    }
}

fn positive_dimension(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("must be a positive size, got {value}"))
    }
}

/// Write the image the user should see: the result, or the original if the
/// pipeline failed. A cancelled run writes nothing.
///
/// Finding nothing to obscure is a normal outcome; any other failure still
/// writes the original but is reported as an error.
fn present(
    result: Result<RgbaImage, PipelineError>,
    source: &RgbaImage,
    output: &Path,
) -> Result<()> {
    let failure = match &result {
        Ok(_) => None,
        Err(err) => Some((err.to_string(), matches!(err, PipelineError::InvalidMasking))),
    };
    let Some(image) = fallback_to_original(result, source) else {
        bail!("cancelled; no output written");
    };
    image
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    match failure {
        None => println!("Wrote {}", output.display()),
        Some((_, true)) => println!("Nothing to obscure; wrote original to {}", output.display()),
        Some((reason, false)) => {
            bail!("pixelation skipped: {reason}; wrote original to {}", output.display())
        }
    }
    Ok(())
}
