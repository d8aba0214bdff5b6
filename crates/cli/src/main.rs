mod cascade_file;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use haarscan_core::acceleration::domain::program_cache::ProgramCache;
use haarscan_core::acceleration::infrastructure::gpu_program::GpuProgram;
use haarscan_core::detection::domain::detection_parameters::{
    DetectionParameters, ScanMode, WeightCalibration,
};
use haarscan_core::detection::infrastructure::backend_factory::BackendKind;
use haarscan_core::pipeline::detection_session::{DetectionSession, SessionConfig};
use haarscan_core::pipeline::session_logger::StdoutSessionLogger;
use haarscan_core::shared::constants::IMAGE_EXTENSIONS;
use haarscan_core::shared::error::DetectionError;
use haarscan_core::shared::frame::Frame;
use haarscan_core::shared::region::{WindowSize, DEFAULT_IOU_THRESHOLD};

use cascade_file::load_cascade;

/// Multi-scale Haar cascade detection on a single image.
#[derive(Parser)]
#[command(name = "haarscan")]
struct Cli {
    /// Input image file.
    input: PathBuf,

    /// Cascade model (JSON).
    #[arg(long)]
    cascade: PathBuf,

    /// Growth rate between pyramid levels (> 1.0).
    #[arg(long, default_value = "1.25")]
    scaling_factor: f64,

    /// Smallest square window to scan, in pixels.
    #[arg(long, default_value = "20")]
    min_size: u32,

    /// Largest square window to scan, in pixels.
    #[arg(long, default_value = "300")]
    max_size: u32,

    /// Level order: larger-to-smaller or smaller-to-larger.
    #[arg(long, default_value = "larger-to-smaller")]
    scan_mode: String,

    /// Scan backend: sequential or accelerator.
    #[arg(long, default_value = "sequential")]
    backend: String,

    /// Rebuild accelerator kernels instead of reusing cached binaries.
    #[arg(long)]
    no_binary_cache: bool,

    /// Host threads for the sequential backend.
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Window step in pixels at the canonical cascade size.
    #[arg(long, default_value = "1.0")]
    step_factor: f64,

    /// Fixed weight coefficient for every level (default: 1 / window area).
    #[arg(long)]
    scale_weight: Option<f64>,

    /// Merge overlapping detections before printing.
    #[arg(long)]
    group: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let frame = load_frame(&cli.input)?;
    let cascade = load_cascade(&cli.cascade)?;
    let params = build_parameters(&cli);
    let config = SessionConfig {
        backend: parse_backend(&cli.backend),
        use_binary_cache: !cli.no_binary_cache,
        workers: cli.workers,
    };

    let cache = Arc::new(ProgramCache::new());
    let mut session =
        open_session(config, &cache)?.with_logger(Box::new(StdoutSessionLogger::new()));

    let mut result = session.process_frame(&frame, &cascade, &params)?;
    if cli.group {
        result = result.grouped(DEFAULT_IOU_THRESHOLD);
    }
    session.finish();

    for r in result.regions() {
        println!("{} {} {} {}", r.x, r.y, r.width, r.height);
    }
    log::info!("{} detections in {}", result.len(), cli.input.display());
    Ok(())
}

/// Fall back to the sequential backend when no GPU adapter exists.
fn open_session(
    config: SessionConfig,
    cache: &Arc<ProgramCache<GpuProgram>>,
) -> Result<DetectionSession, DetectionError> {
    match DetectionSession::new(config, cache) {
        Err(DetectionError::NoDevice) => {
            log::warn!("No GPU adapter available, falling back to the sequential backend");
            DetectionSession::new(
                SessionConfig {
                    backend: BackendKind::Sequential,
                    ..config
                },
                cache,
            )
        }
        other => other,
    }
}

fn load_frame(path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
    let gray = image::open(path)
        .map_err(|e| format!("Cannot open image {}: {e}", path.display()))?
        .to_luma8();
    let (width, height) = gray.dimensions();
    Ok(Frame::new(gray.into_raw(), width, height, 0))
}

fn build_parameters(cli: &Cli) -> DetectionParameters {
    DetectionParameters {
        scaling_factor: cli.scaling_factor,
        min_size: WindowSize::square(cli.min_size),
        max_size: WindowSize::square(cli.max_size),
        scan_mode: parse_scan_mode(&cli.scan_mode),
        weight_calibration: match cli.scale_weight {
            Some(w) => WeightCalibration::Fixed(w),
            None => WeightCalibration::InverseWindowArea,
        },
        step_factor: cli.step_factor,
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if !is_image(&cli.input) {
        return Err(format!(
            "Input must be an image ({}), got {}",
            IMAGE_EXTENSIONS.join(", "),
            cli.input.display()
        )
        .into());
    }
    if !cli.cascade.exists() {
        return Err(format!("Cascade file not found: {}", cli.cascade.display()).into());
    }
    if !cli.scaling_factor.is_finite() || cli.scaling_factor <= 1.0 {
        return Err(format!(
            "Scaling factor must be greater than 1.0, got {}",
            cli.scaling_factor
        )
        .into());
    }
    if cli.min_size == 0 || cli.min_size > cli.max_size {
        return Err(format!(
            "Window sizes must satisfy 0 < min-size <= max-size, got {} and {}",
            cli.min_size, cli.max_size
        )
        .into());
    }
    if cli.scan_mode != "larger-to-smaller" && cli.scan_mode != "smaller-to-larger" {
        return Err(format!(
            "Scan mode must be 'larger-to-smaller' or 'smaller-to-larger', got '{}'",
            cli.scan_mode
        )
        .into());
    }
    if cli.backend != "sequential" && cli.backend != "accelerator" {
        return Err(format!(
            "Backend must be 'sequential' or 'accelerator', got '{}'",
            cli.backend
        )
        .into());
    }
    if cli.workers == 0 {
        return Err("Workers must be at least 1".into());
    }
    if !cli.step_factor.is_finite() || cli.step_factor <= 0.0 {
        return Err(format!("Step factor must be positive, got {}", cli.step_factor).into());
    }
    if let Some(w) = cli.scale_weight {
        if !w.is_finite() {
            return Err(format!("Scale weight must be finite, got {w}").into());
        }
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn parse_scan_mode(mode: &str) -> ScanMode {
    if mode == "smaller-to-larger" {
        ScanMode::SmallerToLarger
    } else {
        ScanMode::LargerToSmaller
    }
}

fn parse_backend(backend: &str) -> BackendKind {
    if backend == "accelerator" {
        BackendKind::Accelerator
    } else {
        BackendKind::Sequential
    }
}
