//! Face detection command-line tool.
//!
//! Loads an image, runs the RetinaFace detector and prints the detections as
//! JSON in source-image pixel coordinates.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use facedet_media::{CpuFeatures, DetectorConfig, FaceDetector, OutputLayout, PixelFormat};
use facedet_models::{Detection, ModelVariant, RECORD_LEN};

/// Detect faces in an image file with a RetinaFace ONNX model.
#[derive(Parser, Debug)]
#[command(name = "facedet")]
#[command(about = "Detect faces, landmarks and head pose in an image")]
struct Args {
    /// Image to analyze (PNG, JPEG, ...)
    image: PathBuf,

    /// RetinaFace ONNX model file (overrides FACEDET_MODEL_PATH)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Bundled model variant to look up when no model path is given
    #[arg(long)]
    variant: Option<ModelVariant>,

    /// Maximum number of faces to report
    #[arg(short, long, default_value_t = 10)]
    limit: usize,

    /// Minimum reported face quality (overrides FACEDET_CONFIDENCE_THRESHOLD)
    #[arg(long)]
    confidence: Option<f32>,

    /// Flattening of the model outputs: prior_major or channel_major
    #[arg(long)]
    layout: Option<OutputLayout>,

    /// ONNX Runtime intra-op threads
    #[arg(long)]
    threads: Option<usize>,

    /// Use the scalar channel-split kernel
    #[arg(long)]
    scalar: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("facedet=info,facedet_media=info,ort=warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true),
            )
            .with(env_filter)
            .init();
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let mut config = DetectorConfig::from_env();
    if let Some(model) = args.model {
        config.model_path = Some(model);
    }
    if let Some(variant) = args.variant {
        config.model_variant = variant;
    }
    if let Some(confidence) = args.confidence {
        config.confidence_threshold = confidence;
    }
    if let Some(layout) = args.layout {
        config.output_layout = layout;
    }
    if let Some(threads) = args.threads {
        config.session.intra_threads = threads;
    }
    config.force_scalar |= args.scalar;

    CpuFeatures::detect().log_capabilities();

    let image = image::open(&args.image)
        .with_context(|| format!("failed to open image {}", args.image.display()))?
        .to_rgba8();
    let (width, height) = (image.width() as usize, image.height() as usize);
    info!(image = %args.image.display(), width, height, "Image loaded");

    let mut detector = FaceDetector::from_config(config).context("failed to create detector")?;

    let mut records = vec![0.0f32; args.limit * RECORD_LEN];
    let count = detector
        .detect_into(
            image.as_raw(),
            width,
            height,
            width * 4,
            PixelFormat::Rgba,
            args.limit,
            &mut records,
        )
        .context("face detection failed")?;

    let detections = records
        .chunks_exact(RECORD_LEN)
        .take(count)
        .map(Detection::from_record)
        .collect::<Result<Vec<_>, _>>()?;

    info!(faces = detections.len(), "Detection finished");

    let json = if args.pretty {
        serde_json::to_string_pretty(&detections)?
    } else {
        serde_json::to_string(&detections)?
    };
    println!("{json}");

    Ok(())
}
