//! Detector configuration.

use facedet_models::ModelVariant;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::decode::{OutputLayout, DEFAULT_SCORE_THRESHOLD};
use crate::error::{DetectError, DetectResult};
use crate::inference::{find_model_path, OptimizationLevel, SessionSettings};
use crate::nms::DEFAULT_IOU_THRESHOLD;
use crate::priors::AnchorConfig;

/// Side length of the RetinaFace input canvas.
pub const DEFAULT_TARGET_SIZE: usize = 320;

/// Upper bound on detections returned by one call.
pub const DEFAULT_MAX_FACES: usize = 100;

/// Minimum quality for a detection to be reported after suppression.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Canvas pixel count above which resampling and splitting run on rayon.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 10_000;

/// Face detector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Square canvas side length in pixels
    pub target_size: usize,
    /// Minimum face-class score for a prior to become a candidate
    pub score_threshold: f32,
    /// IoU at or above which NMS drops the lower-scoring box
    pub iou_threshold: f32,
    /// Detections kept by NMS below this quality are not reported
    pub confidence_threshold: f32,
    /// Largest `limit` a caller may request
    pub max_faces: usize,
    /// Feature-map strides and anchor sizes
    pub anchors: AnchorConfig,
    /// Flattening of the model outputs
    pub output_layout: OutputLayout,
    /// Canvas pixel count above which preprocessing runs in parallel
    pub parallel_threshold: usize,
    /// Explicit model file; takes precedence over `model_variant`
    pub model_path: Option<PathBuf>,
    /// Bundled model variant, looked up in the default model directories
    pub model_variant: ModelVariant,
    /// ONNX Runtime session options
    pub session: SessionSettings,
    /// Always use the scalar channel-split kernel
    pub force_scalar: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_faces: DEFAULT_MAX_FACES,
            anchors: AnchorConfig::default(),
            output_layout: OutputLayout::default(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            model_path: None,
            model_variant: ModelVariant::default(),
            session: SessionSettings::default(),
            force_scalar: false,
        }
    }
}

impl DetectorConfig {
    /// Create config from `FACEDET_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source, falling back to
    /// defaults for missing or unparsable values.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            target_size: parse_or(&var, "FACEDET_TARGET_SIZE", defaults.target_size),
            score_threshold: parse_or(&var, "FACEDET_SCORE_THRESHOLD", defaults.score_threshold),
            iou_threshold: parse_or(&var, "FACEDET_IOU_THRESHOLD", defaults.iou_threshold),
            confidence_threshold: parse_or(
                &var,
                "FACEDET_CONFIDENCE_THRESHOLD",
                defaults.confidence_threshold,
            ),
            max_faces: parse_or(&var, "FACEDET_MAX_FACES", defaults.max_faces),
            anchors: defaults.anchors,
            output_layout: parse_or(&var, "FACEDET_OUTPUT_LAYOUT", defaults.output_layout),
            parallel_threshold: parse_or(
                &var,
                "FACEDET_PARALLEL_THRESHOLD",
                defaults.parallel_threshold,
            ),
            model_path: var("FACEDET_MODEL_PATH").map(PathBuf::from),
            model_variant: parse_or(&var, "FACEDET_MODEL_VARIANT", defaults.model_variant),
            session: SessionSettings {
                intra_threads: parse_or(
                    &var,
                    "FACEDET_INTRA_THREADS",
                    defaults.session.intra_threads,
                ),
                optimization: parse_or::<OptimizationLevel>(
                    &var,
                    "FACEDET_GRAPH_OPTIMIZATION",
                    defaults.session.optimization,
                ),
            },
            force_scalar: var("FACEDET_FORCE_SCALAR")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Reject configurations the detector cannot run with.
    pub fn validate(&self) -> DetectResult<()> {
        if self.target_size == 0 {
            return Err(DetectError::invalid_input("target_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(DetectError::invalid_input(format!(
                "score_threshold {} is outside [0, 1]",
                self.score_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(DetectError::invalid_input(format!(
                "iou_threshold {} is outside [0, 1]",
                self.iou_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DetectError::invalid_input(format!(
                "confidence_threshold {} is outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.max_faces == 0 {
            return Err(DetectError::invalid_input("max_faces must be positive"));
        }
        if self.session.intra_threads == 0 {
            return Err(DetectError::invalid_input("intra_threads must be positive"));
        }
        self.anchors.validate()
    }

    /// Model file to load: the explicit path, else the variant found in the
    /// default model directories.
    pub fn resolve_model_path(&self) -> DetectResult<PathBuf> {
        if let Some(path) = &self.model_path {
            return Ok(path.clone());
        }
        find_model_path(self.model_variant).ok_or_else(|| {
            DetectError::model_not_found(format!(
                "{} not found in default model directories",
                self.model_variant.file_name()
            ))
        })
    }
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}
