//! Inference collaborator.
//!
//! The detector only needs "planar tensor in, three flat arrays out", so the
//! forward pass sits behind [`InferenceEngine`]. [`OrtEngine`] runs the
//! RetinaFace ONNX model through ONNX Runtime; tests script their own engine.

use facedet_models::ModelVariant;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::decode::RawOutputs;
use crate::error::{DetectError, DetectResult};

/// Name of the box-delta output.
pub const BOXES_OUTPUT: &str = "boxes";
/// Name of the class-score output.
pub const SCORES_OUTPUT: &str = "scores";
/// Name of the landmark-delta output.
pub const LANDMARKS_OUTPUT: &str = "landmarks";

/// Runs one forward pass.
pub trait InferenceEngine: Send {
    /// Run the model on a `[1, 3, size, size]` planar tensor and replace the
    /// contents of `outputs` with the flattened results.
    fn run(&mut self, input: &[f32], size: usize, outputs: &mut RawOutputs) -> DetectResult<()>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn run(&mut self, input: &[f32], size: usize, outputs: &mut RawOutputs) -> DetectResult<()> {
        (**self).run(input, size, outputs)
    }
}

/// Graph optimization level, mirroring ONNX Runtime's levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    Disable,
    Basic,
    #[default]
    Extended,
    All,
}

impl OptimizationLevel {
    fn to_ort(self) -> GraphOptimizationLevel {
        match self {
            OptimizationLevel::Disable => GraphOptimizationLevel::Disable,
            OptimizationLevel::Basic => GraphOptimizationLevel::Level1,
            OptimizationLevel::Extended => GraphOptimizationLevel::Level2,
            OptimizationLevel::All => GraphOptimizationLevel::Level3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationLevel::Disable => "disable",
            OptimizationLevel::Basic => "basic",
            OptimizationLevel::Extended => "extended",
            OptimizationLevel::All => "all",
        }
    }
}

impl std::str::FromStr for OptimizationLevel {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" | "none" => Ok(OptimizationLevel::Disable),
            "basic" => Ok(OptimizationLevel::Basic),
            "extended" => Ok(OptimizationLevel::Extended),
            "all" => Ok(OptimizationLevel::All),
            _ => Err(DetectError::invalid_input(format!(
                "unknown optimization level '{}'",
                s
            ))),
        }
    }
}

/// ONNX Runtime session options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Intra-op thread count
    pub intra_threads: usize,
    /// Graph optimization level
    pub optimization: OptimizationLevel,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            intra_threads: 1,
            optimization: OptimizationLevel::Extended,
        }
    }
}

/// ONNX Runtime-backed RetinaFace engine.
pub struct OrtEngine {
    session: Session,
    model_path: PathBuf,
}

impl OrtEngine {
    /// Load the model at `model_path`.
    pub fn load(model_path: &Path, settings: &SessionSettings) -> DetectResult<Self> {
        if !model_path.exists() {
            return Err(DetectError::model_not_found(model_path.display().to_string()));
        }

        let start = Instant::now();
        let model_bytes = std::fs::read(model_path)?;

        let session = Session::builder()
            .map_err(|e| DetectError::inference(format!("ORT session builder: {e}")))?
            .with_optimization_level(settings.optimization.to_ort())
            .map_err(|e| DetectError::inference(format!("ORT opt level: {e}")))?
            .with_intra_threads(settings.intra_threads)
            .map_err(|e| DetectError::inference(format!("ORT intra threads: {e}")))?
            .commit_from_memory(model_bytes.as_slice())
            .map_err(|e| DetectError::inference(format!("ORT load model: {e}")))?;

        info!(
            model = %model_path.display(),
            intra_threads = settings.intra_threads,
            optimization = settings.optimization.as_str(),
            load_ms = start.elapsed().as_millis() as u64,
            "RetinaFace model loaded"
        );

        Ok(Self {
            session,
            model_path: model_path.to_path_buf(),
        })
    }

    /// Load a bundled model variant from `model_dir`.
    pub fn load_variant(
        model_dir: &Path,
        variant: ModelVariant,
        settings: &SessionSettings,
    ) -> DetectResult<Self> {
        Self::load(&model_dir.join(variant.file_name()), settings)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl InferenceEngine for OrtEngine {
    fn run(&mut self, input: &[f32], size: usize, outputs: &mut RawOutputs) -> DetectResult<()> {
        let expected = 3 * size * size;
        if input.len() != expected {
            return Err(DetectError::invalid_input(format!(
                "input tensor has {} values, expected {}",
                input.len(),
                expected
            )));
        }

        let start = Instant::now();
        let shape = vec![1usize, 3, size, size];
        let tensor: Value = Tensor::from_array((shape, input.to_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| DetectError::inference(format!("ORT tensor: {e}")))?;

        let results = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| DetectError::inference(format!("ORT run failed: {e}")))?;

        outputs.clear();
        for (name, target) in [
            (BOXES_OUTPUT, &mut outputs.boxes),
            (SCORES_OUTPUT, &mut outputs.scores),
            (LANDMARKS_OUTPUT, &mut outputs.landmarks),
        ] {
            let value = results
                .get(name)
                .ok_or_else(|| DetectError::inference(format!("ORT returned no '{name}' output")))?;
            let (_, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectError::inference(format!("ORT extract '{name}': {e}")))?;
            target.extend_from_slice(data);
        }

        debug!(
            size,
            boxes = outputs.boxes.len(),
            scores = outputs.scores.len(),
            landmarks = outputs.landmarks.len(),
            elapsed_ms = format!("{:.3}", start.elapsed().as_secs_f64() * 1000.0),
            "Inference complete"
        );

        Ok(())
    }
}

/// Search common locations for a bundled model variant.
pub fn find_model_path(variant: ModelVariant) -> Option<PathBuf> {
    const CANDIDATES: &[&str] = &["./models", "./models/retinaface", "/app/models/retinaface"];

    CANDIDATES
        .iter()
        .map(|dir| Path::new(dir).join(variant.file_name()))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_session_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.intra_threads, 1);
        assert_eq!(settings.optimization, OptimizationLevel::Extended);
    }

    #[test]
    fn test_optimization_level_parse() {
        assert_eq!(
            "ALL".parse::<OptimizationLevel>().unwrap(),
            OptimizationLevel::All
        );
        assert!("level9".parse::<OptimizationLevel>().is_err());
    }

    #[test]
    fn test_missing_model() {
        let err = OrtEngine::load(
            Path::new("/nonexistent/RetinaFace320_FP32.onnx"),
            &SessionSettings::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
    }

    #[test]
    fn test_variant_path() {
        let err = OrtEngine::load_variant(
            Path::new("/nonexistent"),
            ModelVariant::Int8,
            &SessionSettings::default(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("RetinaFace320_INT8.onnx"));
    }
}
