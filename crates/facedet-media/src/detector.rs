//! End-to-end face detector.
//!
//! Raw buffer -> letterboxed planar tensor -> inference -> decode -> NMS,
//! with detections mapped back into source-image pixels.
//!
//! # Usage
//! ```rust,no_run
//! use facedet_media::{DetectorConfig, FaceDetector, PixelFormat};
//!
//! let mut detector = FaceDetector::from_config(DetectorConfig::from_env())?;
//! let pixels = vec![0u8; 640 * 480 * 4];
//! let mut records = vec![0.0f32; 10 * facedet_models::RECORD_LEN];
//! let written = detector.detect_into(&pixels, 640, 480, 640 * 4, PixelFormat::Rgba, 10, &mut records)?;
//! println!("{written} faces");
//! # Ok::<(), facedet_media::DetectError>(())
//! ```

use facedet_models::{Detection, RECORD_LEN};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::canvas::Canvas;
use crate::config::DetectorConfig;
use crate::decode::{DetectionDecoder, RawOutputs};
use crate::error::{DetectError, DetectResult};
use crate::frame::FrameView;
use crate::inference::{InferenceEngine, OrtEngine};
use crate::letterbox::SplitKernel;
use crate::metrics::{self, Stage};
use crate::nms;
use crate::pixel_format::PixelFormat;
use crate::priors::PriorTable;

/// Face detector owning its scratch buffers and inference engine.
///
/// One instance serves one thread at a time. Several instances can share a
/// prior table through [`FaceDetector::with_priors`].
pub struct FaceDetector<E: InferenceEngine> {
    config: DetectorConfig,
    canvas: Canvas,
    decoder: DetectionDecoder,
    engine: E,
    outputs: RawOutputs,
}

impl FaceDetector<OrtEngine> {
    /// Load the configured RetinaFace model and build a detector around it.
    pub fn from_config(config: DetectorConfig) -> DetectResult<Self> {
        config.validate()?;
        let model_path = config.resolve_model_path()?;
        let engine = OrtEngine::load(&model_path, &config.session)?;
        Self::with_engine(config, engine)
    }
}

impl<E: InferenceEngine> FaceDetector<E> {
    /// Build a detector around an existing engine.
    pub fn with_engine(config: DetectorConfig, engine: E) -> DetectResult<Self> {
        config.validate()?;
        let priors = PriorTable::build(config.target_size, config.target_size, &config.anchors)?;
        Self::with_priors(config, engine, Arc::new(priors))
    }

    /// Build a detector that reuses an already built prior table.
    pub fn with_priors(
        config: DetectorConfig,
        engine: E,
        priors: Arc<PriorTable>,
    ) -> DetectResult<Self> {
        config.validate()?;
        if priors.width() != config.target_size || priors.height() != config.target_size {
            return Err(DetectError::invalid_input(format!(
                "prior table is {}x{}, canvas is {}x{}",
                priors.width(),
                priors.height(),
                config.target_size,
                config.target_size
            )));
        }

        let kernel = if config.force_scalar {
            SplitKernel::scalar()
        } else {
            SplitKernel::detect()
        };
        let canvas = Canvas::new(config.target_size, kernel, config.parallel_threshold)?;
        let outputs = RawOutputs::with_capacity(priors.len());
        let decoder = DetectionDecoder::new(priors)
            .with_score_threshold(config.score_threshold)
            .with_layout(config.output_layout);

        info!(
            target_size = config.target_size,
            priors = decoder.priors().len(),
            kernel = %kernel.tier(),
            layout = %config.output_layout,
            score_threshold = config.score_threshold,
            iou_threshold = config.iou_threshold,
            confidence_threshold = config.confidence_threshold,
            max_faces = config.max_faces,
            "Face detector ready"
        );

        Ok(Self {
            config,
            canvas,
            decoder,
            engine,
            outputs,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Prior table, for sharing with other detectors.
    pub fn priors(&self) -> &Arc<PriorTable> {
        self.decoder.priors()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Detect up to `limit` faces, in source-image pixel coordinates.
    ///
    /// Faces surviving NMS with a quality below `confidence_threshold` are
    /// dropped, so fewer than `limit` may be returned even when more
    /// candidates passed the score threshold.
    ///
    /// # Errors
    /// `InvalidInput` when `limit` is 0 or above `max_faces`; engine and
    /// decoding errors are passed through unchanged.
    pub fn detect(&mut self, frame: &FrameView<'_>, limit: usize) -> DetectResult<Vec<Detection>> {
        let result = self.run_pipeline(frame, limit);
        match &result {
            Ok(detections) => metrics::record_detect(detections.len()),
            Err(e) => {
                warn!(error = %e, kind = e.kind().as_str(), "Face detection failed");
                metrics::record_failure(e.kind());
            }
        }
        result
    }

    /// Host call surface: detect faces in a raw buffer and write up to `limit`
    /// 18-float records into `out`. Returns the number of records written.
    ///
    /// Nothing is written to `out` unless the whole call succeeds.
    #[allow(clippy::too_many_arguments)]
    pub fn detect_into(
        &mut self,
        data: &[u8],
        width: usize,
        height: usize,
        stride: usize,
        format: PixelFormat,
        limit: usize,
        out: &mut [f32],
    ) -> DetectResult<usize> {
        let needed = limit.saturating_mul(RECORD_LEN);
        if out.len() < needed {
            let err = DetectError::invalid_input(format!(
                "output buffer holds {} floats, {} detections need {}",
                out.len(),
                limit,
                needed
            ));
            metrics::record_failure(err.kind());
            return Err(err);
        }

        let frame = match FrameView::new(data, width, height, stride, format) {
            Ok(frame) => frame,
            Err(e) => {
                metrics::record_failure(e.kind());
                return Err(e);
            }
        };

        let detections = self.detect(&frame, limit)?;
        for (det, record) in detections.iter().zip(out.chunks_exact_mut(RECORD_LEN)) {
            det.write_record(record)?;
        }
        Ok(detections.len())
    }

    fn check_limit(&self, limit: usize) -> DetectResult<()> {
        if limit == 0 || limit > self.config.max_faces {
            return Err(DetectError::invalid_input(format!(
                "limit {} is outside 1..={}",
                limit, self.config.max_faces
            )));
        }
        Ok(())
    }

    fn run_pipeline(&mut self, frame: &FrameView<'_>, limit: usize) -> DetectResult<Vec<Detection>> {
        self.check_limit(limit)?;
        let total = Instant::now();
        let size = self.config.target_size;

        let start = Instant::now();
        let filled = self.canvas.fill(frame);
        let meta = *filled.meta();
        metrics::record_stage_duration(Stage::Preprocess, start.elapsed().as_secs_f64());

        let start = Instant::now();
        self.engine.run(filled.tensor(), size, &mut self.outputs)?;
        metrics::record_stage_duration(Stage::Inference, start.elapsed().as_secs_f64());

        let start = Instant::now();
        let candidates = self.decoder.decode(&self.outputs)?;
        let candidate_count = candidates.len();
        metrics::record_stage_duration(Stage::Decode, start.elapsed().as_secs_f64());

        let start = Instant::now();
        let mut kept = nms::suppress(candidates, self.config.iou_threshold, limit);
        let suppressed_count = kept.len();
        kept.retain(|d| d.quality >= self.config.confidence_threshold);
        metrics::record_stage_duration(Stage::Suppress, start.elapsed().as_secs_f64());

        let detections: Vec<Detection> = kept.iter().map(|d| d.unscale(meta.scale)).collect();

        debug!(
            source = format!("{}x{}", frame.width(), frame.height()),
            scale = meta.scale,
            candidates = candidate_count,
            after_nms = suppressed_count,
            kept = detections.len(),
            limit,
            elapsed_ms = format!("{:.3}", total.elapsed().as_secs_f64() * 1000.0),
            "Detection complete"
        );

        Ok(detections)
    }
}
