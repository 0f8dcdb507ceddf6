//! RetinaFace output decoding.
//!
//! Turns the three raw output tensors into candidate detections in canvas
//! pixel coordinates:
//!
//! ```text
//! adj_x = cx + 0.1 * dx * pw           adj_y = cy + 0.1 * dy * ph
//! w     = pw * exp(0.2 * dw)           h     = ph * exp(0.2 * dh)
//! box   = ((adj_x - w/2) * W, (adj_y - h/2) * H, w * W, h * H)
//! lm_k  = ((cx + 0.1 * lx_k * pw) * W, (cy + 0.1 * ly_k * ph) * H)
//! ```

use facedet_models::{Detection, Point, Rect, LANDMARK_COUNT};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::{DetectError, DetectResult};
use crate::pose;
use crate::priors::PriorTable;

/// Values per prior in the `boxes` output (dx, dy, dw, dh).
pub const BOX_VALUES: usize = 4;
/// Values per prior in the `scores` output (background, face).
pub const SCORE_VALUES: usize = 2;
/// Values per prior in the `landmarks` output (5 x (dx, dy)).
pub const LANDMARK_VALUES: usize = LANDMARK_COUNT * 2;

/// Variance applied to center offsets.
pub const CENTER_VARIANCE: f32 = 0.1;
/// Variance applied to log-scale size offsets.
pub const SIZE_VARIANCE: f32 = 0.2;
/// Default minimum face-class score.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.3;

const FACE_CLASS: usize = 1;

/// Flattening of the `[1, priors, K]` model outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// Value `c` of prior `i` at `i * K + c` (row-major `[1, priors, K]`).
    #[default]
    PriorMajor,
    /// All values of channel `c` contiguous, at `c * priors + i`.
    ChannelMajor,
}

impl OutputLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputLayout::PriorMajor => "prior_major",
            OutputLayout::ChannelMajor => "channel_major",
        }
    }
}

impl fmt::Display for OutputLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputLayout {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prior_major" | "prior" => Ok(OutputLayout::PriorMajor),
            "channel_major" | "channel" => Ok(OutputLayout::ChannelMajor),
            _ => Err(DetectError::invalid_input(format!(
                "unknown output layout '{}'",
                s
            ))),
        }
    }
}

/// Raw model outputs, flattened. Reused across calls by the detector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutputs {
    pub boxes: Vec<f32>,
    pub scores: Vec<f32>,
    pub landmarks: Vec<f32>,
}

impl RawOutputs {
    /// Buffers sized for `prior_count` priors.
    pub fn with_capacity(prior_count: usize) -> Self {
        Self {
            boxes: Vec::with_capacity(prior_count * BOX_VALUES),
            scores: Vec::with_capacity(prior_count * SCORE_VALUES),
            landmarks: Vec::with_capacity(prior_count * LANDMARK_VALUES),
        }
    }

    /// Empty all three buffers, keeping their allocations.
    pub fn clear(&mut self) {
        self.boxes.clear();
        self.scores.clear();
        self.landmarks.clear();
    }

    /// True when the model produced no predictions at all.
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() && self.scores.is_empty() && self.landmarks.is_empty()
    }
}

/// Decodes raw outputs against a shared prior table.
#[derive(Debug, Clone)]
pub struct DetectionDecoder {
    priors: Arc<PriorTable>,
    score_threshold: f32,
    layout: OutputLayout,
    image_width: f32,
    image_height: f32,
}

impl DetectionDecoder {
    /// Decoder producing coordinates in pixels of the prior table's canvas.
    pub fn new(priors: Arc<PriorTable>) -> Self {
        let image_width = priors.width() as f32;
        let image_height = priors.height() as f32;
        Self {
            priors,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            layout: OutputLayout::default(),
            image_width,
            image_height,
        }
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Scale normalized coordinates to a `width x height` image instead.
    pub fn with_image_size(mut self, width: f32, height: f32) -> Self {
        self.image_width = width;
        self.image_height = height;
        self
    }

    pub fn priors(&self) -> &Arc<PriorTable> {
        &self.priors
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_threshold
    }

    /// Decode every prior whose face score reaches the threshold.
    ///
    /// An empty `scores` output means the model made no predictions and
    /// decodes to an empty list; the other outputs are not inspected.
    ///
    /// # Errors
    /// `ShapeMismatch` when an output's length is not `priors x K`.
    pub fn decode(&self, outputs: &RawOutputs) -> DetectResult<Vec<Detection>> {
        if outputs.scores.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let boxes = self.view(&outputs.boxes, BOX_VALUES, "boxes")?;
        let scores = self.view(&outputs.scores, SCORE_VALUES, "scores")?;
        let landmarks = self.view(&outputs.landmarks, LANDMARK_VALUES, "landmarks")?;

        let (img_w, img_h) = (self.image_width, self.image_height);
        let mut detections = Vec::new();

        for (i, prior) in self.priors.priors().iter().enumerate() {
            let score = scores[[i, FACE_CLASS]];
            if score.is_nan() || score < self.score_threshold {
                continue;
            }

            let adj_x = prior.cx + CENTER_VARIANCE * boxes[[i, 0]] * prior.width;
            let adj_y = prior.cy + CENTER_VARIANCE * boxes[[i, 1]] * prior.height;
            let w = prior.width * (SIZE_VARIANCE * boxes[[i, 2]]).exp();
            let h = prior.height * (SIZE_VARIANCE * boxes[[i, 3]]).exp();

            let bounds = Rect::new(
                (adj_x - w / 2.0) * img_w,
                (adj_y - h / 2.0) * img_h,
                w * img_w,
                h * img_h,
            );

            let mut points = [Point::default(); LANDMARK_COUNT];
            for (k, point) in points.iter_mut().enumerate() {
                let lx = landmarks[[i, 2 * k]];
                let ly = landmarks[[i, 2 * k + 1]];
                *point = Point::new(
                    (prior.cx + CENTER_VARIANCE * lx * prior.width) * img_w,
                    (prior.cy + CENTER_VARIANCE * ly * prior.height) * img_h,
                );
            }

            let angle = pose::estimate_lenient(&points);
            detections.push(Detection::new(score, bounds, points, angle));
        }

        debug!(
            priors = self.priors.len(),
            candidates = detections.len(),
            layout = %self.layout,
            elapsed_ms = format!("{:.3}", start.elapsed().as_secs_f64() * 1000.0),
            "Decoded model outputs"
        );

        Ok(detections)
    }

    /// View `data` as `[priors, k]` regardless of the flattening.
    fn view<'a>(
        &self,
        data: &'a [f32],
        k: usize,
        output: &'static str,
    ) -> DetectResult<ArrayView2<'a, f32>> {
        let n = self.priors.len();
        let expected = n * k;
        if data.len() != expected {
            return Err(DetectError::shape_mismatch(output, expected, data.len()));
        }

        let view = match self.layout {
            OutputLayout::PriorMajor => ArrayView2::from_shape((n, k), data),
            OutputLayout::ChannelMajor => {
                ArrayView2::from_shape((k, n), data).map(|v| v.reversed_axes())
            }
        };
        view.map_err(|_| DetectError::shape_mismatch(output, expected, data.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn decoder() -> DetectionDecoder {
        DetectionDecoder::new(Arc::new(PriorTable::for_canvas(320).unwrap()))
    }

    fn zeros(n: usize) -> RawOutputs {
        RawOutputs {
            boxes: vec![0.0; n * BOX_VALUES],
            scores: vec![0.0; n * SCORE_VALUES],
            landmarks: vec![0.0; n * LANDMARK_VALUES],
        }
    }

    #[test]
    fn test_all_below_threshold_is_empty() {
        let dec = decoder();
        let mut out = zeros(dec.priors().len());
        for i in 0..dec.priors().len() {
            out.scores[i * 2 + 1] = 0.29;
        }
        assert!(dec.decode(&out).unwrap().is_empty());
    }

    #[test]
    fn test_empty_outputs_are_no_predictions() {
        assert!(decoder().decode(&RawOutputs::default()).unwrap().is_empty());
    }

    #[test]
    fn test_empty_scores_ignore_other_outputs() {
        let dec = decoder();
        let out = RawOutputs {
            boxes: Vec::new(),
            scores: Vec::new(),
            landmarks: vec![0.0; dec.priors().len() * LANDMARK_VALUES],
        };
        assert!(dec.decode(&out).unwrap().is_empty());
    }

    #[test]
    fn test_empty_boxes_with_scores_is_shape_mismatch() {
        let dec = decoder();
        let mut out = zeros(dec.priors().len());
        out.boxes.clear();
        let err = dec.decode(&out).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert!(err.to_string().contains("boxes"));
    }

    #[test]
    fn test_shape_mismatch() {
        let dec = decoder();
        let mut out = zeros(dec.priors().len());
        out.landmarks.pop();
        let err = dec.decode(&out).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert!(err.to_string().contains("landmarks"));
    }

    #[test]
    fn test_zero_deltas_reproduce_prior() {
        let dec = decoder();
        let mut out = zeros(dec.priors().len());
        // Prior 0: center (4, 4) px, size 16 px
        out.scores[1] = 0.9;
        let dets = dec.decode(&out).unwrap();
        assert_eq!(dets.len(), 1);

        let d = dets[0];
        assert_eq!(d.score, 0.9);
        assert_eq!(d.quality, 0.9);
        assert!((d.bounds.x - (-4.0)).abs() < 1e-4);
        assert!((d.bounds.y - (-4.0)).abs() < 1e-4);
        assert!((d.bounds.width - 16.0).abs() < 1e-4);
        for p in d.landmarks {
            assert!((p.x - 4.0).abs() < 1e-4);
            assert!((p.y - 4.0).abs() < 1e-4);
        }
        // Collinear landmarks: pitch falls back to 0
        assert_eq!(d.angle.pitch, 0.0);
    }

    #[test]
    fn test_delta_formulas() {
        let dec = decoder();
        let n = dec.priors().len();
        let mut out = zeros(n);
        // Prior 3200: first stride-16 prior, center (8, 8) px, size 64 px
        let i = 3200;
        out.scores[i * 2 + 1] = 0.5;
        out.boxes[i * 4..i * 4 + 4].copy_from_slice(&[1.0, -1.0, 0.5, 0.0]);
        out.landmarks[i * 10] = 2.0;

        let d = dec.decode(&out).unwrap()[0];
        let pw = 64.0 / 320.0;
        let cx = 8.0 / 320.0;
        let w = pw * (0.2f32 * 0.5).exp();
        let adj_x = cx + 0.1 * pw;
        assert!((d.bounds.width - w * 320.0).abs() < 1e-3);
        assert!((d.bounds.x - (adj_x - w / 2.0) * 320.0).abs() < 1e-3);
        assert!((d.bounds.height - 64.0).abs() < 1e-3);
        assert!((d.bounds.y - ((cx - 0.1 * pw) - pw / 2.0) * 320.0).abs() < 1e-3);
        assert!((d.landmarks[0].x - (cx + 0.2 * pw) * 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_channel_major_matches_prior_major() {
        let dec = decoder();
        let n = dec.priors().len();
        let mut prior_major = zeros(n);
        for i in (0..n).step_by(97) {
            prior_major.scores[i * 2 + 1] = 0.3 + (i % 7) as f32 * 0.1;
            for c in 0..BOX_VALUES {
                prior_major.boxes[i * 4 + c] = (i + c) as f32 * 0.001;
            }
            for c in 0..LANDMARK_VALUES {
                prior_major.landmarks[i * 10 + c] = (c as f32 - 5.0) * 0.3;
            }
        }

        let transpose = |data: &[f32], k: usize| {
            let mut t = vec![0.0; data.len()];
            for i in 0..n {
                for c in 0..k {
                    t[c * n + i] = data[i * k + c];
                }
            }
            t
        };
        let channel_major = RawOutputs {
            boxes: transpose(&prior_major.boxes, BOX_VALUES),
            scores: transpose(&prior_major.scores, SCORE_VALUES),
            landmarks: transpose(&prior_major.landmarks, LANDMARK_VALUES),
        };

        let a = dec.decode(&prior_major).unwrap();
        let b = dec
            .clone()
            .with_layout(OutputLayout::ChannelMajor)
            .decode(&channel_major)
            .unwrap();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_layout_parse() {
        assert_eq!(
            "channel_major".parse::<OutputLayout>().unwrap(),
            OutputLayout::ChannelMajor
        );
        assert!("nchw".parse::<OutputLayout>().is_err());
    }
}
