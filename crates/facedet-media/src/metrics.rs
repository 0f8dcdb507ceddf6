//! Detection metrics.
//!
//! Recorded through the `metrics` facade; the host application decides
//! whether and where to export them.

use metrics::{counter, histogram};

use crate::error::ErrorKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const DETECT_CALLS_TOTAL: &str = "facedet_detect_calls_total";
    pub const FACES_DETECTED_TOTAL: &str = "facedet_faces_detected_total";
    pub const DETECT_FAILURES_TOTAL: &str = "facedet_detect_failures_total";
    pub const STAGE_DURATION_SECONDS: &str = "facedet_stage_duration_seconds";
}

/// Pipeline stages timed by [`record_stage_duration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Inference,
    Decode,
    Suppress,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Preprocess => "preprocess",
            Stage::Inference => "inference",
            Stage::Decode => "decode",
            Stage::Suppress => "suppress",
        }
    }
}

/// Record a completed detect call.
pub fn record_detect(faces: usize) {
    counter!(names::DETECT_CALLS_TOTAL).increment(1);
    counter!(names::FACES_DETECTED_TOTAL).increment(faces as u64);
}

/// Record a failed detect call.
pub fn record_failure(kind: ErrorKind) {
    let labels = [("kind", kind.as_str().to_string())];
    counter!(names::DETECT_FAILURES_TOTAL, &labels).increment(1);
}

/// Record the duration of one pipeline stage.
pub fn record_stage_duration(stage: Stage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}
