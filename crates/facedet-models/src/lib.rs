//! Shared data models for the face detection pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Canvas and image-space geometry (points, rectangles)
//! - Head pose angles
//! - Face detections and their flat 18-float record encoding
//! - Model variant names

pub mod detection;
pub mod geometry;
pub mod model_variant;

// Re-export common types
pub use detection::{Detection, Landmark, RecordError, LANDMARK_COUNT, RECORD_LEN};
pub use geometry::{EulerAngle, Point, Rect};
pub use model_variant::{ModelVariant, ModelVariantParseError};
