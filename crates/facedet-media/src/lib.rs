#![deny(unreachable_patterns)]
//! RetinaFace detection pipeline.
//!
//! This crate provides:
//! - Pixel format handling and validated raw-buffer views
//! - Nearest-neighbour letterboxing into a reusable canvas, with
//!   runtime-selected SIMD channel splitting
//! - Prior (anchor) generation for the RetinaFace output grid
//! - Output decoding, greedy NMS and landmark-based head pose
//! - An ONNX Runtime inference engine behind a pluggable trait
//! - The end-to-end `FaceDetector` writing 18-float detection records

pub mod canvas;
pub mod config;
pub mod cpu_features;
pub mod decode;
pub mod detector;
pub mod error;
pub mod frame;
pub mod inference;
pub mod letterbox;
pub mod metrics;
pub mod nms;
pub mod pixel_format;
pub mod pose;
pub mod priors;

pub use canvas::{Canvas, FilledCanvas};
pub use config::DetectorConfig;
pub use cpu_features::{CpuFeatures, KernelTier};
pub use decode::{DetectionDecoder, OutputLayout, RawOutputs};
pub use detector::FaceDetector;
pub use error::{DetectError, DetectResult, ErrorKind};
pub use frame::FrameView;
pub use inference::{InferenceEngine, OptimizationLevel, OrtEngine, SessionSettings};
pub use letterbox::{LetterboxMeta, SplitKernel};
pub use pixel_format::PixelFormat;
pub use priors::{AnchorConfig, AnchorLevel, Prior, PriorTable};
