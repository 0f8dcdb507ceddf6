//! RetinaFace model variants.
//!
//! The same 320x320 network ships in three precisions:
//!
//! - `Fp32`: full precision (default)
//! - `Fp16`: half precision weights
//! - `Int8`: quantized weights, smallest and fastest on CPU

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Precision variant of the RetinaFace model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// 32-bit float weights.
    #[default]
    Fp32,

    /// 16-bit float weights.
    Fp16,

    /// 8-bit quantized weights.
    Int8,
}

impl ModelVariant {
    /// All available variants.
    pub const ALL: &'static [ModelVariant] =
        &[ModelVariant::Fp32, ModelVariant::Fp16, ModelVariant::Int8];

    /// Returns the variant name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::Fp32 => "fp32",
            ModelVariant::Fp16 => "fp16",
            ModelVariant::Int8 => "int8",
        }
    }

    /// File name of the ONNX model for this variant.
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelVariant::Fp32 => "RetinaFace320_FP32.onnx",
            ModelVariant::Fp16 => "RetinaFace320_FP16.onnx",
            ModelVariant::Int8 => "RetinaFace320_INT8.onnx",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = ModelVariantParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fp32" | "float32" => Ok(ModelVariant::Fp32),
            "fp16" | "float16" | "half" => Ok(ModelVariant::Fp16),
            "int8" | "quantized" => Ok(ModelVariant::Int8),
            _ => Err(ModelVariantParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown model variant: {0}")]
pub struct ModelVariantParseError(String);
