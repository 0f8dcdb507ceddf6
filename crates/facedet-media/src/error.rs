//! Error types for the detection pipeline.

use facedet_models::RecordError;
use thiserror::Error;

/// Result type for detection operations.
pub type DetectResult<T> = Result<T, DetectError>;

/// Errors that can occur while preparing input, running the model or decoding output.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("Output '{output}' has {actual} elements, expected {expected}")]
    ShapeMismatch {
        output: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Degenerate landmark geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fieldless failure class, for callers that only need to branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    UnsupportedFormat,
    ShapeMismatch,
    DegenerateGeometry,
    ModelNotFound,
    Inference,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::ShapeMismatch => "shape_mismatch",
            ErrorKind::DegenerateGeometry => "degenerate_geometry",
            ErrorKind::ModelNotFound => "model_not_found",
            ErrorKind::Inference => "inference",
            ErrorKind::Io => "io",
        }
    }
}

impl DetectError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an unsupported format error.
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat(message.into())
    }

    /// Create a shape mismatch error for a named model output.
    pub fn shape_mismatch(output: &'static str, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            output,
            expected,
            actual,
        }
    }

    /// Create a degenerate geometry error.
    pub fn degenerate_geometry(message: impl Into<String>) -> Self {
        Self::DegenerateGeometry(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an inference failure error.
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectError::InvalidInput(_) => ErrorKind::InvalidInput,
            DetectError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            DetectError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            DetectError::DegenerateGeometry(_) => ErrorKind::DegenerateGeometry,
            DetectError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            DetectError::Inference(_) => ErrorKind::Inference,
            DetectError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<RecordError> for DetectError {
    fn from(err: RecordError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
