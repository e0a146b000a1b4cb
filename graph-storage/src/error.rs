//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, loading, or saving an inference model.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Model file does not exist: {}", .0.display())]
    MissingModelFile(PathBuf),

    #[error("Parameter file does not exist: {}", .0.display())]
    MissingParamFile(PathBuf),

    #[error("Parameter not found in scope: {0}")]
    MissingParameter(String),

    #[error("Variable not declared in graph: {0}")]
    UndeclaredVar(String),

    #[error("Shape mismatch for '{name}': expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<i64>,
        got: Vec<usize>,
    },

    #[error("Buffer size mismatch for shape {shape:?}: expected {expected} values, got {got}")]
    BufferSize {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },

    #[error("{dtype} size mismatch: expected {expected} bytes, got {got}")]
    ByteSize {
        dtype: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Unsupported dtype: {0}. Only F32, F16, BF16 supported.")]
    UnsupportedDtype(String),

    #[error("Axis {axis} out of range for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    #[error("Index {index} out of range for axis of size {size}")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("Cannot remove all {size} entries along axis {axis}")]
    EmptyAxis { axis: usize, size: usize },

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model file {}: {source}", path.display())]
    ModelFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("SafeTensors error in {}: {message}", path.display())]
    SafeTensors { path: PathBuf, message: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn safetensors(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::SafeTensors {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
