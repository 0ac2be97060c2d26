// ============================================================================
// focus-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Error types for the focus-core library
//
// KEY COMPONENTS:
// - CoreError: every failure the reconstruction pipeline can report
// - CoreResult: result alias used throughout the crate
// - Helper constructors for the most common shape errors

use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for focus-core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid resolution {0}: nside must be a power of two")]
    InvalidResolution(u32),

    #[error("Shape mismatch in {context}: expected {expected} values, got {got}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    #[error("Statistic bundles have incompatible layouts: {0}")]
    ChannelMismatch(String),

    #[error("Statistic bundle has no channel named '{0}'")]
    MissingChannel(String),

    #[error("Noise ensemble '{0}' has no realizations")]
    EmptyEnsemble(String),

    #[error("Noise ensembles disagree on realization count: {left} vs {right}")]
    EnsembleMismatch { left: usize, right: usize },

    #[error("Mask error: {0}")]
    Mask(String),

    #[error("Artifact error at {path}: {message}")]
    Artifact { path: PathBuf, message: String },

    #[error("Optimizer error: {0}")]
    Optimizer(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type for focus-core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Builds a [`CoreError::ShapeMismatch`] for the given context.
pub(crate) fn shape_mismatch(context: impl Into<String>, expected: usize, got: usize) -> CoreError {
    CoreError::ShapeMismatch {
        context: context.into(),
        expected,
        got,
    }
}

/// Builds a [`CoreError::Artifact`] for a file that could not be read or written.
pub(crate) fn artifact_error(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> CoreError {
    CoreError::Artifact {
        path: path.into(),
        message: message.to_string(),
    }
}
