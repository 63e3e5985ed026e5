//! Error Handling Module
//!
//! Defines the error type shared by every part of the mask classifier.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for mask classifier operations
#[derive(Error, Debug)]
pub enum MaskClassifierError {
    /// Unknown registry name or invalid hyperparameter, raised before training starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// Batch dimensions of images and labels disagree
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Loss became NaN or infinite
    #[error("Numeric instability at epoch {epoch}, batch {batch}: loss = {value}")]
    NumericInstability {
        epoch: usize,
        batch: usize,
        value: f64,
    },

    /// Checkpoint or artifact could not be written
    #[error("Resource error: {0}")]
    Resource(String),

    /// Error loading or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoadError(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for MaskClassifierError {
    fn from(err: serde_json::Error) -> Self {
        MaskClassifierError::Serialization(err.to_string())
    }
}

/// Convenience Result type for mask classifier operations
pub type Result<T> = std::result::Result<T, MaskClassifierError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| MaskClassifierError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| MaskClassifierError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| MaskClassifierError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| MaskClassifierError::InvalidInput(f()))
    }
}
