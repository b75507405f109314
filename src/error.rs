//! Error types for the background removal service

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Error types covering the adapter, compositor, storage, and HTTP layers
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode or pixel-manipulation errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Bad or missing request input
    #[error("{0}")]
    Validation(String),

    /// Engine name not recognized by the adapter
    #[error("Unknown engine: {0}. Use 'withoutbg' or 'rembg'")]
    UnknownEngine(String),

    /// A referenced file does not exist (or escapes the results directory)
    #[error("{0}")]
    NotFound(String),

    /// Model loading or session construction errors
    #[error("Model error: {0}")]
    Model(String),

    /// Inference or compositing failures
    #[error("Processing error: {0}")]
    Processing(String),
}

impl CutoutError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path.as_ref().display(), error),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = CutoutError::validation("missing field");
        assert!(matches!(err, CutoutError::Validation(_)));

        let err = CutoutError::model("weights truncated");
        assert!(matches!(err, CutoutError::Model(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CutoutError::UnknownEngine("pixie".to_string());
        assert_eq!(
            err.to_string(),
            "Unknown engine: pixie. Use 'withoutbg' or 'rembg'"
        );

        let err = CutoutError::not_found("File not found");
        assert_eq!(err.to_string(), "File not found");
    }

    #[test]
    fn test_file_io_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = CutoutError::file_io_error("write upload", Path::new("/srv/media/x.png"), &io_error);
        let rendered = err.to_string();
        assert!(rendered.contains("write upload"));
        assert!(rendered.contains("/srv/media/x.png"));
    }
}
