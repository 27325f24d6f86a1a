//! Error Handling Module
//!
//! Defines the error type shared by the splitter, the lazy dataset and the
//! training routine. Uses thiserror for ergonomic error definitions.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for folder_finetune operations
#[derive(Error, Debug)]
pub enum FinetuneError {
    /// Missing root directory, unreadable directory or image file
    #[error("Filesystem error at '{path}': {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest line that cannot be split into path and label
    #[error("Parse error in '{path}' line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Index outside [0, len)
    #[error("Index {index} out of bounds for dataset of size {len}")]
    OutOfBounds { index: usize, len: usize },

    /// Requested split sizes cannot be satisfied
    #[error("Split size error: {0}")]
    SplitSize(String),

    /// Label missing from a label index
    #[error("Unknown label '{0}'")]
    UnknownLabel(String),

    /// Image could not be decoded
    #[error("Failed to decode image at '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Items that cannot be stacked into one batch
    #[error("Batch error: {0}")]
    Batch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error with model construction or weight loading
    #[error("Model error: {0}")]
    Model(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FinetuneError {
    /// Wrap an io error with the path it occurred on
    pub fn filesystem(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build a parse error for a manifest line (1-based)
    pub fn parse(path: impl AsRef<Path>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

/// Convenience Result type for folder_finetune operations
pub type Result<T> = std::result::Result<T, FinetuneError>;

/// Extension trait attaching a path to io results
pub trait IoResultExt<T> {
    /// Convert an io error into [`FinetuneError::Filesystem`] for `path`
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| FinetuneError::filesystem(path, e))
    }
}
