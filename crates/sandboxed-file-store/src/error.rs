//! Error types for the sandboxed file store.

use std::path::PathBuf;

/// Result type for sandboxed file operations.
pub type Result<T> = std::result::Result<T, SandboxedFileError>;

/// Errors that can occur during sandboxed file operations.
#[derive(Debug, thiserror::Error)]
pub enum SandboxedFileError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Path validation failed - potential security issue
    #[error("Path validation failed: {path:?} - {reason}")]
    PathValidation { path: PathBuf, reason: String },

    /// Directory creation failed
    #[error("Failed to create directory: {path:?} - {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Permissions error
    #[error("Permission denied: {operation} on {path:?}")]
    Permission { operation: String, path: PathBuf },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A blocking filesystem task panicked or was cancelled
    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SandboxedFileError {
    pub(crate) fn invalid_path<P: Into<PathBuf>, R: Into<String>>(path: P, reason: R) -> Self {
        Self::PathValidation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
