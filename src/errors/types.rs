//! Error type definitions for the image resizer
//!
//! The hierarchy mirrors the request pipeline: collaborator errors
//! ([`StorageError`], [`TransformError`]) are wrapped by [`AppError`], which
//! carries the category used to pick a response status.

use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Client supplied something we cannot serve (bad template, extension)
    #[error("{message}")]
    Validation { message: String },

    /// The original image does not exist in storage
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Local tier or object store failures
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Transform engine or optimizer failures
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised by the storage collaborators
#[derive(Error, Debug)]
pub enum StorageError {
    /// The requested object does not exist
    #[error("Object not found: {path}")]
    NotFound { path: String },

    /// Network/transport failure talking to the object store
    #[error("Transport error for {path}: {message}")]
    Transport { path: String, message: String },

    /// Object store answered with something we cannot use
    #[error("Invalid response for {path}: {message}")]
    InvalidResponse { path: String, message: String },

    /// Local filesystem failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sandbox violations and local tier failures
    #[error("Local store error: {0}")]
    Sandbox(#[from] sandboxed_file_store::SandboxedFileError),
}

/// Errors raised by the transform and optimizer collaborators
#[derive(Error, Debug)]
pub enum TransformError {
    /// Source image could not be decoded
    #[error("Error decoding image: {0}")]
    Decode(String),

    /// Output image could not be encoded
    #[error("Error encoding image: {0}")]
    Encode(String),

    /// The output extension has no encoder
    #[error("Unsupported output format: {extension}")]
    UnsupportedFormat { extension: String },

    /// External optimizer failed
    #[error("Optimizer '{program}' failed: {message}")]
    Optimizer { program: String, message: String },

    /// Work exceeded its time budget
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// Local file handling around the transform
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking transform task panicked or was cancelled
    #[error("Transform task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Error value carrying the status code recommended for the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Status code recommended for this error; anything that is not a
    /// client or lookup error is an internal error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the error means the original image is missing
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Storage(StorageError::NotFound { .. })
        )
    }
}

impl From<&AppError> for HttpError {
    fn from(error: &AppError) -> Self {
        Self {
            status: error.status_code(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl StorageError {
    /// Create a transport error for an object path
    pub fn transport<P: Into<String>, M: ToString>(path: P, message: M) -> Self {
        Self::Transport {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
