//! Centralized error handling for the image resizer
//!
//! Errors are converted into one of a few categories as close to their
//! origin as possible. The web response builder is the only place that maps
//! a category onto an HTTP status code.
//!
//! # Error Categories
//!
//! - **Validation Errors**: bad template identifiers, unsupported file extensions
//! - **Not Found Errors**: the original image is missing from storage
//! - **Storage Errors**: local tier or object store read/write failures
//! - **Transform Errors**: decode/resize/encode or optimizer failures
//!
//! # Usage
//!
//! ```rust
//! use image_resizer::errors::{AppError, AppResult};
//!
//! fn parse(id: &str) -> AppResult<()> {
//!     if id.is_empty() {
//!         return Err(AppError::validation("not supported template"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for storage collaborator Results
pub type StorageResult<T> = Result<T, StorageError>;

/// Convenience type alias for transform collaborator Results
pub type TransformResult<T> = Result<T, TransformError>;
