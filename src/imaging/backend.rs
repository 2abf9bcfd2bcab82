//! Transform collaborator trait and shared types.
//!
//! The pipeline never touches pixels itself: it asks an [`ImageTransformer`]
//! for source dimensions, computes the output box from the template and
//! hands the result back as [`TransformParams`]. The production
//! implementation is [`RustTransformer`](super::rust_backend::RustTransformer).

use crate::errors::TransformResult;
use std::path::{Path, PathBuf};

/// Result of a header inspection, already corrected for EXIF orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Fill used where the output has no pixels from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    /// Opaque white, for formats without an alpha channel
    White,
    Transparent,
}

impl Background {
    pub fn for_extension(extension: &str) -> Self {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "bmp" => Self::White,
            _ => Self::Transparent,
        }
    }
}

/// Parameters for a single transform invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub source: PathBuf,
    /// Output path; its extension selects the encoder
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub crop: bool,
    pub upscale: bool,
    pub background: Background,
    pub jpeg_quality: u8,
}

/// Pixel-level decode/resize/encode engine.
///
/// Implementations are synchronous; callers run them on the blocking pool.
pub trait ImageTransformer: Send + Sync {
    /// Read the source dimensions without a full decode where possible.
    fn dimensions(&self, path: &Path) -> TransformResult<Dimensions>;

    /// Decode `params.source`, fit or crop it to the requested box and
    /// encode it to `params.output`.
    fn transform(&self, params: &TransformParams) -> TransformResult<()>;
}
