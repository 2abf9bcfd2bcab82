//! Content type detection for stored files
//!
//! The extension table is consulted first; content that does not carry a
//! known extension falls back to magic number detection via the `infer`
//! crate, and finally to `application/octet-stream`.

use std::path::Path;

/// Fallback content type when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

const EXTENSION_TABLE: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
    ("ico", "image/x-icon"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("avif", "image/avif"),
];

/// How a content type was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// Matched from the file extension
    Extension,
    /// Detected using magic number/file signature
    MagicNumber,
    /// Nothing matched
    Fallback,
}

/// Information about a detected file type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeInfo {
    /// MIME type of the file
    pub mime_type: String,
    /// Method used for detection
    pub detection_method: DetectionMethod,
}

/// Looks up the MIME type for a file extension (case-insensitive, with or without the dot).
#[must_use]
pub fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    let extension = extension.trim_start_matches('.');
    EXTENSION_TABLE
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
}

/// Detects the MIME type of raw content by its signature.
#[must_use]
pub fn sniff_content_type(content: &[u8]) -> Option<&'static str> {
    infer::get(content).map(|kind| kind.mime_type())
}

/// Determines the content type of a named file, preferring the extension
/// and falling back to the bytes.
#[must_use]
pub fn detect_content_type(name: &str, content: &[u8]) -> FileTypeInfo {
    let by_extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(content_type_for_extension);

    if let Some(mime_type) = by_extension {
        return FileTypeInfo {
            mime_type: mime_type.to_string(),
            detection_method: DetectionMethod::Extension,
        };
    }

    match sniff_content_type(content) {
        Some(mime_type) => FileTypeInfo {
            mime_type: mime_type.to_string(),
            detection_method: DetectionMethod::MagicNumber,
        },
        None => FileTypeInfo {
            mime_type: OCTET_STREAM.to_string(),
            detection_method: DetectionMethod::Fallback,
        },
    }
}
