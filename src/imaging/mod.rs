//! Image format policy and the transform/optimizer collaborators.
//!
//! Which files are accepted, which are passed through without a raster
//! resize, and how the `?original=` extension override rewrites a path all
//! live here so the orchestrator only sequences calls.

pub mod backend;
pub mod optimizer;
pub mod rust_backend;

pub use backend::{Background, Dimensions, ImageTransformer, TransformParams};
pub use optimizer::{CommandOptimizer, Optimizer, OptimizerRegistry};
pub use rust_backend::RustTransformer;

use crate::errors::{AppError, AppResult};
use crate::template::Template;
use std::path::Path;

/// Extensions the service accepts for originals and outputs
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "pdf"];

/// Vector and document formats that are served as-is
pub const PASS_THROUGH_EXTENSIONS: &[&str] = &["svg", "pdf"];

pub const UNSUPPORTED_EXTENSION_MESSAGE: &str = "not supported file extension";

/// Lower-case extension of a path, without the dot
pub fn file_extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

pub fn validate_filename(path: &str) -> AppResult<()> {
    match file_extension(path) {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(AppError::validation(UNSUPPORTED_EXTENSION_MESSAGE)),
    }
}

/// True when the source is copied instead of resized
pub fn should_skip_transform(template: &Template) -> bool {
    template.is_original()
        || template
            .input_extension
            .as_deref()
            .is_some_and(|ext| PASS_THROUGH_EXTENSIONS.contains(&ext))
}

/// Swap the extension of `path` for `extension`; an empty override keeps the path
pub fn replace_extension(path: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        return path.to_string();
    }

    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{}", &path[..file_start + dot], extension),
        _ => format!("{path}.{extension}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/photos/cat.jpg", true)]
    #[case("/photos/cat.JPEG", true)]
    #[case("/photos/logo.svg", true)]
    #[case("/docs/manual.pdf", true)]
    #[case("/photos/cat.tiff", false)]
    #[case("/photos/cat", false)]
    #[case("/photos.jpg/cat", false)]
    fn test_validate_filename(#[case] path: &str, #[case] ok: bool) {
        assert_eq!(validate_filename(path).is_ok(), ok);
    }

    #[test]
    fn test_validation_error_message() {
        let err = validate_filename("/a.exe").unwrap_err();
        assert_eq!(err.to_string(), UNSUPPORTED_EXTENSION_MESSAGE);
    }

    #[rstest]
    #[case("original", "/a.jpg", true)]
    #[case("original", "/a.png", true)]
    #[case("custom-w100", "/a.svg", true)]
    #[case("custom-w100", "/a.PDF", true)]
    #[case("custom-w100", "/a.jpg", false)]
    #[case("custom-w100", "/a", false)]
    fn test_should_skip_transform(#[case] template: &str, #[case] path: &str, #[case] skip: bool) {
        let template = Template::parse(template).unwrap().with_extensions(path, "/out.png");
        assert_eq!(should_skip_transform(&template), skip);
    }

    #[rstest]
    #[case("/photos/cat.webp", "jpg", "/photos/cat.jpg")]
    #[case("/photos/cat.webp", ".png", "/photos/cat.png")]
    #[case("/photos/cat.tar.gz", "png", "/photos/cat.tar.png")]
    #[case("/photos/cat", "png", "/photos/cat.png")]
    #[case("/photos.v2/cat", "png", "/photos.v2/cat.png")]
    #[case("/photos/.hidden", "png", "/photos/.hidden.png")]
    #[case("/photos/cat.webp", "", "/photos/cat.webp")]
    fn test_replace_extension(#[case] path: &str, #[case] ext: &str, #[case] expected: &str) {
        assert_eq!(replace_extension(path, ext), expected);
    }
}
