//! Pure Rust transform engine on the `image` crate.
//!
//! | Operation | Implementation |
//! |-----------|----------------|
//! | Dimensions | decoder header plus EXIF orientation |
//! | Decode | `ImageReader` with format sniffing, orientation applied |
//! | Fit | `DynamicImage::resize_to_fill` (scale to cover, centre crop) |
//! | Crop | `DynamicImage::resize_exact` |
//!
//! The output is always exactly the requested box; enlargement limits are
//! applied when the box is computed, not here.
//! | Encode | by output extension; JPEG with configurable quality |

use super::backend::{Background, Dimensions, ImageTransformer, TransformParams};
use crate::errors::{TransformError, TransformResult};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct RustTransformer;

impl RustTransformer {
    pub fn new() -> Self {
        Self
    }
}

fn open_decoder(path: &Path) -> TransformResult<impl ImageDecoder> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()
        .map_err(|e| TransformError::Decode(format!("{}: {}", path.display(), e)))
}

/// Decode an image with its EXIF orientation applied.
fn load_image(path: &Path) -> TransformResult<DynamicImage> {
    let mut decoder = open_decoder(path)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder)
        .map_err(|e| TransformError::Decode(format!("{}: {}", path.display(), e)))?;
    image.apply_orientation(orientation);
    Ok(image)
}

fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

/// Composite onto opaque white
fn flatten_on_white(image: &DynamicImage) -> DynamicImage {
    let mut canvas = RgbaImage::from_pixel(image.width(), image.height(), Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut canvas, &image.to_rgba8(), 0, 0);
    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

fn resize(image: DynamicImage, params: &TransformParams) -> DynamicImage {
    let (width, height) = (params.width, params.height);
    if (image.width(), image.height()) == (width, height) {
        return image;
    }

    if params.crop {
        image.resize_exact(width, height, FilterType::Lanczos3)
    } else {
        image.resize_to_fill(width, height, FilterType::Lanczos3)
    }
}

fn save_image(image: &DynamicImage, path: &Path, jpeg_quality: u8) -> TransformResult<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let format = ImageFormat::from_extension(&extension).ok_or_else(|| {
        TransformError::UnsupportedFormat {
            extension: extension.clone(),
        }
    })?;

    let encode_err = |e: image::ImageError| TransformError::Encode(format!("{}: {}", path.display(), e));

    match format {
        ImageFormat::Jpeg => {
            let writer = BufWriter::new(File::create(path)?);
            let encoder = JpegEncoder::new_with_quality(writer, jpeg_quality);
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(encode_err)
        }
        ImageFormat::Png => image.save_with_format(path, format).map_err(encode_err),
        ImageFormat::Gif | ImageFormat::WebP => DynamicImage::ImageRgba8(image.to_rgba8())
            .save_with_format(path, format)
            .map_err(encode_err),
        _ => Err(TransformError::UnsupportedFormat { extension }),
    }
}

impl ImageTransformer for RustTransformer {
    fn dimensions(&self, path: &Path) -> TransformResult<Dimensions> {
        let mut decoder = open_decoder(path)?;
        let (width, height) = decoder.dimensions();
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

        Ok(if swaps_axes(orientation) {
            Dimensions {
                width: height,
                height: width,
            }
        } else {
            Dimensions { width, height }
        })
    }

    fn transform(&self, params: &TransformParams) -> TransformResult<()> {
        let image = load_image(&params.source)?;
        let resized = resize(image, params);
        let output = match params.background {
            Background::White if resized.color().has_alpha() => flatten_on_white(&resized),
            _ => resized,
        };
        save_image(&output, &params.output, params.jpeg_quality)
    }
}
