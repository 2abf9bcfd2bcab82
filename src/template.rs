//! Template mini-language
//!
//! A template identifier such as `custom-w200-16x9-crop` encodes the output
//! box of a resize. Identifiers are split on `-`; each token is classified
//! independently:
//!
//! | token        | effect                                  |
//! |--------------|-----------------------------------------|
//! | `w<N>`       | width                                   |
//! | `h<N>`       | height                                  |
//! | `<A>x<B>`    | aspect ratio `A/B` (ignored if `B <= 0`) |
//! | `crop`       | scale straight to the box               |
//! | `upscale`    | with `crop`, allow enlarging the source |
//!
//! Unknown tokens are ignored and numbers that fail to parse count as `0`
//! (unset). Only `original` and identifiers starting with `custom` are
//! accepted.
//!
//! A parsed template is bound to one request with
//! [`Template::with_extensions`], which records the extension of the stored
//! original and of the artifact being produced.

use crate::errors::{AppError, AppResult};
use crate::imaging::file_extension;
use std::fmt;
use std::str::FromStr;

/// Template that serves the original bytes untouched
pub const ORIGINAL_TEMPLATE: &str = "original";

/// Required prefix of every resize template
pub const CUSTOM_TEMPLATE_PREFIX: &str = "custom";

/// Message returned to clients for rejected identifiers
pub const UNSUPPORTED_TEMPLATE_MESSAGE: &str = "not supported template";

/// Parsed resize parameters. `0.0` means unset for the numeric fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    id: String,
    pub width: f64,
    pub height: f64,
    pub ratio: f64,
    pub crop: bool,
    pub upscale: bool,
    /// Lower-case extension of the original being read
    pub input_extension: Option<String>,
    /// Lower-case extension of the artifact being produced
    pub output_extension: Option<String>,
}

impl Template {
    pub fn parse(id: &str) -> AppResult<Self> {
        if id != ORIGINAL_TEMPLATE && !id.starts_with(CUSTOM_TEMPLATE_PREFIX) {
            return Err(AppError::validation(UNSUPPORTED_TEMPLATE_MESSAGE));
        }

        let mut template = Self {
            id: id.to_string(),
            width: 0.0,
            height: 0.0,
            ratio: 0.0,
            crop: false,
            upscale: false,
            input_extension: None,
            output_extension: None,
        };

        for token in id.split('-').filter(|token| !token.is_empty()) {
            if let Some(value) = token.strip_prefix('w') {
                template.width = lenient_number(value);
            } else if let Some(value) = token.strip_prefix('h') {
                template.height = lenient_number(value);
            } else if let Some((a, b)) = token.split_once('x') {
                let (a, b) = (lenient_number(a), lenient_number(b));
                if b > 0.0 {
                    template.ratio = a / b;
                }
            } else if token == "crop" {
                template.crop = true;
            } else if token == "upscale" {
                template.upscale = true;
            }
        }

        Ok(template)
    }

    /// Bind the template to the original at `input_path` and the artifact at `output_path`
    pub fn with_extensions(mut self, input_path: &str, output_path: &str) -> Self {
        self.input_extension = file_extension(input_path);
        self.output_extension = file_extension(output_path);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_original(&self) -> bool {
        self.id == ORIGINAL_TEMPLATE
    }

    /// Output box for a source of `src_width` x `src_height` pixels.
    ///
    /// The first matching rule wins: explicit width and height, width with
    /// ratio, height with ratio, ratio alone, width alone, height alone,
    /// otherwise the source size. With `crop` and without `upscale` the box
    /// is scaled down so that neither side exceeds the source.
    pub fn dimensions(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        if src_width == 0 || src_height == 0 {
            return (src_width, src_height);
        }

        let (src_w, src_h) = (f64::from(src_width), f64::from(src_height));
        let src_ratio = src_w / src_h;

        let (mut out_w, mut out_h) = if self.width > 0.0 && self.height > 0.0 {
            (self.width, self.height)
        } else if self.width > 0.0 && self.ratio > 0.0 {
            (self.width, self.width / self.ratio)
        } else if self.height > 0.0 && self.ratio > 0.0 {
            (self.height * self.ratio, self.height)
        } else if self.ratio > 0.0 {
            if src_ratio < self.ratio {
                (src_h * self.ratio, src_h)
            } else {
                (src_w, src_w / self.ratio)
            }
        } else if self.width > 0.0 {
            (self.width, self.width / src_ratio)
        } else if self.height > 0.0 {
            (self.height * src_ratio, self.height)
        } else {
            (src_w, src_h)
        };

        if self.crop && !self.upscale {
            let ratio_w = src_w / out_w;
            let ratio_h = src_h / out_h;
            if ratio_w < 1.0 || ratio_h < 1.0 {
                if ratio_w <= ratio_h {
                    out_w = src_w;
                    out_h *= ratio_w;
                } else {
                    out_h = src_h;
                    out_w *= ratio_h;
                }
            }
        }

        (to_pixels(out_w), to_pixels(out_h))
    }
}

impl FromStr for Template {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Unparseable, negative and non-finite numbers all mean "unset"
fn lenient_number(value: &str) -> f64 {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() && number > 0.0 => number,
        _ => 0.0,
    }
}

fn to_pixels(value: f64) -> u32 {
    let rounded = value.round();
    if rounded < 1.0 {
        1
    } else if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    }
}
