//! Image preparation for multimodal requests.
//!
//! Attachments are validated, downscaled and re-encoded here before they are
//! inlined as data URLs. Providers enforce their own payload caps, so the
//! byte budget is applied after encoding, not before.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default per-image byte budget in megabytes.
pub const DEFAULT_MAX_SIZE_MB: f64 = 1.0;

/// Default bounding box applied before encoding.
pub const DEFAULT_MAX_WIDTH: u32 = 1024;
pub const DEFAULT_MAX_HEIGHT: u32 = 1024;

/// JPEG qualities tried in order until the result fits the byte budget.
const JPEG_QUALITY_LADDER: [u8; 4] = [85, 70, 50, 30];

fn default_supported_mime_types() -> Vec<String> {
    vec!["image/png".to_owned(), "image/jpeg".to_owned()]
}

fn default_preferred_mime_type() -> String {
    "image/jpeg".to_owned()
}

fn default_max_size_in_mb() -> f64 {
    DEFAULT_MAX_SIZE_MB
}

fn default_max_width() -> u32 {
    DEFAULT_MAX_WIDTH
}

fn default_max_height() -> u32 {
    DEFAULT_MAX_HEIGHT
}

/// Per-model limits for inline images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProcessorOptions {
    /// MIME types forwarded as-is; anything else is transcoded.
    #[serde(default = "default_supported_mime_types")]
    pub supported_mime_types: Vec<String>,
    #[serde(default = "default_preferred_mime_type")]
    pub preferred_mime_type: String,
    #[serde(default = "default_max_size_in_mb")]
    pub max_size_in_mb: f64,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
}

impl Default for ImageProcessorOptions {
    fn default() -> Self {
        Self {
            supported_mime_types: default_supported_mime_types(),
            preferred_mime_type: default_preferred_mime_type(),
            max_size_in_mb: default_max_size_in_mb(),
            max_width: default_max_width(),
            max_height: default_max_height(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("unsupported media type: {0}")]
    UnsupportedMime(String),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("image is {bytes} bytes after processing, over the {limit} byte limit")]
    TooLarge { bytes: usize, limit: usize },
}

/// An image ready to be inlined in a request.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub mime: String,
    pub data: Vec<u8>,
}

impl ProcessedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.data))
    }
}

pub struct ImageProcessor {
    options: ImageProcessorOptions,
}

impl ImageProcessor {
    pub fn new(options: ImageProcessorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ImageProcessorOptions {
        &self.options
    }

    /// Validate, downscale and re-encode one attachment.
    ///
    /// The declared MIME is kept when the model supports it, otherwise the
    /// image is transcoded to the preferred type. A result over the byte
    /// budget is transcoded to the preferred type and, for JPEG, walked down
    /// the quality ladder before giving up.
    pub fn process(&self, bytes: &[u8], declared_mime: &str) -> Result<ProcessedImage, MediaError> {
        let is_image = declared_mime
            .parse::<mime::Mime>()
            .is_ok_and(|parsed| parsed.type_() == mime::IMAGE);
        if !is_image {
            return Err(MediaError::UnsupportedMime(declared_mime.to_owned()));
        }

        let mut image = image::load_from_memory(bytes)?;
        let options = &self.options;
        if image.width() > options.max_width || image.height() > options.max_height {
            image = image.resize(options.max_width, options.max_height, FilterType::Lanczos3);
        }

        let limit = (options.max_size_in_mb * 1024.0 * 1024.0) as usize;
        let supported = options
            .supported_mime_types
            .iter()
            .any(|mime| mime == declared_mime);

        let mut mime = if supported {
            declared_mime.to_owned()
        } else {
            options.preferred_mime_type.clone()
        };
        let mut data = encode(&image, &mime, JPEG_QUALITY_LADDER[0])?;

        if data.len() > limit && mime != options.preferred_mime_type {
            mime = options.preferred_mime_type.clone();
            data = encode(&image, &mime, JPEG_QUALITY_LADDER[0])?;
        }
        if data.len() > limit && mime == "image/jpeg" {
            for quality in &JPEG_QUALITY_LADDER[1..] {
                data = encode(&image, &mime, *quality)?;
                if data.len() <= limit {
                    break;
                }
            }
        }
        if data.len() > limit {
            return Err(MediaError::TooLarge {
                bytes: data.len(),
                limit,
            });
        }

        Ok(ProcessedImage { mime, data })
    }
}

fn encode(image: &DynamicImage, mime: &str, quality: u8) -> Result<Vec<u8>, MediaError> {
    let mut buffer = Vec::new();
    match mime {
        "image/png" => {
            image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        }
        "image/jpeg" => {
            // JPEG has no alpha channel.
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
        }
        other => {
            let format = ImageFormat::from_mime_type(other)
                .ok_or_else(|| MediaError::UnsupportedMime(other.to_owned()))?;
            image.write_to(&mut Cursor::new(&mut buffer), format)?;
        }
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    fn solid_png(width: u32, height: u32) -> Vec<u8> {
        let image =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255])));
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn processor(options: ImageProcessorOptions) -> ImageProcessor {
        ImageProcessor::new(options)
    }

    #[test]
    fn test_rejects_non_image_mime() {
        let result = processor(ImageProcessorOptions::default())
            .process(b"%PDF-1.4", "application/pdf");
        assert!(matches!(result, Err(MediaError::UnsupportedMime(_))));
    }

    #[test]
    fn test_supported_mime_is_kept() {
        let out = processor(ImageProcessorOptions::default())
            .process(&solid_png(32, 32), "image/png")
            .unwrap();
        assert_eq!(out.mime, "image/png");
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
    }

    #[test]
    fn test_unsupported_mime_transcodes_to_preferred() {
        let options = ImageProcessorOptions {
            supported_mime_types: vec!["image/jpeg".to_owned()],
            ..ImageProcessorOptions::default()
        };
        let out = processor(options)
            .process(&solid_png(32, 32), "image/png")
            .unwrap();
        assert_eq!(out.mime, "image/jpeg");
        assert!(image::load_from_memory(&out.data).is_ok());
    }

    #[test]
    fn test_oversized_image_is_downscaled() {
        let options = ImageProcessorOptions {
            max_width: 64,
            max_height: 64,
            ..ImageProcessorOptions::default()
        };
        let out = processor(options)
            .process(&solid_png(640, 160), "image/png")
            .unwrap();
        let decoded = image::load_from_memory(&out.data).unwrap();
        // resize preserves aspect ratio inside the box
        assert_eq!((decoded.width(), decoded.height()), (64, 16));
    }

    #[test]
    fn test_small_image_is_not_upscaled() {
        let out = processor(ImageProcessorOptions::default())
            .process(&solid_png(10, 10), "image/png")
            .unwrap();
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
    }

    #[test]
    fn test_rgba_input_transcodes_to_jpeg() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            16,
            16,
            Rgba([10, 200, 10, 128]),
        ));
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let options = ImageProcessorOptions {
            supported_mime_types: vec!["image/jpeg".to_owned()],
            ..ImageProcessorOptions::default()
        };
        let out = processor(options).process(&png, "image/png").unwrap();
        assert_eq!(out.mime, "image/jpeg");
    }

    #[test]
    fn test_impossible_budget_errors() {
        let options = ImageProcessorOptions {
            max_size_in_mb: 0.00001,
            ..ImageProcessorOptions::default()
        };
        let result = processor(options).process(&solid_png(256, 256), "image/png");
        assert!(matches!(result, Err(MediaError::TooLarge { .. })));
    }

    #[test]
    fn test_data_url_carries_the_mime() {
        let out = processor(ImageProcessorOptions::default())
            .process(&solid_png(8, 8), "image/png")
            .unwrap();
        assert!(out.data_url().starts_with("data:image/png;base64,"));
    }
}
