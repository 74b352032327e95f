//! Still-image encoding (PNG, JPEG).

use std::io::Cursor;

use image::{
    ExtendedColorType, ImageEncoder, RgbImage, RgbaImage,
    buffer::ConvertBuffer,
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
};

use crate::error::{ReelcutError, Stage};

/// Default JPEG quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// Still-image container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Lossless PNG.
    Png,
    /// Lossy JPEG (alpha is dropped).
    Jpeg,
}

impl ImageFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    /// MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    /// Look up a format by extension (`png`, `jpg`, `jpeg`), ignoring case.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

/// Tuning for [`encode_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageEncoderOptions {
    /// JPEG quality, `1..=100`. Ignored for PNG.
    pub jpeg_quality: u8,
}

impl Default for ImageEncoderOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ImageEncoderOptions {
    /// Set the JPEG quality; values are clamped to `1..=100`.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}

/// Encode an RGBA buffer as a still image.
///
/// # Errors
///
/// Returns a [`Stage::Encode`] error for zero-area buffers, or
/// [`ReelcutError::Image`] if the codec fails.
///
/// # Example
///
/// ```
/// use image::{Rgba, RgbaImage};
/// use reelcut::{ImageEncoderOptions, ImageFormat, encode_image};
///
/// let frame = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
/// let png = encode_image(&frame, ImageFormat::Png, &ImageEncoderOptions::default()).unwrap();
/// assert_eq!(&png[1..4], b"PNG");
/// ```
pub fn encode_image(
    buffer: &RgbaImage,
    format: ImageFormat,
    options: &ImageEncoderOptions,
) -> Result<Vec<u8>, ReelcutError> {
    let (width, height) = buffer.dimensions();
    if width == 0 || height == 0 {
        return Err(ReelcutError::encode(
            Stage::Encode,
            format!("cannot encode a {width}x{height} image"),
        ));
    }

    let mut output = Cursor::new(Vec::new());
    match format {
        ImageFormat::Png => {
            PngEncoder::new(&mut output).write_image(
                buffer.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )?;
        }
        ImageFormat::Jpeg => {
            let rgb: RgbImage = buffer.convert();
            let quality = options.jpeg_quality.clamp(1, 100);
            JpegEncoder::new_with_quality(&mut output, quality).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(output.into_inner())
}
