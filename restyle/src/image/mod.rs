//! Image normalization: decode, fit into the configured box, re-encode

mod decode;
mod encode;
mod transform;

// Re-export public API
pub use decode::decode;
pub use encode::{compress_to_jpeg, compress_to_png, compress_to_webp, PngCompression};
pub use transform::{fit_dimensions, resize};

use anyhow::{Context, Result};
use imageproc::image::GenericImageView;

use crate::config::Config;
use crate::data_url;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ImageFormat {
    Jpeg { quality: u8 },
    Png { compression: PngCompression },
    WebP { quality: u8 },
}

impl Default for ImageFormat {
    fn default() -> Self {
        ImageFormat::Jpeg { quality: 80 }
    }
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "jpg",
            ImageFormat::Png { .. } => "png",
            ImageFormat::WebP { .. } => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "image/jpeg",
            ImageFormat::Png { .. } => "image/png",
            ImageFormat::WebP { .. } => "image/webp",
        }
    }
}

/// An input image after decode, resize and re-encode.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Where the image came from (path, archive entry or URL), for logs and reports.
    pub source: String,
    pub data: Vec<u8>,
    pub dimensions: (u32, u32),
    pub format: ImageFormat,
}

impl NormalizedImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn to_data_url(&self) -> String {
        data_url::encode(self.mime_type(), &self.data)
    }
}

/// Decode `bytes`, shrink to fit the configured bounds and re-encode.
pub fn normalize(source: impl Into<String>, bytes: &[u8], config: &Config) -> Result<NormalizedImage> {
    let source = source.into();

    let img = decode(bytes).with_context(|| format!("Failed to decode {source}"))?;
    let original = img.dimensions();
    let target = fit_dimensions(original, config.max_dimensions());

    let img = resize(img, target).with_context(|| format!("Failed to resize {source}"))?;

    log::trace!(
        "Resized {source}: {}x{} -> {}x{}",
        original.0,
        original.1,
        target.0,
        target.1
    );

    let data = encode::encode_image(&img, &config.image_format)
        .with_context(|| format!("Failed to encode {source}"))?;

    Ok(NormalizedImage {
        source,
        data,
        dimensions: img.dimensions(),
        format: config.image_format,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use imageproc::image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};

    /// PNG of pseudo-random noise, so it does not compress below archive size limits
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut state: u32 = width.wrapping_mul(31).wrapping_add(height);
        let mut next = || {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        };
        let img = RgbImage::from_fn(width, height, |_, _| Rgb([next(), next(), next()]));
        let mut buffer = Vec::new();
        compress_to_png(&DynamicImage::ImageRgb8(img), &mut buffer, PngCompression::Fast).unwrap();
        buffer
    }

    #[test]
    fn normalize_shrinks_wide_image_to_jpeg() {
        let config = Config::default();
        let img = normalize("wide.png", &png_bytes(1600, 900), &config).unwrap();

        assert_eq!(img.dimensions, (800, 450));
        assert_eq!(img.format, ImageFormat::Jpeg { quality: 80 });
        assert_eq!(imageproc::image::guess_format(&img.data).unwrap(), imageproc::image::ImageFormat::Jpeg);
        assert!(img.to_data_url().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn normalize_keeps_small_image_size() {
        let config = Config::default();
        let img = normalize("small.png", &png_bytes(120, 90), &config).unwrap();
        assert_eq!(img.dimensions, (120, 90));
    }

    #[test]
    fn normalize_fits_rotated_photo() {
        // Landscape pixels, portrait once the EXIF rotation is applied
        let bytes = decode::tests::jpeg_with_orientation(1600, 800, 6);
        let img = normalize("phone.jpg", &bytes, &Config::default()).unwrap();
        assert_eq!(img.dimensions, (400, 800));
    }

    #[test]
    fn normalize_png_keeps_alpha() {
        let config = Config {
            image_format: ImageFormat::Png {
                compression: PngCompression::Fast,
            },
            ..Config::default()
        };
        let img = RgbaImage::from_pixel(10, 1000, Rgba([255, 0, 0, 0]));
        let mut bytes = Vec::new();
        compress_to_png(&DynamicImage::ImageRgba8(img), &mut bytes, PngCompression::Fast).unwrap();

        let out = normalize("tall.png", &bytes, &config).unwrap();
        assert_eq!(out.dimensions, (8, 800));

        let decoded = decode(&out.data).unwrap();
        assert!(decoded.color().has_alpha());
    }

    #[test]
    fn normalize_rejects_garbage() {
        let err = normalize("junk.jpg", b"definitely not an image", &Config::default()).unwrap_err();
        assert!(err.to_string().contains("junk.jpg"));
    }
}
