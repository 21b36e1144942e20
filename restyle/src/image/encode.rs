//! Image encoding: JPEG, PNG, WebP

use anyhow::{Context, Result};
use imageproc::image::codecs::png::{CompressionType, FilterType, PngEncoder};
use imageproc::image::{ColorType, DynamicImage, GenericImageView, ImageEncoder};
use webp::WebPMemory;

use std::borrow::Cow;

use super::ImageFormat;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

/// Compress an image to JPEG format with the specified quality
///
/// JPEG has no alpha channel, so the image is flattened to RGB8 first.
pub fn compress_to_jpeg<W>(img: &DynamicImage, writer: &mut W, quality: u8) -> Result<()>
where
    W: std::io::Write,
{
    let mut encoder =
        imageproc::image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));

    let rgb = img.to_rgb8();
    encoder
        .encode_image(&rgb)
        .with_context(|| "Failed to compress image to JPEG")?;

    Ok(())
}

/// Luma data is written unfiltered, color data with adaptive filtering
fn png_filter(color: ColorType) -> FilterType {
    match color {
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16 => FilterType::NoFilter,
        _ => FilterType::Adaptive,
    }
}

/// Compress an image to PNG format with the specified compression level
///
/// 16-bit images keep their depth. Float images have no PNG form and are
/// written as 16-bit.
pub fn compress_to_png<W>(img: &DynamicImage, writer: &mut W, compression: PngCompression) -> Result<()>
where
    W: std::io::Write,
{
    let img = match img.color() {
        ColorType::Rgb32F => Cow::Owned(DynamicImage::from(img.to_rgb16())),
        ColorType::Rgba32F => Cow::Owned(DynamicImage::from(img.to_rgba16())),
        _ => Cow::Borrowed(img),
    };

    let compression_type = match compression {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    };

    let (width, height) = img.dimensions();
    PngEncoder::new_with_quality(writer, compression_type, png_filter(img.color()))
        .write_image(img.as_bytes(), width, height, img.color().into())
        .context("Failed to compress image to PNG")
}

/// Compress an image to WebP format with the specified quality
pub fn compress_to_webp(img: &DynamicImage, quality: u8) -> Result<WebPMemory> {
    let img = if img.color().has_alpha() {
        DynamicImage::from(img.to_rgba8())
    } else {
        DynamicImage::from(img.to_rgb8())
    };
    let encoder = webp::Encoder::from_image(&img)
        .map_err(|e| anyhow::anyhow!("Failed to create WebP encoder: {}", e))?;
    let webp_data = encoder.encode(quality.min(100) as f32);
    Ok(webp_data)
}

pub(super) fn encode_image(img: &DynamicImage, format: &ImageFormat) -> Result<Vec<u8>> {
    let (width, height) = img.dimensions();
    let mut buffer = Vec::with_capacity((width * height) as usize);

    match format {
        ImageFormat::Jpeg { quality } => compress_to_jpeg(img, &mut buffer, *quality)?,
        ImageFormat::Png { compression } => compress_to_png(img, &mut buffer, *compression)?,
        ImageFormat::WebP { quality } => {
            let webp_data = compress_to_webp(img, *quality)?;
            buffer.extend_from_slice(&webp_data);
        }
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::image::{guess_format, ImageBuffer, ImageFormat as Sniffed, Luma, Rgb, Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 8, Rgba([10, 200, 30, 255])))
    }

    #[test]
    fn each_format_produces_its_container() {
        let img = sample();

        let jpeg = encode_image(&img, &ImageFormat::Jpeg { quality: 80 }).unwrap();
        assert_eq!(guess_format(&jpeg).unwrap(), Sniffed::Jpeg);

        let png = encode_image(
            &img,
            &ImageFormat::Png {
                compression: PngCompression::Default,
            },
        )
        .unwrap();
        assert_eq!(guess_format(&png).unwrap(), Sniffed::Png);

        let webp = encode_image(&img, &ImageFormat::WebP { quality: 75 }).unwrap();
        assert_eq!(&webp[..4], b"RIFF");
        assert_eq!(&webp[8..12], b"WEBP");
    }

    #[test]
    fn png_keeps_sixteen_bit_luma() {
        let img = DynamicImage::ImageLuma16(ImageBuffer::from_fn(12, 6, |x, y| Luma([(x * 4000 + y) as u16])));
        let mut buffer = Vec::new();
        compress_to_png(&img, &mut buffer, PngCompression::Fast).unwrap();

        let decoded = imageproc::image::load_from_memory(&buffer).unwrap();
        assert_eq!(decoded.color(), ColorType::L16);
        assert_eq!(decoded.as_bytes(), img.as_bytes());
    }

    #[test]
    fn png_writes_float_images_as_sixteen_bit() {
        let img = DynamicImage::ImageRgb32F(ImageBuffer::from_pixel(4, 4, Rgb([0.5f32, 0.25, 1.0])));
        let mut buffer = Vec::new();
        compress_to_png(&img, &mut buffer, PngCompression::Default).unwrap();

        let decoded = imageproc::image::load_from_memory(&buffer).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb16);
    }

    #[test]
    fn png_filter_by_channel_layout() {
        assert!(matches!(png_filter(ColorType::L16), FilterType::NoFilter));
        assert!(matches!(png_filter(ColorType::La8), FilterType::NoFilter));
        assert!(matches!(png_filter(ColorType::Rgba8), FilterType::Adaptive));
    }

    #[test]
    fn jpeg_drops_alpha() {
        let mut buffer = Vec::new();
        compress_to_jpeg(&sample(), &mut buffer, 90).unwrap();

        let decoded = imageproc::image::load_from_memory(&buffer).unwrap();
        assert!(!decoded.color().has_alpha());
        assert_eq!(decoded.dimensions(), (16, 8));
    }
}
