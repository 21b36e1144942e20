//! Geometry: fitting into the configured box and resizing

use anyhow::{Context, Result};
use fast_image_resize as fr;
use fr::images::Image as FrImage;
use imageproc::image::{ColorType, DynamicImage, GenericImageView, GrayImage, RgbImage, RgbaImage};

/// Aspect-preserving, shrink-only fit of `(width, height)` into `(max_width, max_height)`
///
/// The longer side decides which bound applies; on a tie (square images) the
/// height bound is used. Dimensions are rounded half away from zero and never
/// drop below one pixel.
pub fn fit_dimensions((width, height): (u32, u32), (max_width, max_height): (u32, u32)) -> (u32, u32) {
    let (mut new_width, mut new_height) = (width, height);

    if width > height {
        if width > max_width {
            new_height = scale(height, max_width, width);
            new_width = max_width;
        }
    } else if height > max_height {
        new_width = scale(width, max_height, height);
        new_height = max_height;
    }

    (new_width.max(1), new_height.max(1))
}

#[inline]
fn scale(value: u32, numerator: u32, denominator: u32) -> u32 {
    ((value as f64 * numerator as f64) / denominator as f64).round() as u32
}

/// Resize `img` to exactly `target`
///
/// Alpha is kept when the source has it; grayscale stays grayscale; every
/// other color type is resized as 8-bit RGB.
pub fn resize(img: DynamicImage, target: (u32, u32)) -> Result<DynamicImage> {
    let (width, height) = img.dimensions();
    let (new_width, new_height) = target;

    if (width, height) == target {
        return Ok(img);
    }

    let algorithm = if new_width < width || new_height < height {
        // Downscaling: Lanczos3 preserves detail
        fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3)
    } else {
        fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom)
    };

    let (pixel_type, src_buffer) = match img.color() {
        ColorType::L8 | ColorType::L16 => (fr::PixelType::U8, img.into_luma8().into_raw()),
        color if color.has_alpha() => (fr::PixelType::U8x4, img.into_rgba8().into_raw()),
        _ => (fr::PixelType::U8x3, img.into_rgb8().into_raw()),
    };

    let src_image = FrImage::from_vec_u8(width, height, src_buffer, pixel_type)
        .context("Source buffer does not match image dimensions")?;
    let mut dst_image = FrImage::new(new_width, new_height, pixel_type);

    let mut resizer = fr::Resizer::new();
    resizer.resize(
        &src_image,
        &mut dst_image,
        Some(&fr::ResizeOptions::new().resize_alg(algorithm)),
    )?;

    let dst_buffer = dst_image.into_vec();
    let resized = match pixel_type {
        fr::PixelType::U8 => GrayImage::from_raw(new_width, new_height, dst_buffer).map(DynamicImage::ImageLuma8),
        fr::PixelType::U8x4 => RgbaImage::from_raw(new_width, new_height, dst_buffer).map(DynamicImage::ImageRgba8),
        _ => RgbImage::from_raw(new_width, new_height, dst_buffer).map(DynamicImage::ImageRgb8),
    };

    resized.context("Resized buffer does not match target dimensions")
}

#[test]
fn fit_landscape_over_width() {
    assert_eq!(fit_dimensions((1600, 900), (800, 800)), (800, 450));
    assert_eq!(fit_dimensions((1000, 333), (800, 800)), (800, 266));
}

#[test]
fn fit_portrait_and_square_use_height() {
    assert_eq!(fit_dimensions((900, 1600), (800, 800)), (450, 800));
    assert_eq!(fit_dimensions((1200, 1200), (800, 800)), (800, 800));
}

#[test]
fn fit_never_upscales() {
    assert_eq!(fit_dimensions((640, 480), (800, 800)), (640, 480));
    assert_eq!(fit_dimensions((800, 800), (800, 800)), (800, 800));
}

#[test]
fn fit_respects_asymmetric_bounds() {
    // landscape only checks the width bound
    assert_eq!(fit_dimensions((1000, 700), (1200, 600)), (1000, 700));
    assert_eq!(fit_dimensions((700, 1000), (1200, 600)), (420, 600));
}

#[test]
fn fit_clamps_degenerate_strips() {
    assert_eq!(fit_dimensions((10_000, 1), (800, 800)), (800, 1));
    assert_eq!(fit_dimensions((1, 10_000), (800, 800)), (1, 800));
}

#[test]
fn resize_preserves_color_type() {
    let gray = DynamicImage::ImageLuma8(GrayImage::new(40, 20));
    let out = resize(gray, (20, 10)).unwrap();
    assert_eq!(out.color(), ColorType::L8);
    assert_eq!(out.dimensions(), (20, 10));

    let rgba = DynamicImage::ImageRgba8(RgbaImage::new(40, 20));
    let out = resize(rgba, (10, 5)).unwrap();
    assert_eq!(out.color(), ColorType::Rgba8);
    assert_eq!(out.dimensions(), (10, 5));
}
