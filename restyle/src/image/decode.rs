//! Image decoding

use anyhow::{Context, Result};
use imageproc::image::{DynamicImage, ImageDecoder, ImageReader};

use std::io::Cursor;

/// Decode image from memory, upright
///
/// The format is sniffed from the content, never from the file name. EXIF
/// orientation is applied, so dimensions are those of the image as displayed.
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("Failed to read image header")?
        .into_decoder()?;

    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);

    Ok(img)
}
