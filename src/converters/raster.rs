//! Raster image decoding and re-encoding.

use crate::error::ConvertError;
use crate::format::Format;
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Decode an image, sniffing the real format from its bytes.
pub fn decode(path: &Path) -> Result<DynamicImage, ConvertError> {
    let img = ImageReader::open(path)
        .map_err(|e| ConvertError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| ConvertError::io(path, e))?
        .decode()?;
    debug!(
        "decoded {} → {}x{} {:?}",
        path.display(),
        img.width(),
        img.height(),
        img.color()
    );
    Ok(img)
}

/// Composite over white and drop the alpha channel.
pub fn flatten_rgb(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
        let a = u16::from(src[3]);
        let blend = |c: u8| ((u16::from(c) * a + 255 * (255 - a)) / 255) as u8;
        *dst = Rgb([blend(src[0]), blend(src[1]), blend(src[2])]);
    }
    out
}

/// Re-encode into `target`, adjusting the colour type to what the encoder accepts.
pub fn reencode(img: &DynamicImage, target: Format) -> Result<Vec<u8>, ConvertError> {
    let format = target
        .image_format()
        .ok_or_else(|| ConvertError::package(target, "not a raster image format"))?;

    let normalized = match target {
        Format::Jpeg | Format::Bmp => DynamicImage::ImageRgb8(flatten_rgb(img)),
        Format::Gif => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ if img.color().has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    };

    let mut buf = Vec::new();
    normalized.write_to(&mut Cursor::new(&mut buf), format)?;
    debug!("encoded {} → {} bytes", target, buf.len());
    Ok(buf)
}

/// Lossless PNG for embedding rendered pages.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}
