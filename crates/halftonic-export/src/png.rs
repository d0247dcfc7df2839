//! PNG serialization of the composited canvas.

use halftonic_pipeline::RgbaImage;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;

use crate::ExportError;

/// Encode `image` as an RGBA8 PNG byte stream.
///
/// # Errors
///
/// Returns [`ExportError::Png`] if the encoder rejects the buffer.
#[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(buf)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn png_signature_and_round_trip() {
        let img = RgbaImage::from_fn(7, 5, |x, y| Rgba([x as u8 * 30, y as u8 * 50, 9, 128]));
        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }
}
