//! Source ingestion: raw file bytes to an RGBA pixel buffer.
//!
//! Decoding is the only step that may block for a noticeable time; every
//! stage after it works on the in-memory buffer.

use image::RgbaImage;

use crate::types::PipelineError;

/// Decode raw image bytes (PNG, JPEG, BMP, WebP) to RGBA8.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is unrecognized
/// or the data is corrupt.
#[must_use = "returns the decoded image"]
#[tracing::instrument(skip_all, fields(bytes = bytes.len()))]
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    tracing::debug!(width = img.width(), height = img.height(), "decoded source");
    Ok(img.to_rgba8())
}
