//! halftonic-export: pure format serializers (sans-IO).
//!
//! Turns a finished render into bytes: PNG for the raster, SVG for the
//! vector view. The SVG translator prefers the exact primitives recorded
//! during the raster render, recomputes halftone dots when the record no
//! longer fits, and embeds the raster as a last resort.

pub mod png;
pub mod svg;

pub use png::encode_png;
pub use svg::{ExportMode, ExportRequest, Recompute, SvgExport, SvgMetadata, TOOL_ID, to_svg};

/// Errors from the serializers.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// PNG encoding failed.
    #[error("failed to encode PNG: {0}")]
    Png(#[from] image::ImageError),
}
