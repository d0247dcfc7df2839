//! Canvas sizing: fit a decoded source into the working canvas.
//!
//! Images larger than the canvas bounds are scaled down with aspect ratio
//! preserved. Smaller images are left alone; the pipeline never upscales
//! a source.

use std::fmt;

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, RgbaImage};

/// Resampling filter used when the canvas size changes.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResampleFilter {
    const fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nearest => "nearest",
            Self::Triangle => "triangle",
            Self::CatmullRom => "catmull-rom",
            Self::Gaussian => "gaussian",
            Self::Lanczos3 => "lanczos3",
        })
    }
}

/// Size of `source` after fitting it inside `bounds`.
///
/// Both sides stay at least 1 px. A source that already fits keeps its
/// size.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn fitted_dimensions(source: Dimensions, bounds: Dimensions) -> Dimensions {
    if source.width <= bounds.width && source.height <= bounds.height {
        return source;
    }
    let scale = (f64::from(bounds.width) / f64::from(source.width))
        .min(f64::from(bounds.height) / f64::from(source.height));
    let side = |len: u32| ((f64::from(len) * scale).round() as u32).max(1);
    Dimensions {
        width: side(source.width),
        height: side(source.height),
    }
}

/// Fit `image` inside `bounds`, preserving its aspect ratio.
///
/// Returns the (possibly unchanged) image and whether it was resized.
#[must_use]
#[tracing::instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn fit_to_canvas(
    image: &RgbaImage,
    bounds: Dimensions,
    filter: ResampleFilter,
) -> (RgbaImage, bool) {
    let source = Dimensions::of(image);
    let target = fitted_dimensions(source, bounds);
    if target == source {
        return (image.clone(), false);
    }
    (resize_exact(image, target, filter), true)
}

/// Resample `image` to exactly `target`, ignoring aspect ratio.
#[must_use]
pub fn resize_exact(image: &RgbaImage, target: Dimensions, filter: ResampleFilter) -> RgbaImage {
    if Dimensions::of(image) == target {
        return image.clone();
    }
    imageops::resize(image, target.width, target.height, filter.to_image_filter())
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn test_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([128, 128, 128, 255]))
    }

    const fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn default_filter_is_triangle() {
        assert_eq!(ResampleFilter::default(), ResampleFilter::Triangle);
    }

    #[test]
    fn small_source_is_untouched() {
        let (out, resized) =
            fit_to_canvas(&test_image(100, 80), dims(256, 256), ResampleFilter::Triangle);
        assert!(!resized);
        assert_eq!(out.dimensions(), (100, 80));
    }

    #[test]
    fn landscape_fits_width() {
        let (out, resized) =
            fit_to_canvas(&test_image(1024, 768), dims(256, 256), ResampleFilter::Triangle);
        assert!(resized);
        assert_eq!(out.dimensions(), (256, 192));
    }

    #[test]
    fn portrait_fits_height() {
        assert_eq!(fitted_dimensions(dims(600, 1200), dims(256, 256)), dims(128, 256));
    }

    #[test]
    fn sliver_keeps_one_pixel() {
        assert_eq!(fitted_dimensions(dims(10_000, 2), dims(100, 100)), dims(100, 1));
    }

    #[test]
    fn resize_exact_ignores_aspect() {
        let out = resize_exact(&test_image(10, 10), dims(30, 5), ResampleFilter::Nearest);
        assert_eq!(out.dimensions(), (30, 5));
        assert!(out.pixels().all(|p| p.0 == [128, 128, 128, 255]));
    }

    #[test]
    fn filter_display_matches_serde() {
        for filter in [
            ResampleFilter::Nearest,
            ResampleFilter::Triangle,
            ResampleFilter::CatmullRom,
            ResampleFilter::Gaussian,
            ResampleFilter::Lanczos3,
        ] {
            let json = serde_json::to_string(&filter).unwrap_or_default();
            assert_eq!(json, format!("\"{filter}\""));
        }
    }
}
