//! Shared types for the halftonic pixel pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can hold pixel buffers
/// without depending on `image` directly.
pub use image::RgbaImage;

/// The working pixel buffer every stage consumes and produces.
///
/// Row-major RGBA8 with the origin at the top-left corner.
pub type PixelBuffer = RgbaImage;

/// A 2D point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Rotate this point around `center` by `angle` radians.
    #[must_use]
    pub fn rotate_about(self, center: Self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        let dx = self.x - center.x;
        let dy = self.y - center.y;
        Self {
            x: center.x + dx.mul_add(cos, -(dy * sin)),
            y: center.y + dx.mul_add(sin, dy * cos),
        }
    }

    /// Returns `true` if both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Canvas dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing buffer.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Geometric center of the canvas.
    #[must_use]
    pub fn center(self) -> Point {
        Point::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }

    /// Returns `true` if `p` lies inside `[0, width) x [0, height)`.
    #[must_use]
    pub fn contains(self, p: Point) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < f64::from(self.width) && p.y < f64::from(self.height)
    }
}

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// Pure black.
    pub const BLACK: Self = Self([0, 0, 0]);
    /// Pure white.
    pub const WHITE: Self = Self([255, 255, 255]);

    /// Create a color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Lowercase `#rrggbb` hex notation.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }

    /// Take the RGB part of an RGBA pixel.
    #[must_use]
    pub const fn from_pixel(pixel: image::Rgba<u8>) -> Self {
        Self([pixel.0[0], pixel.0[1], pixel.0[2]])
    }
}

/// Round and clamp a float channel value into `0..=255`.
///
/// Non-finite input maps to 0 so no NaN can leak into a buffer.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_channel(value: f64) -> u8 {
    if value.is_finite() {
        value.round().clamp(0.0, 255.0) as u8
    } else {
        0
    }
}

/// Replace a non-finite setting with `fallback`.
#[must_use]
pub(crate) const fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// Errors that can occur at the pipeline boundaries.
///
/// Stage math itself never fails: out-of-range settings are clamped to
/// safe values. Errors only come from decoding, order validation and
/// cancellation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// An effects order was not a permutation of every stage.
    #[error("invalid effects order: {0}")]
    InvalidOrder(String),

    /// A settings document could not be parsed.
    #[error("invalid effect settings: {0}")]
    InvalidConfig(String),

    /// A newer render was requested before this one finished.
    #[error("render generation {generation} was superseded")]
    Superseded {
        /// Generation of the abandoned render.
        generation: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rotate_quarter_turn() {
        let p = Point::new(2.0, 1.0)
            .rotate_about(Point::new(1.0, 1.0), std::f64::consts::FRAC_PI_2);
        assert!((p.x - 1.0).abs() < 1e-9);
        assert!((p.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn dimensions_contains_is_half_open() {
        let d = Dimensions {
            width: 10,
            height: 5,
        };
        assert!(d.contains(Point::new(0.0, 0.0)));
        assert!(d.contains(Point::new(9.99, 4.99)));
        assert!(!d.contains(Point::new(10.0, 2.0)));
        assert!(!d.contains(Point::new(-0.1, 2.0)));
    }

    #[test]
    fn rgb_hex_is_lowercase() {
        assert_eq!(Rgb::new(255, 0, 171).to_hex(), "#ff00ab");
    }

    #[test]
    fn clamp_channel_guards_non_finite() {
        assert_eq!(clamp_channel(f64::NAN), 0);
        assert_eq!(clamp_channel(f64::INFINITY), 0);
        assert_eq!(clamp_channel(300.0), 255);
        assert_eq!(clamp_channel(-4.0), 0);
        assert_eq!(clamp_channel(127.5), 128);
    }

    #[test]
    fn error_display() {
        let err = PipelineError::Superseded { generation: 7 };
        assert_eq!(err.to_string(), "render generation 7 was superseded");
        assert_eq!(
            PipelineError::EmptyInput.to_string(),
            "input image data is empty"
        );
    }
}
