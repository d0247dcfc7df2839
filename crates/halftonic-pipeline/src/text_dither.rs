//! Text dithering: stamp glyphs at random positions, colored by the
//! brightness underneath them.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::Rgba;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::color::luminance;
use crate::types::{Rgb, RgbaImage, clamp_channel, finite_or};

/// How stamped glyphs are colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextColorMode {
    /// Black or white by the adjusted luminance.
    #[default]
    Monochrome,
    /// The adjusted source color.
    Colored,
}

/// Text-dither settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextDitherSettings {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Characters stamped in order, cycling.
    pub text: String,
    /// Glyph edge length in pixels.
    pub font_size: f64,
    /// Glyph coloring.
    pub color_mode: TextColorMode,
    /// Contrast around mid-gray, percent.
    pub contrast: f64,
    /// Brightness multiplier, percent.
    pub brightness: f64,
    /// Invert the adjusted value before coloring.
    pub invert: bool,
    /// Glyph density multiplier; 1 places one glyph per glyph area.
    pub resolution: f64,
    /// Fill drawn before any glyph.
    pub background: Rgb,
}

impl Default for TextDitherSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            text: "01".to_owned(),
            font_size: 12.0,
            color_mode: TextColorMode::default(),
            contrast: 100.0,
            brightness: 100.0,
            invert: false,
            resolution: 1.0,
            background: Rgb::WHITE,
        }
    }
}

impl TextDitherSettings {
    /// Number of glyphs stamped on a `width x height` canvas.
    ///
    /// `width * height / (fontSize^2 / resolution)`, capped at one glyph
    /// per pixel.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn glyph_count(&self, width: u32, height: u32) -> u64 {
        let total = u64::from(width) * u64::from(height);
        let size = self.effective_font_size();
        let resolution = finite_or(self.resolution, 1.0).clamp(0.01, 100.0);
        let count = (total as f64 / (size * size / resolution)).floor() as u64;
        count.min(total)
    }

    fn effective_font_size(&self) -> f64 {
        finite_or(self.font_size, 12.0).max(1.0)
    }

    fn adjust(&self, v: u8) -> f64 {
        let contrast = finite_or(self.contrast, 100.0) / 100.0;
        let brightness = finite_or(self.brightness, 100.0) / 100.0;
        let v = (f64::from(v) - 128.0).mul_add(contrast, 128.0) * brightness;
        let v = v.clamp(0.0, 255.0);
        if self.invert { 255.0 - v } else { v }
    }

    fn glyph_color(&self, pixel: Rgba<u8>) -> Rgb {
        let [r, g, b, _] = pixel.0;
        match self.color_mode {
            TextColorMode::Monochrome => {
                let lum = luminance(r, g, b);
                let lum = clamp_channel(lum);
                if self.adjust(lum) >= 128.0 {
                    Rgb::WHITE
                } else {
                    Rgb::BLACK
                }
            }
            TextColorMode::Colored => Rgb::new(
                clamp_channel(self.adjust(r)),
                clamp_channel(self.adjust(g)),
                clamp_channel(self.adjust(b)),
            ),
        }
    }
}

/// Bitmap for `ch`, with unknown characters drawn as `?`.
fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Stamp glyphs over a background fill.
///
/// Each glyph is centered on a position drawn from `rng`, takes its color
/// from the source pixel at that position, and is scaled from the 8x8
/// bitmap to `fontSize` pixels. The source alpha is kept. Empty `text`
/// leaves the image unchanged.
#[must_use]
#[tracing::instrument(skip_all, fields(text = %settings.text))]
pub fn stamp<R: Rng + ?Sized>(
    image: &RgbaImage,
    settings: &TextDitherSettings,
    rng: &mut R,
) -> RgbaImage {
    let (width, height) = image.dimensions();
    let chars: Vec<char> = settings.text.chars().collect();
    if chars.is_empty() || width == 0 || height == 0 {
        return image.clone();
    }

    let bg = settings.background.0;
    let mut out = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([bg[0], bg[1], bg[2], image.get_pixel(x, y).0[3]])
    });

    let size = settings.effective_font_size();
    let scale = size / 8.0;
    let count = settings.glyph_count(width, height);
    tracing::debug!(count, size, "stamping glyphs");

    let count = usize::try_from(count).unwrap_or(usize::MAX);
    for ch in chars.iter().cycle().take(count) {
        let x = rng.gen_range(0..width);
        let y = rng.gen_range(0..height);
        let color = settings.glyph_color(*image.get_pixel(x, y));
        let left = f64::from(x) - size / 2.0;
        let top = f64::from(y) - size / 2.0;
        draw_glyph(&mut out, glyph(*ch), left, top, scale, color);
    }
    out
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn draw_glyph(out: &mut RgbaImage, bitmap: [u8; 8], left: f64, top: f64, scale: f64, color: Rgb) {
    let (width, height) = out.dimensions();
    let span = |origin: f64, index: usize, limit: u32| {
        let start = (index as f64).mul_add(scale, origin).floor();
        let end = ((index + 1) as f64).mul_add(scale, origin).floor().max(start + 1.0);
        let start = start.max(0.0) as u32;
        let end = end.clamp(0.0, f64::from(limit)) as u32;
        start..end
    };
    for (row, bits) in bitmap.iter().enumerate() {
        for col in 0..8 {
            if (bits >> col) & 1 == 0 {
                continue;
            }
            for py in span(top, row, height) {
                for px in span(left, col, width) {
                    let pixel = out.get_pixel_mut(px, py);
                    pixel.0[..3].copy_from_slice(&color.0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn enabled() -> TextDitherSettings {
        TextDitherSettings {
            enabled: true,
            ..TextDitherSettings::default()
        }
    }

    #[test]
    fn glyph_count_follows_density_formula() {
        let s = TextDitherSettings {
            font_size: 10.0,
            resolution: 2.0,
            ..enabled()
        };
        assert_eq!(s.glyph_count(100, 100), 200);
        let dense = TextDitherSettings {
            font_size: 1.0,
            resolution: 100.0,
            ..enabled()
        };
        assert_eq!(dense.glyph_count(10, 10), 100);
    }

    #[test]
    fn same_seed_same_output() {
        let img = RgbaImage::from_fn(40, 40, |x, _| {
            let v = (x * 6) as u8;
            Rgba([v, v, v, 255])
        });
        let a = stamp(&img, &enabled(), &mut StdRng::seed_from_u64(1));
        let b = stamp(&img, &enabled(), &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn dark_source_gets_black_glyphs() {
        let img = RgbaImage::from_pixel(48, 48, Rgba([10, 10, 10, 255]));
        let out = stamp(&img, &enabled(), &mut StdRng::seed_from_u64(2));
        assert!(out.pixels().any(|p| p.0[..3] == [0, 0, 0]));
        assert!(out.pixels().all(|p| p.0[..3] == [0, 0, 0] || p.0[..3] == [255, 255, 255]));
    }

    #[test]
    fn bright_source_stays_background() {
        let img = RgbaImage::from_pixel(32, 32, Rgba([250, 250, 250, 255]));
        let out = stamp(&img, &enabled(), &mut StdRng::seed_from_u64(3));
        assert!(out.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn empty_text_is_identity() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 4]));
        let s = TextDitherSettings {
            text: String::new(),
            ..enabled()
        };
        assert_eq!(stamp(&img, &s, &mut StdRng::seed_from_u64(0)), img);
    }

    #[test]
    fn colored_mode_applies_invert() {
        let s = TextDitherSettings {
            color_mode: TextColorMode::Colored,
            invert: true,
            ..enabled()
        };
        assert_eq!(s.glyph_color(Rgba([0, 255, 100, 255])), Rgb::new(255, 0, 155));
    }

    #[test]
    fn unknown_characters_fall_back() {
        assert_eq!(glyph('\u{1F600}'), glyph('?'));
        assert_ne!(glyph('A'), [0; 8]);
    }
}
