//! Color/tone adjustments: levels, HSL adjustments, posterize, invert
//! and duotone thresholding.
//!
//! Every function here is a pure pointwise map over the buffer. Alpha is
//! copied through untouched.

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::types::{Rgb, RgbaImage, clamp_channel, finite_or};

/// Rec. 601 luma of an RGB triple, in `0.0..=255.0`.
#[must_use]
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.114f64.mul_add(
        f64::from(b),
        0.299f64.mul_add(f64::from(r), 0.587 * f64::from(g)),
    )
}

/// Luma of an RGBA pixel, in `0.0..=255.0`.
#[must_use]
pub fn pixel_luminance(pixel: Rgba<u8>) -> f64 {
    luminance(pixel.0[0], pixel.0[1], pixel.0[2])
}

/// Convert RGB (`0..=255`) into HSL with hue in degrees `[0, 360)` and
/// saturation/lightness in `[0, 1]`.
#[must_use]
pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let delta = max - min;
    if delta <= f64::EPSILON {
        return (0.0, 0.0, l);
    }
    let s = if l > 0.5 {
        delta / (2.0 - max - min)
    } else {
        delta / (max + min)
    };
    let h = if (max - r).abs() <= f64::EPSILON {
        ((g - b) / delta).rem_euclid(6.0)
    } else if (max - g).abs() <= f64::EPSILON {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    (h * 60.0, s, l)
}

/// Convert HSL back to RGB (`0..=255`).
#[must_use]
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    if s <= 0.0 {
        let v = clamp_channel(l * 255.0);
        return (v, v, v);
    }
    let q = if l < 0.5 {
        l * (1.0 + s)
    } else {
        l.mul_add(-s, l + s)
    };
    let p = 2.0f64.mul_add(l, -q);
    let h = h.rem_euclid(360.0) / 360.0;
    let channel = |t: f64| {
        let t = t.rem_euclid(1.0);
        let v = if t < 1.0 / 6.0 {
            ((q - p) * 6.0).mul_add(t, p)
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            ((q - p) * (2.0 / 3.0 - t)).mul_add(6.0, p)
        } else {
            p
        };
        clamp_channel(v * 255.0)
    };
    (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}

/// Per-channel levels remap: `[black, white] -> [0, 255]`, then a gamma
/// curve `v^(1/gamma)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Levels {
    /// Input value mapped to 0.
    pub black: u8,
    /// Input value mapped to 255.
    pub white: u8,
    /// Gamma exponent; values above 1 brighten midtones.
    pub gamma: f64,
}

impl Default for Levels {
    fn default() -> Self {
        Self {
            black: 0,
            white: 255,
            gamma: 1.0,
        }
    }
}

impl Levels {
    /// Returns `true` when the remap leaves every value unchanged.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.black == 0 && self.white == 255 && (self.effective_gamma() - 1.0).abs() < f64::EPSILON
    }

    fn effective_gamma(&self) -> f64 {
        let gamma = finite_or(self.gamma, 1.0);
        if gamma <= 0.0 { 1.0 } else { gamma }
    }

    /// Build the 256-entry lookup table for this remap.
    #[must_use]
    pub fn lookup_table(&self) -> [u8; 256] {
        let black = f64::from(self.black);
        // A collapsed or inverted range degrades to a hard step at `black`.
        let white = f64::from(self.white).max(black + 1.0);
        let exponent = 1.0 / self.effective_gamma();
        std::array::from_fn(|v| {
            #[allow(clippy::cast_precision_loss)]
            let t = ((v as f64 - black) / (white - black)).clamp(0.0, 1.0);
            clamp_channel(t.powf(exponent) * 255.0)
        })
    }
}

/// Settings for the color/tone stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColorSettings {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Hue rotation in degrees.
    pub hue_shift: f64,
    /// Saturation percentage; 100 is neutral.
    pub saturation: f64,
    /// Brightness percentage; 100 is neutral.
    pub brightness: f64,
    /// Contrast percentage; 100 is neutral.
    pub contrast: f64,
    /// Number of lightness bands. 0 and 1 disable posterization.
    pub posterize: u32,
    /// Negate every channel as the last step.
    pub invert: bool,
    /// Levels remap applied before the HSL adjustments.
    pub levels: Levels,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            hue_shift: 0.0,
            saturation: 100.0,
            brightness: 100.0,
            contrast: 100.0,
            posterize: 0,
            invert: false,
            levels: Levels::default(),
        }
    }
}

impl ColorSettings {
    fn is_hsl_neutral(&self) -> bool {
        finite_or(self.hue_shift, 0.0).rem_euclid(360.0) == 0.0
            && (finite_or(self.saturation, 100.0) - 100.0).abs() < f64::EPSILON
            && (finite_or(self.brightness, 100.0) - 100.0).abs() < f64::EPSILON
            && (finite_or(self.contrast, 100.0) - 100.0).abs() < f64::EPSILON
    }
}

/// Apply the color/tone stage.
///
/// Order: levels, hue/saturation/brightness/contrast in HSL space,
/// posterize, invert. Neutral settings return a bit-identical copy.
#[must_use = "returns the adjusted image"]
pub fn adjust(image: &RgbaImage, settings: &ColorSettings) -> RgbaImage {
    let mut out = if settings.levels.is_identity() {
        image.clone()
    } else {
        apply_levels(image, &settings.levels)
    };

    let steps = settings.posterize;
    if !settings.is_hsl_neutral() || steps >= 2 {
        let hue_shift = finite_or(settings.hue_shift, 0.0);
        let saturation = finite_or(settings.saturation, 100.0).max(0.0) / 100.0;
        let brightness = finite_or(settings.brightness, 100.0).max(0.0) / 100.0;
        let contrast = finite_or(settings.contrast, 100.0).max(0.0) / 100.0;
        for pixel in out.pixels_mut() {
            let (h, s, l) = rgb_to_hsl(pixel.0[0], pixel.0[1], pixel.0[2]);
            let h = (h + hue_shift).rem_euclid(360.0);
            let s = (s * saturation).clamp(0.0, 1.0);
            let mut l = (l * brightness).clamp(0.0, 1.0);
            l = (l - 0.5).mul_add(contrast, 0.5).clamp(0.0, 1.0);
            if steps >= 2 {
                let bands = f64::from(steps - 1);
                l = (l * bands).round() / bands;
            }
            let (r, g, b) = hsl_to_rgb(h, s, l);
            pixel.0[0] = r;
            pixel.0[1] = g;
            pixel.0[2] = b;
        }
    }

    if settings.invert {
        invert_in_place(&mut out);
    }
    out
}

/// Apply a levels remap to every color channel.
#[must_use = "returns the remapped image"]
pub fn apply_levels(image: &RgbaImage, levels: &Levels) -> RgbaImage {
    let table = levels.lookup_table();
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            pixel.0[c] = table[usize::from(pixel.0[c])];
        }
    }
    out
}

/// Replace each color channel `v` with `255 - v`.
pub fn invert_in_place(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        for c in 0..3 {
            pixel.0[c] = 255 - pixel.0[c];
        }
    }
}

/// Settings for the duotone threshold stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThresholdSettings {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Luminance cut-off in `0..=255`.
    pub level: u8,
    /// Color for pixels below the cut-off.
    pub dark: Rgb,
    /// Color for pixels at or above the cut-off.
    pub light: Rgb,
    /// Swap the dark and light colors.
    pub invert: bool,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: 128,
            dark: Rgb::BLACK,
            light: Rgb::WHITE,
            invert: false,
        }
    }
}

/// Map every pixel to one of two colors by comparing its luminance with
/// the threshold level.
#[must_use = "returns the thresholded image"]
pub fn threshold(image: &RgbaImage, settings: &ThresholdSettings) -> RgbaImage {
    let (dark, light) = if settings.invert {
        (settings.light, settings.dark)
    } else {
        (settings.dark, settings.light)
    };
    let level = f64::from(settings.level);
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let color = if pixel_luminance(*pixel) >= level {
            light
        } else {
            dark
        };
        pixel.0[..3].copy_from_slice(&color.0);
    }
    out
}
