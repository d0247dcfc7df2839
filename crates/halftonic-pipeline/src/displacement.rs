//! Field-driven pixel displacement with color post passes.
//!
//! A scalar field in `[0, 1]` is computed per pixel, either from the
//! source brightness or from smooth value noise. The field moves each
//! pixel along the configured angle and then drives the optional hue,
//! saturation, posterize and colorize passes.

use image::Rgba;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::color::{hsl_to_rgb, pixel_luminance, rgb_to_hsl};
use crate::types::{Rgb, RgbaImage, clamp_channel, finite_or};

/// Where the displacement field comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldSource {
    /// Source luminance.
    #[default]
    Brightness,
    /// Bilinear value noise seeded from the stage RNG.
    Noise,
}

/// Displacement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplacementSettings {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Field source.
    pub source: FieldSource,
    /// Maximum offset in pixels at field extremes.
    pub amount: f64,
    /// Direction of the offset in degrees (0 = right, 90 = down).
    pub angle: f64,
    /// Noise feature size in pixels.
    pub noise_scale: f64,
    /// Hue rotation in degrees at field value 1.
    pub hue_shift: f64,
    /// Saturation swing in percent between field 0 and 1.
    pub saturation_variation: f64,
    /// Posterize levels per channel; below 2 is off.
    pub posterize: u32,
    /// Blend toward `colorizeColor` by the field value.
    pub colorize: bool,
    /// Tint used by colorize.
    pub colorize_color: Rgb,
    /// Colorize strength in percent at field value 1.
    pub colorize_strength: f64,
}

impl Default for DisplacementSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            source: FieldSource::default(),
            amount: 20.0,
            angle: 0.0,
            noise_scale: 50.0,
            hue_shift: 0.0,
            saturation_variation: 0.0,
            posterize: 0,
            colorize: false,
            colorize_color: Rgb::new(255, 0, 128),
            colorize_strength: 50.0,
        }
    }
}

/// Per-pixel field values in row-major order.
#[must_use]
pub fn field<R: Rng + ?Sized>(
    image: &RgbaImage,
    settings: &DisplacementSettings,
    rng: &mut R,
) -> Vec<f64> {
    match settings.source {
        FieldSource::Brightness => image.pixels().map(|p| pixel_luminance(*p) / 255.0).collect(),
        FieldSource::Noise => value_noise(image.width(), image.height(), settings.noise_scale, rng),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn value_noise<R: Rng + ?Sized>(width: u32, height: u32, scale: f64, rng: &mut R) -> Vec<f64> {
    let scale = finite_or(scale, 50.0).max(1.0);
    let gw = (f64::from(width) / scale).ceil() as usize + 2;
    let gh = (f64::from(height) / scale).ceil() as usize + 2;
    let lattice: Vec<f64> = (0..gw * gh).map(|_| rng.gen_range(0.0..1.0)).collect();
    let smooth = |t: f64| t * t * 2.0f64.mul_add(-t, 3.0);

    let mut values = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        let fy = f64::from(y) / scale;
        let y0 = fy.floor() as usize;
        let ty = smooth(fy.fract());
        for x in 0..width {
            let fx = f64::from(x) / scale;
            let x0 = fx.floor() as usize;
            let tx = smooth(fx.fract());
            let at = |gx: usize, gy: usize| lattice[gy * gw + gx];
            let top = (at(x0 + 1, y0) - at(x0, y0)).mul_add(tx, at(x0, y0));
            let bottom = (at(x0 + 1, y0 + 1) - at(x0, y0 + 1)).mul_add(tx, at(x0, y0 + 1));
            values.push((bottom - top).mul_add(ty, top));
        }
    }
    values
}

/// Displace pixels and apply the post passes.
///
/// Each output pixel reads the source pixel at
/// `(x, y) + (2 * field - 1) * amount * (cos angle, sin angle)`,
/// clamped to the canvas. The field value at the destination drives the
/// post passes.
#[must_use]
#[tracing::instrument(skip_all, fields(source = ?settings.source))]
#[allow(clippy::cast_possible_truncation)]
pub fn displace<R: Rng + ?Sized>(
    image: &RgbaImage,
    settings: &DisplacementSettings,
    rng: &mut R,
) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let values = field(image, settings, rng);
    let amount = finite_or(settings.amount, 0.0);
    let (sin, cos) = finite_or(settings.angle, 0.0).to_radians().sin_cos();
    let max_x = f64::from(width - 1);
    let max_y = f64::from(height - 1);

    let mut out = RgbaImage::new(width, height);
    for (i, (x, y, pixel)) in out.enumerate_pixels_mut().enumerate() {
        let f = values[i];
        let offset = f.mul_add(2.0, -1.0) * amount;
        let sx = offset.mul_add(cos, f64::from(x)).round().clamp(0.0, max_x);
        let sy = offset.mul_add(sin, f64::from(y)).round().clamp(0.0, max_y);
        #[allow(clippy::cast_sign_loss)]
        let src = *image.get_pixel(sx as u32, sy as u32);
        *pixel = post_process(src, f, settings);
    }
    out
}

fn post_process(pixel: Rgba<u8>, f: f64, settings: &DisplacementSettings) -> Rgba<u8> {
    let [mut r, mut g, mut b, a] = pixel.0;

    let hue_shift = finite_or(settings.hue_shift, 0.0);
    let variation = finite_or(settings.saturation_variation, 0.0) / 100.0;
    if hue_shift != 0.0 || variation != 0.0 {
        let (h, s, l) = rgb_to_hsl(r, g, b);
        let h = hue_shift.mul_add(f, h);
        let s = (s * f.mul_add(2.0, -1.0).mul_add(variation, 1.0)).clamp(0.0, 1.0);
        (r, g, b) = hsl_to_rgb(h, s, l);
    }

    if settings.posterize >= 2 {
        let top = f64::from(settings.posterize - 1);
        let snap = |v: u8| clamp_channel((f64::from(v) / 255.0 * top).round() / top * 255.0);
        r = snap(r);
        g = snap(g);
        b = snap(b);
    }

    if settings.colorize {
        let t = (finite_or(settings.colorize_strength, 0.0) / 100.0 * f).clamp(0.0, 1.0);
        let tint = settings.colorize_color.0;
        let blend =
            |v: u8, c: u8| clamp_channel((f64::from(c) - f64::from(v)).mul_add(t, f64::from(v)));
        r = blend(r, tint[0]);
        g = blend(g, tint[1]);
        b = blend(b, tint[2]);
    }

    Rgba([r, g, b, a])
}
