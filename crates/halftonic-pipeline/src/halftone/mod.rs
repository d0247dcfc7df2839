//! Halftone dots, single-layer or CMYK separated.
//!
//! [`layout_dots`] decides where every dot goes and how big it is.
//! [`render`] draws that exact list with `tiny-skia`, so the dots it
//! returns are the geometry the SVG exporter reproduces.

pub mod arrangement;
pub mod cmyk;
pub mod shape;

use image::Rgba;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tiny_skia::{BlendMode, Color, FillRule, Paint, Path, PathBuilder, Pixmap, Transform};

pub use arrangement::{Arrangement, ConcentricParams, Layout, SpiralParams, sample_points};
pub use cmyk::{ChannelToggles, CmykAngles, CmykChannel, rgb_to_cmyk};
pub use shape::DotShape;

use crate::color::pixel_luminance;
use crate::geometry::Dot;
use crate::types::{Dimensions, Point, Rgb, RgbaImage, clamp_channel, finite_or};

/// Dots smaller than this are neither drawn nor recorded.
pub const MIN_DOT_SIZE: f64 = 0.5;

/// Halftone settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HalftoneSettings {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Lattice spacing in pixels, at least 1.
    pub cell_size: f64,
    /// Dot size as a fraction of the cell at full tone.
    #[serde(rename = "dotScaleFactor")]
    pub dot_scale: f64,
    /// Random shrink in `0..=1`: each dot is scaled by `1 - sizeVariation * u`.
    pub size_variation: f64,
    /// Dot outline.
    pub shape: DotShape,
    /// Per-dot outline rotation in degrees.
    pub shape_rotation: f64,
    /// Sample-point arrangement and its parameters.
    #[serde(flatten)]
    pub layout: Layout,
    /// Color each dot with its source pixel instead of black.
    pub colored: bool,
    /// Separate into CMYK ink layers.
    #[serde(rename = "enableCMYK")]
    pub enable_cmyk: bool,
    /// Which ink layers are drawn.
    pub channels: ChannelToggles,
    /// Screen angle per ink.
    pub cmyk_angles: CmykAngles,
    /// Size dots by brightness rather than darkness.
    pub invert_brightness: bool,
    /// Dot opacity in percent; below 100 the original shows through.
    pub mix: f64,
}

impl Default for HalftoneSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cell_size: 10.0,
            dot_scale: 1.0,
            size_variation: 0.0,
            shape: DotShape::default(),
            shape_rotation: 0.0,
            layout: Layout::default(),
            colored: false,
            enable_cmyk: false,
            channels: ChannelToggles::default(),
            cmyk_angles: CmykAngles::default(),
            invert_brightness: false,
            mix: 100.0,
        }
    }
}

impl HalftoneSettings {
    /// Lattice spacing with invalid values floored to 1 px.
    #[must_use]
    pub fn effective_cell_size(&self) -> f64 {
        finite_or(self.cell_size, 10.0).max(1.0)
    }

    /// Whether dots are drawn as CMYK layers.
    #[must_use]
    pub const fn uses_cmyk(&self) -> bool {
        self.enable_cmyk && self.channels.any()
    }

    /// Opacity of the original drawn over the dots, or `None` at full mix.
    #[must_use]
    pub fn overlay_opacity(&self) -> Option<f64> {
        let mix = finite_or(self.mix, 100.0).clamp(0.0, 100.0);
        (mix < 100.0).then(|| 1.0 - mix / 100.0)
    }

    /// Outline rotation with non-finite values treated as 0.
    #[must_use]
    pub const fn effective_rotation(&self) -> f64 {
        finite_or(self.shape_rotation, 0.0)
    }
}

/// Result of [`render`].
#[derive(Debug, Clone)]
pub struct HalftoneOutput {
    /// The rendered canvas.
    pub image: RgbaImage,
    /// Every drawn dot in draw order.
    pub dots: Vec<Dot>,
}

fn nearest_pixel(image: &RgbaImage, p: Point) -> Rgba<u8> {
    let (w, h) = image.dimensions();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let x = (p.x.floor().max(0.0) as u32).min(w - 1);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let y = (p.y.floor().max(0.0) as u32).min(h - 1);
    *image.get_pixel(x, y)
}

/// Compute every dot for `image` under `settings`.
///
/// Single-layer dots come out in lattice order. CMYK dots come out layer
/// by layer (cyan, magenta, yellow, black), each layer sorted largest
/// first. The size of a dot is `cell * dotScale * variation * value`,
/// where `value` is darkness (or brightness when inverted) or the ink
/// coverage of the layer.
#[must_use]
pub fn layout_dots<R: Rng + ?Sized>(
    image: &RgbaImage,
    settings: &HalftoneSettings,
    rng: &mut R,
) -> Vec<Dot> {
    layout_dots_scaled(image, settings, 1.0, rng)
}

/// [`layout_dots`] with every size multiplied by `correction`.
///
/// The vector exporter uses this with [`DotShape::area_correction`] when
/// it has to recompute geometry.
#[must_use]
pub fn layout_dots_scaled<R: Rng + ?Sized>(
    image: &RgbaImage,
    settings: &HalftoneSettings,
    correction: f64,
    rng: &mut R,
) -> Vec<Dot> {
    let dims = Dimensions::of(image);
    if dims.width == 0 || dims.height == 0 {
        return Vec::new();
    }
    let cell = settings.effective_cell_size();
    let base = cell * finite_or(settings.dot_scale, 1.0).max(0.0) * finite_or(correction, 1.0);
    let variation = finite_or(settings.size_variation, 0.0).clamp(0.0, 1.0);

    let size_of = |value: f64, rng: &mut R| {
        let factor = if variation > 0.0 {
            variation.mul_add(-rng.gen_range(0.0..1.0), 1.0)
        } else {
            1.0
        };
        base * factor * value
    };

    let mut dots = Vec::new();
    if settings.uses_cmyk() {
        for channel in CmykChannel::ALL {
            if !settings.channels.enabled(channel) {
                continue;
            }
            let angle = settings.cmyk_angles.angle(channel);
            let points = sample_points(dims, cell, &settings.layout, angle, rng);
            let mut layer = Vec::with_capacity(points.len());
            for center in points {
                let px = nearest_pixel(image, center);
                let mut amount = channel.amount(rgb_to_cmyk(px.0[0], px.0[1], px.0[2]));
                if settings.invert_brightness {
                    amount = 1.0 - amount;
                }
                let size = size_of(amount, rng);
                if size >= MIN_DOT_SIZE {
                    layer.push(Dot {
                        center,
                        size,
                        color: channel.ink(),
                        channel: Some(channel),
                    });
                }
            }
            layer.sort_by(|a, b| b.size.total_cmp(&a.size));
            dots.extend(layer);
        }
    } else {
        let points = sample_points(dims, cell, &settings.layout, 0.0, rng);
        for center in points {
            let px = nearest_pixel(image, center);
            let brightness = pixel_luminance(px) / 255.0;
            let value = if settings.invert_brightness {
                brightness
            } else {
                1.0 - brightness
            };
            let size = size_of(value, rng);
            if size >= MIN_DOT_SIZE {
                let color = if settings.colored {
                    Rgb::from_pixel(px)
                } else {
                    Rgb::BLACK
                };
                dots.push(Dot {
                    center,
                    size,
                    color,
                    channel: None,
                });
            }
        }
    }
    dots
}

/// Build the `tiny-skia` path of one dot.
#[allow(clippy::cast_possible_truncation)]
fn dot_path(dot: &Dot, shape: DotShape, rotation: f64) -> Option<Path> {
    match shape.outline(dot.center, dot.size, rotation) {
        None => PathBuilder::from_circle(
            dot.center.x as f32,
            dot.center.y as f32,
            (dot.size / 2.0) as f32,
        ),
        Some(vertices) => {
            let mut pb = PathBuilder::new();
            let mut iter = vertices.iter();
            let first = iter.next()?;
            pb.move_to(first.x as f32, first.y as f32);
            for v in iter {
                pb.line_to(v.x as f32, v.y as f32);
            }
            pb.close();
            pb.finish()
        }
    }
}

/// Render halftone dots for `image`.
///
/// Dots are drawn anti-aliased on white paper: single-layer dots with
/// normal compositing, CMYK layers with multiply blending. When `mix` is
/// below 100 the original is blended over the dots. The alpha channel of
/// the source is copied to the output unchanged.
#[must_use]
#[tracing::instrument(
    skip_all,
    fields(arrangement = %settings.layout.arrangement, shape = %settings.shape)
)]
pub fn render<R: Rng + ?Sized>(
    image: &RgbaImage,
    settings: &HalftoneSettings,
    rng: &mut R,
) -> HalftoneOutput {
    let (width, height) = image.dimensions();
    let dots = layout_dots(image, settings, rng);
    let Some(mut pixmap) = Pixmap::new(width, height) else {
        return HalftoneOutput {
            image: image.clone(),
            dots: Vec::new(),
        };
    };
    pixmap.fill(Color::WHITE);

    let rotation = settings.effective_rotation();
    let mut paint = Paint {
        anti_alias: true,
        ..Paint::default()
    };
    for dot in &dots {
        let Some(path) = dot_path(dot, settings.shape, rotation) else {
            continue;
        };
        let [r, g, b] = dot.color.0;
        paint.set_color_rgba8(r, g, b, 255);
        paint.blend_mode = if dot.channel.is_some() {
            BlendMode::Multiply
        } else {
            BlendMode::SourceOver
        };
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    let opacity = settings.overlay_opacity();
    let data = pixmap.data();
    let mut out = RgbaImage::new(width, height);
    for (i, (pixel, src)) in out.pixels_mut().zip(image.pixels()).enumerate() {
        // The paper is opaque, so premultiplied and straight values agree.
        let off = i * 4;
        let mut rgb = [data[off], data[off + 1], data[off + 2]];
        if let Some(op) = opacity {
            for (c, s) in rgb.iter_mut().zip(src.0) {
                *c = clamp_channel(f64::from(*c).mul_add(1.0 - op, f64::from(s) * op));
            }
        }
        *pixel = Rgba([rgb[0], rgb[1], rgb[2], src.0[3]]);
    }

    tracing::debug!(dots = dots.len(), "halftone rendered");
    HalftoneOutput { image: out, dots }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    fn enabled() -> HalftoneSettings {
        HalftoneSettings {
            enabled: true,
            ..HalftoneSettings::default()
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(5)
    }

    #[test]
    fn solid_black_gives_one_full_dot_per_cell() {
        let out = render(&solid(100, 100, [0, 0, 0]), &enabled(), &mut rng());
        assert_eq!(out.dots.len(), 100);
        for dot in &out.dots {
            assert!((dot.size - 10.0).abs() < 1e-9);
            assert!(((dot.center.x - 5.0) / 10.0).fract().abs() < 1e-9);
            assert!(((dot.center.y - 5.0) / 10.0).fract().abs() < 1e-9);
        }
        // Dot centers are fully inked.
        assert_eq!(out.image.get_pixel(5, 5).0, [0, 0, 0, 255]);
    }

    #[test]
    fn solid_white_gives_no_dots_and_white_paper() {
        let out = render(&solid(20, 20, [255, 255, 255]), &enabled(), &mut rng());
        assert!(out.dots.is_empty());
        assert!(out.image.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn dot_size_is_monotonic_in_darkness() {
        let settings = enabled();
        let mut previous = -1.0;
        for lum in (0..=255u8).rev().step_by(5) {
            let dots = layout_dots(&solid(10, 10, [lum, lum, lum]), &settings, &mut rng());
            let size = dots.first().map_or(0.0, |d| d.size);
            assert!(size >= previous, "size {size} shrank at luminance {lum}");
            previous = size;
        }
    }

    #[test]
    fn inverted_brightness_sizes_by_lightness() {
        let settings = HalftoneSettings {
            invert_brightness: true,
            ..enabled()
        };
        assert!(layout_dots(&solid(10, 10, [0, 0, 0]), &settings, &mut rng()).is_empty());
        let white = layout_dots(&solid(10, 10, [255, 255, 255]), &settings, &mut rng());
        assert_eq!(white.len(), 1);
    }

    #[test]
    fn cmyk_layers_are_ordered_and_sorted() {
        let img = RgbaImage::from_fn(60, 60, |x, y| {
            Rgba([(x * 4) as u8, (y * 4) as u8, 90, 255])
        });
        let settings = HalftoneSettings {
            enable_cmyk: true,
            cell_size: 6.0,
            ..enabled()
        };
        let dots = layout_dots(&img, &settings, &mut rng());
        assert!(!dots.is_empty());
        let order: Vec<_> = dots.iter().map(|d| d.channel.unwrap()).collect();
        let mut sorted = order.clone();
        sorted.sort_by_key(|c| CmykChannel::ALL.iter().position(|x| x == c));
        assert_eq!(order, sorted);
        for pair in dots.windows(2) {
            if pair[0].channel == pair[1].channel {
                assert!(pair[0].size >= pair[1].size);
            }
        }
    }

    #[test]
    fn cmyk_with_no_channels_falls_back_to_single_layer() {
        let settings = HalftoneSettings {
            enable_cmyk: true,
            channels: ChannelToggles {
                c: false,
                m: false,
                y: false,
                k: false,
            },
            ..enabled()
        };
        let dots = layout_dots(&solid(20, 20, [0, 0, 0]), &settings, &mut rng());
        assert!(dots.iter().all(|d| d.channel.is_none()));
    }

    #[test]
    fn colored_dots_take_source_color() {
        let settings = HalftoneSettings {
            colored: true,
            ..enabled()
        };
        let dots = layout_dots(&solid(20, 20, [200, 0, 0]), &settings, &mut rng());
        assert!(dots.iter().all(|d| d.color == Rgb::new(200, 0, 0)));
    }

    #[test]
    fn zero_mix_returns_original_colors() {
        let img = solid(20, 20, [90, 120, 30]);
        let settings = HalftoneSettings {
            mix: 0.0,
            ..enabled()
        };
        let out = render(&img, &settings, &mut rng());
        assert_eq!(out.image, img);
    }

    #[test]
    fn alpha_is_preserved() {
        let img = RgbaImage::from_fn(20, 20, |x, _| Rgba([0, 0, 0, (x * 10) as u8]));
        let out = render(&img, &enabled(), &mut rng());
        for (a, b) in img.pixels().zip(out.image.pixels()) {
            assert_eq!(a.0[3], b.0[3]);
        }
    }

    #[test]
    fn tiny_dots_are_skipped() {
        let settings = HalftoneSettings {
            cell_size: 1.0,
            dot_scale: 0.4,
            ..enabled()
        };
        assert!(layout_dots(&solid(5, 5, [0, 0, 0]), &settings, &mut rng()).is_empty());
    }

    #[test]
    fn settings_tolerate_missing_fields() {
        let settings: HalftoneSettings = serde_json::from_str(
            r#"{"enabled":true,"arrangement":"concentric","dotScaleFactor":0.8}"#,
        )
        .unwrap();
        assert_eq!(settings.layout.arrangement, Arrangement::Concentric);
        assert!((settings.dot_scale - 0.8).abs() < f64::EPSILON);
        assert!((settings.cell_size - 10.0).abs() < f64::EPSILON);
        assert!((settings.layout.concentric.ring_spacing - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn every_shape_renders() {
        for shape in DotShape::ALL {
            let settings = HalftoneSettings {
                shape,
                shape_rotation: 10.0,
                ..enabled()
            };
            let out = render(&solid(30, 30, [0, 0, 0]), &settings, &mut rng());
            assert_eq!(out.dots.len(), 9, "{shape}");
            assert!(out.image.pixels().any(|p| p.0[0] < 128), "{shape} drew nothing");
        }
    }
}
