//! Ordered and error-diffusion dithering.
//!
//! The image is first reduced to `resolution` percent of its size with
//! nearest-neighbor sampling (the pixelation knob), quantized to a small
//! gray ramp or a k-means palette, and scaled back up with nearest-neighbor
//! so each low-resolution pixel becomes a hard-edged block.
//!
//! When those blocks are at least 2x2 canvas pixels the stage also returns
//! them as rectangle [`Cell`]s, run-merged along rows, so the SVG exporter
//! can emit exactly what was drawn.

pub mod kernels;
pub mod palette;

use std::fmt;

use image::Rgba;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub use kernels::{BayerSize, DiffusionKernel};

use crate::color::luminance;
use crate::geometry::Cell;
use crate::types::{Rgb, RgbaImage, clamp_channel, finite_or};

/// Quantization algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DitherAlgorithm {
    /// Bayer threshold matrix, no error carried between pixels.
    Ordered,
    /// Floyd-Steinberg error diffusion.
    #[default]
    FloydSteinberg,
    /// Jarvis error diffusion.
    Jarvis,
    /// Judice-Ninke error diffusion.
    JudiceNinke,
    /// Stucki error diffusion.
    Stucki,
    /// Burkes error diffusion.
    Burkes,
}

impl DitherAlgorithm {
    /// Every algorithm.
    pub const ALL: [Self; 6] = [
        Self::Ordered,
        Self::FloydSteinberg,
        Self::Jarvis,
        Self::JudiceNinke,
        Self::Stucki,
        Self::Burkes,
    ];

    /// Name used in settings documents.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ordered => "ordered",
            Self::FloydSteinberg => "floyd-steinberg",
            Self::Jarvis => "jarvis",
            Self::JudiceNinke => "judice-ninke",
            Self::Stucki => "stucki",
            Self::Burkes => "burkes",
        }
    }

    /// Look up an algorithm by name (case-insensitive, `-` or `_`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|a| a.name() == wanted)
    }

    /// The diffusion kernel, or `None` for ordered dithering.
    #[must_use]
    pub fn kernel(self) -> Option<&'static DiffusionKernel> {
        match self {
            Self::Ordered => None,
            Self::FloydSteinberg => Some(&kernels::FLOYD_STEINBERG),
            Self::Jarvis => Some(&kernels::JARVIS),
            Self::JudiceNinke => Some(&kernels::JUDICE_NINKE),
            Self::Stucki => Some(&kernels::STUCKI),
            Self::Burkes => Some(&kernels::BURKES),
        }
    }
}

impl fmt::Display for DitherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether to quantize to a gray ramp or to an image-derived palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColorMode {
    /// Evenly spaced gray levels.
    #[default]
    Grayscale,
    /// K-means palette of the image.
    Color,
}

/// Dithering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DitherSettings {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Quantization algorithm.
    pub algorithm: DitherAlgorithm,
    /// Pixels with luminance below this are forced to black.
    pub threshold: u8,
    /// Gray ramp or palette.
    pub color_mode: ColorMode,
    /// Working resolution in percent of the canvas, `1..=100`.
    pub resolution: f64,
    /// Number of gray levels or palette entries, at least 2.
    pub color_depth: u32,
    /// Matrix used by [`DitherAlgorithm::Ordered`].
    pub bayer_size: BayerSize,
}

impl Default for DitherSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: DitherAlgorithm::default(),
            threshold: 0,
            color_mode: ColorMode::default(),
            resolution: 100.0,
            color_depth: 2,
            bayer_size: BayerSize::default(),
        }
    }
}

/// Result of [`dither`].
#[derive(Debug, Clone)]
pub struct DitherOutput {
    /// The dithered canvas.
    pub image: RgbaImage,
    /// Visible cells, when each working pixel covers at least 2x2 canvas
    /// pixels.
    pub cells: Option<Vec<Cell>>,
}

/// Nearest-neighbor source index for destination index `dst`.
///
/// Samples at pixel centers. Used for both the downscale and the upscale
/// so recorded cells land exactly on the upscaled blocks.
#[allow(clippy::cast_possible_truncation)]
const fn source_index(dst: u32, dst_len: u32, src_len: u32) -> u32 {
    let index = ((2 * dst as u64 + 1) * src_len as u64) / (2 * dst_len as u64);
    let last = src_len as u64 - 1;
    (if index > last { last } else { index }) as u32
}

fn resample_nearest(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (sw, sh) = image.dimensions();
    if (sw, sh) == (width, height) {
        return image.clone();
    }
    RgbaImage::from_fn(width, height, |x, y| {
        *image.get_pixel(source_index(x, width, sw), source_index(y, height, sh))
    })
}

/// For every source index, the half-open range of destination indices that
/// sample it.
fn spans(dst_len: u32, src_len: u32) -> Vec<(u32, u32)> {
    let mut spans = vec![(0, 0); src_len as usize];
    let mut next_start = 0;
    for (src, span) in spans.iter_mut().enumerate() {
        let start = next_start;
        let mut end = start;
        while end < dst_len && source_index(end, dst_len, src_len) as usize == src {
            end += 1;
        }
        *span = (start, end);
        next_start = end;
    }
    spans
}

/// Working-resolution size of an axis of `len` pixels at `percent`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scaled_len(len: u32, percent: f64) -> u32 {
    let percent = finite_or(percent, 100.0).clamp(1.0, 100.0);
    let scaled = (f64::from(len) * percent / 100.0).round() as u32;
    scaled.clamp(1, len.max(1))
}

/// Dither `image`.
///
/// `rng` seeds palette clustering in color mode and is otherwise unused,
/// so grayscale output is fully deterministic.
#[must_use]
#[tracing::instrument(skip_all, fields(algorithm = %settings.algorithm))]
pub fn dither<R: Rng + ?Sized>(
    image: &RgbaImage,
    settings: &DitherSettings,
    rng: &mut R,
) -> DitherOutput {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return DitherOutput {
            image: image.clone(),
            cells: None,
        };
    }

    let low_w = scaled_len(width, settings.resolution);
    let low_h = scaled_len(height, settings.resolution);
    let low = resample_nearest(image, low_w, low_h);
    let depth = settings.color_depth.clamp(2, 256);

    let quantized = match settings.color_mode {
        ColorMode::Grayscale => quantize_gray(&low, settings, depth),
        ColorMode::Color => {
            let palette = palette::kmeans(&low, depth as usize, rng);
            quantize_palette(&low, settings, &palette, depth)
        }
    };

    let mut low_out = low;
    for (pixel, color) in low_out.pixels_mut().zip(&quantized) {
        let alpha = pixel.0[3];
        *pixel = Rgba([color.0[0], color.0[1], color.0[2], alpha]);
    }

    let visible = low_w * 2 <= width && low_h * 2 <= height;
    let cells = visible.then(|| visible_cells(&quantized, low_w, low_h, width, height));
    tracing::debug!(
        low_w,
        low_h,
        depth,
        cells = cells.as_ref().map_or(0, Vec::len),
        "dithered"
    );

    DitherOutput {
        image: resample_nearest(&low_out, width, height),
        cells,
    }
}

fn forced_black(pixel: Rgba<u8>, threshold: u8) -> bool {
    luminance(pixel.0[0], pixel.0[1], pixel.0[2]) < f64::from(threshold)
}

fn quantize_gray(low: &RgbaImage, settings: &DitherSettings, depth: u32) -> Vec<Rgb> {
    let (w, h) = low.dimensions();
    let top = f64::from(depth - 1);
    let step = 255.0 / top;
    let snap = |v: f64| (v / step).round().clamp(0.0, top) * step;

    let mut values: Vec<f64> = low
        .pixels()
        .map(|p| {
            if forced_black(*p, settings.threshold) {
                0.0
            } else {
                luminance(p.0[0], p.0[1], p.0[2])
            }
        })
        .collect();

    let mut out = Vec::with_capacity(values.len());
    match settings.algorithm.kernel() {
        None => {
            for y in 0..h {
                for x in 0..w {
                    let v = values[(y * w + x) as usize];
                    let bias = (f64::from(settings.bayer_size.threshold(x, y)) - 0.5) * step;
                    let level = clamp_channel(snap(v + bias));
                    out.push(Rgb::new(level, level, level));
                }
            }
        }
        Some(kernel) => {
            for y in 0..h {
                for x in 0..w {
                    let i = (y * w + x) as usize;
                    let old = values[i];
                    let new = snap(old);
                    let error = old - new;
                    for_each_tap(kernel, x, y, w, h, |j, weight| {
                        values[j] += error * weight;
                    });
                    let level = clamp_channel(new);
                    out.push(Rgb::new(level, level, level));
                }
            }
        }
    }
    out
}

fn quantize_palette(
    low: &RgbaImage,
    settings: &DitherSettings,
    palette: &[Rgb],
    depth: u32,
) -> Vec<Rgb> {
    let (w, h) = low.dimensions();
    let entries = palette::to_entries(palette);
    let spread = 255.0 / f64::from(depth - 1);

    let mut values: Vec<[f64; 3]> = low
        .pixels()
        .map(|p| {
            if forced_black(*p, settings.threshold) {
                [0.0; 3]
            } else {
                [f64::from(p.0[0]), f64::from(p.0[1]), f64::from(p.0[2])]
            }
        })
        .collect();

    let mut out = Vec::with_capacity(values.len());
    let kernel = settings.algorithm.kernel();
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) as usize;
            let old = values[i];
            let chosen = match kernel {
                None => {
                    let bias = (f64::from(settings.bayer_size.threshold(x, y)) - 0.5) * spread;
                    palette::nearest_entry(&entries, old.map(|c| c + bias))
                }
                Some(kernel) => {
                    let index = palette::nearest_entry(&entries, old);
                    let target = entries[index];
                    let error = [old[0] - target[0], old[1] - target[1], old[2] - target[2]];
                    for_each_tap(kernel, x, y, w, h, |j, weight| {
                        for (v, e) in values[j].iter_mut().zip(error) {
                            *v += e * weight;
                        }
                    });
                    index
                }
            };
            out.push(palette[chosen]);
        }
    }
    out
}

/// Call `apply(index, weight)` for every in-bounds forward neighbor.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn for_each_tap(
    kernel: &DiffusionKernel,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    mut apply: impl FnMut(usize, f64),
) {
    for &(dx, dy, weight) in kernel.taps {
        let nx = x as i64 + i64::from(dx);
        let ny = y as i64 + i64::from(dy);
        if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
            continue;
        }
        apply((ny as usize) * (w as usize) + nx as usize, f64::from(weight));
    }
}

/// Rectangles covering the upscaled canvas, merging equal-color runs
/// within each working-resolution row.
fn visible_cells(colors: &[Rgb], low_w: u32, low_h: u32, width: u32, height: u32) -> Vec<Cell> {
    let cols = spans(width, low_w);
    let rows = spans(height, low_h);
    let mut cells = Vec::new();

    for (ly, &(y0, y1)) in rows.iter().enumerate() {
        if y1 == y0 {
            continue;
        }
        let row = &colors[ly * low_w as usize..(ly + 1) * low_w as usize];
        let mut start = 0;
        while start < row.len() {
            let color = row[start];
            let mut end = start + 1;
            while end < row.len() && row[end] == color {
                end += 1;
            }
            let x0 = cols[start].0;
            let x1 = cols[end - 1].1;
            if x1 > x0 {
                cells.push(Cell {
                    x: x0,
                    y: y0,
                    width: x1 - x0,
                    height: y1 - y0,
                    color,
                });
            }
            start = end;
        }
    }
    cells
}
