//! Glitch effects applied in a fixed sub-order: pixel sort, channel
//! shift, scan lines, noise, block displacement.
//!
//! Each sub-effect rewrites the color channels of the working buffer in
//! place. Alpha stays where it was.

use std::fmt;

use image::Rgba;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::color::{luminance, pixel_luminance};
use crate::types::{RgbaImage, clamp_channel, finite_or};

/// Axis along which pixel runs are sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    /// Sort runs within rows.
    #[default]
    Horizontal,
    /// Sort runs within columns.
    Vertical,
}

/// Which channels a channel shift moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelShiftMode {
    /// Red right, blue left.
    #[default]
    RedBlue,
    /// Red right, green left.
    RedGreen,
    /// Green right, blue left.
    GreenBlue,
    /// Red right, green down, blue left.
    Rgb,
}

impl fmt::Display for ChannelShiftMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RedBlue => "redBlue",
            Self::RedGreen => "redGreen",
            Self::GreenBlue => "greenBlue",
            Self::Rgb => "rgb",
        })
    }
}

/// Pixel sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PixelSortSettings {
    /// Whether pixel sorting runs.
    pub enabled: bool,
    /// Only runs of pixels brighter than this are sorted.
    pub threshold: u8,
    /// Sort axis.
    pub direction: SortDirection,
    /// Sort bright to dark instead of dark to bright.
    pub reverse: bool,
}

impl Default for PixelSortSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 128,
            direction: SortDirection::default(),
            reverse: false,
        }
    }
}

/// RGB channel offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelShiftSettings {
    /// Whether the channel shift runs.
    pub enabled: bool,
    /// Offset in pixels; negative values shift the other way.
    pub amount: i32,
    /// Channel pairing.
    pub mode: ChannelShiftMode,
}

impl Default for ChannelShiftSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 5,
            mode: ChannelShiftMode::default(),
        }
    }
}

/// Periodic darkening bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanLineSettings {
    /// Whether scan lines run.
    pub enabled: bool,
    /// Number of bands over the image height.
    pub count: u32,
    /// Darkening of each band, percent.
    pub intensity: f64,
}

impl Default for ScanLineSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            count: 50,
            intensity: 50.0,
        }
    }
}

/// Additive monochrome noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NoiseSettings {
    /// Whether noise runs.
    pub enabled: bool,
    /// Peak perturbation, percent of full scale.
    pub amount: f64,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 20.0,
        }
    }
}

/// Block displacement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockSettings {
    /// Whether block displacement runs.
    pub enabled: bool,
    /// Block edge length in pixels.
    pub size: u32,
    /// Maximum source offset in pixels on each axis.
    pub offset: u32,
    /// Chance that a block is displaced, percent.
    pub density: f64,
}

impl Default for BlockSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            size: 20,
            offset: 20,
            density: 30.0,
        }
    }
}

/// Glitch settings: a master flag plus one block per sub-effect.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlitchSettings {
    /// Master flag.
    pub enabled: bool,
    /// Pixel sorting.
    pub pixel_sort: PixelSortSettings,
    /// Channel shift.
    pub channel_shift: ChannelShiftSettings,
    /// Scan lines.
    pub scan_lines: ScanLineSettings,
    /// Noise.
    pub noise: NoiseSettings,
    /// Block displacement.
    pub blocks: BlockSettings,
}

/// Apply every enabled sub-effect in order.
#[must_use]
#[tracing::instrument(skip_all)]
pub fn apply<R: Rng + ?Sized>(
    image: &RgbaImage,
    settings: &GlitchSettings,
    rng: &mut R,
) -> RgbaImage {
    let mut out = image.clone();
    if settings.pixel_sort.enabled {
        pixel_sort(&mut out, &settings.pixel_sort);
    }
    if settings.channel_shift.enabled {
        channel_shift(&mut out, &settings.channel_shift);
    }
    if settings.scan_lines.enabled {
        scan_lines(&mut out, &settings.scan_lines);
    }
    if settings.noise.enabled {
        add_noise(&mut out, &settings.noise, rng);
    }
    if settings.blocks.enabled {
        displace_blocks(&mut out, &settings.blocks, rng);
    }
    out
}

/// Sort maximal runs of pixels brighter than the threshold by luminance.
pub fn pixel_sort(image: &mut RgbaImage, settings: &PixelSortSettings) {
    let (width, height) = image.dimensions();
    let (lines, len) = match settings.direction {
        SortDirection::Horizontal => (height, width),
        SortDirection::Vertical => (width, height),
    };
    let at = |line: u32, i: u32| match settings.direction {
        SortDirection::Horizontal => (i, line),
        SortDirection::Vertical => (line, i),
    };
    let level = f64::from(settings.threshold);

    for line in 0..lines {
        let mut i = 0;
        while i < len {
            let (x, y) = at(line, i);
            if pixel_luminance(*image.get_pixel(x, y)) <= level {
                i += 1;
                continue;
            }
            let start = i;
            while i < len {
                let (x, y) = at(line, i);
                if pixel_luminance(*image.get_pixel(x, y)) <= level {
                    break;
                }
                i += 1;
            }
            let mut run: Vec<[u8; 3]> = (start..i)
                .map(|k| {
                    let (x, y) = at(line, k);
                    let p = image.get_pixel(x, y).0;
                    [p[0], p[1], p[2]]
                })
                .collect();
            run.sort_by(|a, b| {
                let la = luminance(a[0], a[1], a[2]);
                let lb = luminance(b[0], b[1], b[2]);
                if settings.reverse {
                    lb.total_cmp(&la)
                } else {
                    la.total_cmp(&lb)
                }
            });
            for (k, rgb) in (start..i).zip(run) {
                let (x, y) = at(line, k);
                image.get_pixel_mut(x, y).0[..3].copy_from_slice(&rgb);
            }
        }
    }
}

/// Offset color channels against each other, clamping at the edges.
pub fn channel_shift(image: &mut RgbaImage, settings: &ChannelShiftSettings) {
    let (width, height) = image.dimensions();
    // Shifts beyond the canvas all clamp to the same edge pixel.
    let reach = i64::from(width.max(height));
    let amount = i64::from(settings.amount).clamp(-reach, reach);
    if amount == 0 {
        return;
    }
    // (channel, dx, dy) for each moved channel.
    let moves: &[(usize, i64, i64)] = match settings.mode {
        ChannelShiftMode::RedBlue => &[(0, amount, 0), (2, -amount, 0)],
        ChannelShiftMode::RedGreen => &[(0, amount, 0), (1, -amount, 0)],
        ChannelShiftMode::GreenBlue => &[(1, amount, 0), (2, -amount, 0)],
        ChannelShiftMode::Rgb => &[(0, amount, 0), (1, 0, amount), (2, -amount, 0)],
    };
    let source = image.clone();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        for &(channel, dx, dy) in moves {
            let sx = clamp_coord(i64::from(x) - dx, width);
            let sy = clamp_coord(i64::from(y) - dy, height);
            pixel.0[channel] = source.get_pixel(sx, sy).0[channel];
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_coord(v: i64, len: u32) -> u32 {
    v.clamp(0, i64::from(len) - 1) as u32
}

/// Darken the first half of every `height / count` row period.
///
/// `count` saturates at `height / 2`, the most bands that still leave a
/// lit row between them.
pub fn scan_lines(image: &mut RgbaImage, settings: &ScanLineSettings) {
    let height = image.height();
    if settings.count == 0 || height == 0 {
        return;
    }
    let count = settings.count.min((height / 2).max(1));
    let period = (height / count).max(1);
    let band = (period / 2).max(1);
    let keep = 1.0 - finite_or(settings.intensity, 0.0).clamp(0.0, 100.0) / 100.0;
    for (_, y, pixel) in image.enumerate_pixels_mut() {
        if y % period < band {
            for c in &mut pixel.0[..3] {
                *c = clamp_channel(f64::from(*c) * keep);
            }
        }
    }
}

/// Add the same random offset to all three channels of each pixel.
pub fn add_noise<R: Rng + ?Sized>(image: &mut RgbaImage, settings: &NoiseSettings, rng: &mut R) {
    let peak = finite_or(settings.amount, 0.0).clamp(0.0, 100.0) * 2.55;
    if peak == 0.0 {
        return;
    }
    for pixel in image.pixels_mut() {
        let delta = rng.gen_range(-1.0..=1.0) * peak;
        for c in &mut pixel.0[..3] {
            *c = clamp_channel(f64::from(*c) + delta);
        }
    }
}

/// Copy randomly chosen blocks from a randomly offset source position.
///
/// Reads from a snapshot taken before any block moves, so displaced
/// blocks never cascade.
pub fn displace_blocks<R: Rng + ?Sized>(
    image: &mut RgbaImage,
    settings: &BlockSettings,
    rng: &mut R,
) {
    let (width, height) = image.dimensions();
    let size = settings.size.max(1);
    let chance = finite_or(settings.density, 0.0).clamp(0.0, 100.0) / 100.0;
    let offset = i64::from(settings.offset);
    let source = image.clone();

    for by in (0..height).step_by(size as usize) {
        for bx in (0..width).step_by(size as usize) {
            if rng.gen_range(0.0..1.0) >= chance {
                continue;
            }
            let dx = rng.gen_range(-offset..=offset);
            let dy = rng.gen_range(-offset..=offset);
            for y in by..(by + size).min(height) {
                for x in bx..(bx + size).min(width) {
                    let sx = clamp_coord(i64::from(x) + dx, width);
                    let sy = clamp_coord(i64::from(y) + dy, height);
                    let src: Rgba<u8> = *source.get_pixel(sx, sy);
                    image.get_pixel_mut(x, y).0[..3].copy_from_slice(&src.0[..3]);
                }
            }
        }
    }
}
