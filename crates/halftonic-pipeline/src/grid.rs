//! Grid split: cut the canvas into cells, optionally subdivide them, and
//! rotate or resample each leaf independently.

use image::imageops::{self, FilterType};
use image::Rgba;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Rgb, RgbaImage, finite_or};

/// Grid settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridSettings {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Top-level columns, at least 1.
    pub columns: u32,
    /// Top-level rows, at least 1.
    pub rows: u32,
    /// Largest rotation of a cell in degrees, either direction.
    pub max_rotation: f64,
    /// Allow recursive 2x2 subdivision.
    pub split_enabled: bool,
    /// Maximum subdivision depth.
    pub max_split_levels: u32,
    /// Chance in `0..=1` that a cell splits at each level.
    pub split_probability: f64,
    /// Cells never split into halves smaller than this, in pixels.
    pub min_cell_size: u32,
    /// Chance in `0..=1` that a cell is pixelated.
    pub resample_probability: f64,
    /// Pixelation scale in `(0, 1]`.
    pub resample_scale: f64,
    /// Fill uncovered by rotated cells.
    pub background: Rgb,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            columns: 4,
            rows: 4,
            max_rotation: 15.0,
            split_enabled: false,
            max_split_levels: 2,
            split_probability: 0.5,
            min_cell_size: 20,
            resample_probability: 0.0,
            resample_scale: 0.25,
            background: Rgb::WHITE,
        }
    }
}

/// One leaf cell of the grid, in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
    /// Subdivision depth, 0 for top-level cells.
    pub level: u32,
}

/// Leaf cells for a `width x height` canvas.
///
/// Top-level boundaries are `i * width / columns`, so cells tile the canvas
/// exactly. Subdivision halves both axes and only happens while both
/// halves stay at least `minCellSize` wide.
#[must_use]
pub fn cell_layout<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    settings: &GridSettings,
    rng: &mut R,
) -> Vec<GridCell> {
    let columns = settings.columns.clamp(1, width.max(1));
    let rows = settings.rows.clamp(1, height.max(1));
    let edge = |i: u32, n: u32, len: u32| {
        u32::try_from(u64::from(i) * u64::from(len) / u64::from(n)).unwrap_or(len)
    };

    let mut leaves = Vec::new();
    for row in 0..rows {
        let y0 = edge(row, rows, height);
        let y1 = edge(row + 1, rows, height);
        for col in 0..columns {
            let x0 = edge(col, columns, width);
            let x1 = edge(col + 1, columns, width);
            let cell = GridCell {
                x: x0,
                y: y0,
                width: x1 - x0,
                height: y1 - y0,
                level: 0,
            };
            subdivide(cell, settings, rng, &mut leaves);
        }
    }
    leaves
}

fn subdivide<R: Rng + ?Sized>(
    cell: GridCell,
    settings: &GridSettings,
    rng: &mut R,
    leaves: &mut Vec<GridCell>,
) {
    let half_w = cell.width / 2;
    let half_h = cell.height / 2;
    let min = settings.min_cell_size.max(1);
    let chance = finite_or(settings.split_probability, 0.0).clamp(0.0, 1.0);
    let can_split = settings.split_enabled
        && cell.level < settings.max_split_levels
        && half_w >= min
        && half_h >= min;
    if !can_split || rng.gen_range(0.0..1.0) >= chance {
        leaves.push(cell);
        return;
    }
    let level = cell.level + 1;
    let quads = [
        (cell.x, cell.y, half_w, half_h),
        (cell.x + half_w, cell.y, cell.width - half_w, half_h),
        (cell.x, cell.y + half_h, half_w, cell.height - half_h),
        (cell.x + half_w, cell.y + half_h, cell.width - half_w, cell.height - half_h),
    ];
    for (x, y, width, height) in quads {
        subdivide(
            GridCell {
                x,
                y,
                width,
                height,
                level,
            },
            settings,
            rng,
            leaves,
        );
    }
}

/// Apply the grid split.
///
/// Every leaf is cropped from `image`, optionally pixelated by a
/// nearest-neighbor down/up resample, rotated about its own center by a
/// random angle within `maxRotation`, and pasted back at its position.
/// Corners uncovered by the rotation take the background color.
#[must_use]
#[tracing::instrument(skip_all, fields(columns = settings.columns, rows = settings.rows))]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn split<R: Rng + ?Sized>(
    image: &RgbaImage,
    settings: &GridSettings,
    rng: &mut R,
) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let [r, g, b] = settings.background.0;
    let fill = Rgba([r, g, b, 255]);
    let mut out = RgbaImage::from_pixel(width, height, fill);

    let max_rotation = finite_or(settings.max_rotation, 0.0).abs().min(180.0);
    let resample_chance = finite_or(settings.resample_probability, 0.0).clamp(0.0, 1.0);
    let scale = finite_or(settings.resample_scale, 1.0).clamp(0.01, 1.0);

    let cells = cell_layout(width, height, settings, rng);
    tracing::debug!(cells = cells.len(), "grid layout");
    for cell in cells {
        if cell.width == 0 || cell.height == 0 {
            continue;
        }
        let mut tile =
            imageops::crop_imm(image, cell.x, cell.y, cell.width, cell.height).to_image();

        if resample_chance > 0.0 && rng.gen_range(0.0..1.0) < resample_chance {
            let small_w = ((f64::from(cell.width) * scale).round() as u32).max(1);
            let small_h = ((f64::from(cell.height) * scale).round() as u32).max(1);
            let small = imageops::resize(&tile, small_w, small_h, FilterType::Nearest);
            tile = imageops::resize(&small, cell.width, cell.height, FilterType::Nearest);
        }

        if max_rotation > 0.0 {
            let degrees = rng.gen_range(-max_rotation..=max_rotation);
            tile = rotate_about_center(
                &tile,
                degrees.to_radians() as f32,
                Interpolation::Nearest,
                fill,
            );
        }

        imageops::replace(&mut out, &tile, i64::from(cell.x), i64::from(cell.y));
    }
    out
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn area(cells: &[GridCell]) -> u64 {
        cells
            .iter()
            .map(|c| u64::from(c.width) * u64::from(c.height))
            .sum()
    }

    #[test]
    fn top_level_cells_tile_canvas() {
        let settings = GridSettings {
            columns: 3,
            rows: 2,
            ..GridSettings::default()
        };
        let cells = cell_layout(100, 50, &settings, &mut StdRng::seed_from_u64(0));
        assert_eq!(cells.len(), 6);
        assert_eq!(area(&cells), 100 * 50);
    }

    #[test]
    fn certain_split_respects_depth_and_min_size() {
        let settings = GridSettings {
            columns: 1,
            rows: 1,
            split_enabled: true,
            split_probability: 1.0,
            max_split_levels: 3,
            min_cell_size: 10,
            ..GridSettings::default()
        };
        let cells = cell_layout(80, 80, &settings, &mut StdRng::seed_from_u64(0));
        // 80 -> 40 -> 20 -> 10: three levels, 64 leaves.
        assert_eq!(cells.len(), 64);
        assert!(cells.iter().all(|c| c.level == 3 && c.width == 10));
        assert_eq!(area(&cells), 80 * 80);

        let shallow = GridSettings {
            min_cell_size: 25,
            ..settings
        };
        let cells = cell_layout(80, 80, &shallow, &mut StdRng::seed_from_u64(0));
        assert!(cells.iter().all(|c| c.width >= 25));
    }

    #[test]
    fn zero_columns_are_clamped() {
        let settings = GridSettings {
            columns: 0,
            rows: 0,
            ..GridSettings::default()
        };
        assert_eq!(cell_layout(10, 10, &settings, &mut StdRng::seed_from_u64(0)).len(), 1);
    }

    #[test]
    fn no_rotation_no_resample_is_identity_for_opaque_images() {
        let img = RgbaImage::from_fn(30, 20, |x, y| Rgba([x as u8 * 8, y as u8 * 12, 7, 255]));
        let settings = GridSettings {
            enabled: true,
            max_rotation: 0.0,
            ..GridSettings::default()
        };
        assert_eq!(split(&img, &settings, &mut StdRng::seed_from_u64(0)), img);
    }

    #[test]
    fn rotation_is_seeded_and_changes_pixels() {
        let img = RgbaImage::from_fn(40, 40, |x, y| Rgba([x as u8 * 6, y as u8 * 6, 0, 255]));
        let settings = GridSettings {
            enabled: true,
            max_rotation: 30.0,
            ..GridSettings::default()
        };
        let a = split(&img, &settings, &mut StdRng::seed_from_u64(12));
        let b = split(&img, &settings, &mut StdRng::seed_from_u64(12));
        assert_eq!(a, b);
        assert_ne!(a, img);
    }

    #[test]
    fn resampling_pixelates_cells() {
        let img = RgbaImage::from_fn(16, 16, |x, y| Rgba([x as u8 * 16, y as u8 * 16, 0, 255]));
        let settings = GridSettings {
            enabled: true,
            columns: 1,
            rows: 1,
            max_rotation: 0.0,
            resample_probability: 1.0,
            resample_scale: 0.25,
            ..GridSettings::default()
        };
        let out = split(&img, &settings, &mut StdRng::seed_from_u64(0));
        // 16 px cell at 0.25 scale: 4x4 blocks of equal color.
        assert_eq!(out.get_pixel(0, 0), out.get_pixel(3, 3));
        assert_ne!(out.get_pixel(0, 0), out.get_pixel(4, 0));
    }
}
