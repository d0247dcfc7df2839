//! Sample-point layouts for halftone dots.
//!
//! Every arrangement starts from the same square lattice with
//! `cellSize` spacing and cell-centered points. Grid, hexagonal and random
//! layouts then rotate the lattice by the screen angle about the canvas
//! center; spiral and concentric layouts remap each point in polar
//! coordinates around their own center. Points landing outside the canvas
//! are dropped.

use std::f64::consts::PI;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Point, finite_or};

/// Spatial layout of sample points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Arrangement {
    /// Regular square lattice.
    #[default]
    Grid,
    /// Alternate rows offset by half a cell, rows `sqrt(3)/2` cells apart.
    Hexagonal,
    /// Lattice swirled around a center.
    Spiral,
    /// Lattice snapped onto concentric rings.
    Concentric,
    /// Lattice jittered by up to half a cell on each axis.
    Random,
}

impl fmt::Display for Arrangement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Grid => "grid",
            Self::Hexagonal => "hexagonal",
            Self::Spiral => "spiral",
            Self::Concentric => "concentric",
            Self::Random => "random",
        })
    }
}

/// Spiral parameters. Centers are percentages of the canvas size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpiralParams {
    /// Horizontal center in percent of width.
    pub center_x: f64,
    /// Vertical center in percent of height.
    pub center_y: f64,
    /// Constant rotation in degrees.
    pub rotation: f64,
    /// Twist per cell of distance from the center, in radians.
    pub tightness: f64,
    /// Multiplier on `tightness`.
    pub expansion: f64,
}

impl Default for SpiralParams {
    fn default() -> Self {
        Self {
            center_x: 50.0,
            center_y: 50.0,
            rotation: 0.0,
            tightness: 0.1,
            expansion: 1.0,
        }
    }
}

/// Concentric ring parameters. Centers are percentages of the canvas size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConcentricParams {
    /// Horizontal center in percent of width.
    pub center_x: f64,
    /// Vertical center in percent of height.
    pub center_y: f64,
    /// Ring spacing in cells.
    pub ring_spacing: f64,
}

impl Default for ConcentricParams {
    fn default() -> Self {
        Self {
            center_x: 50.0,
            center_y: 50.0,
            ring_spacing: 1.0,
        }
    }
}

/// An arrangement with the parameters of every arrangement kind.
///
/// Only the parameters of the selected kind are read; the others are
/// carried so switching arrangements keeps their values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Layout {
    /// Selected arrangement.
    pub arrangement: Arrangement,
    /// Spiral parameters.
    pub spiral: SpiralParams,
    /// Concentric parameters.
    pub concentric: ConcentricParams,
}

fn percent_point(dims: Dimensions, x: f64, y: f64) -> Point {
    Point::new(
        f64::from(dims.width) * finite_or(x, 50.0) / 100.0,
        f64::from(dims.height) * finite_or(y, 50.0) / 100.0,
    )
}

/// Sample points for one dot layer.
///
/// `cell` is the lattice spacing (floored at 1 px) and `angle` the screen
/// angle in degrees. The random arrangement draws two values from `rng`
/// per lattice point; other arrangements never touch it.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn sample_points<R: Rng + ?Sized>(
    dims: Dimensions,
    cell: f64,
    layout: &Layout,
    angle: f64,
    rng: &mut R,
) -> Vec<Point> {
    if dims.width == 0 || dims.height == 0 {
        return Vec::new();
    }
    let cell = finite_or(cell, 1.0).max(1.0);
    let theta = finite_or(angle, 0.0).to_radians();

    let row_step = if layout.arrangement == Arrangement::Hexagonal {
        cell * 3.0_f64.sqrt() / 2.0
    } else {
        cell
    };
    let (x0, x1, y0, y1) = lattice_bounds(dims, cell, layout, theta);
    let i_min = (x0 / cell).floor() as i64;
    let i_max = (x1 / cell).ceil() as i64;
    let j_min = (y0 / row_step).floor() as i64;
    let j_max = (y1 / row_step).ceil() as i64;

    let canvas_center = dims.center();
    let mut points = Vec::new();
    let mut center_emitted = false;

    for j in j_min..j_max {
        #[allow(clippy::cast_precision_loss)]
        let y = (j as f64 + 0.5) * row_step;
        let shift = if layout.arrangement == Arrangement::Hexagonal && j.rem_euclid(2) == 1 {
            cell / 2.0
        } else {
            0.0
        };
        for i in i_min..i_max {
            #[allow(clippy::cast_precision_loss)]
            let x = (i as f64 + 0.5).mul_add(cell, shift);
            let base = Point::new(x, y);
            let placed = match layout.arrangement {
                Arrangement::Grid | Arrangement::Hexagonal => {
                    rotate(base, canvas_center, theta)
                }
                Arrangement::Random => {
                    let jx = rng.gen_range(-0.5..0.5) * cell;
                    let jy = rng.gen_range(-0.5..0.5) * cell;
                    rotate(Point::new(base.x + jx, base.y + jy), canvas_center, theta)
                }
                Arrangement::Spiral => spiral(base, dims, cell, &layout.spiral, theta),
                Arrangement::Concentric => {
                    match concentric(base, dims, cell, &layout.concentric, theta) {
                        Some(p) => p,
                        None if !center_emitted => {
                            center_emitted = true;
                            let rings = &layout.concentric;
                            percent_point(dims, rings.center_x, rings.center_y)
                        }
                        None => continue,
                    }
                }
            };
            if dims.contains(placed) {
                points.push(placed);
            }
        }
    }
    points
}

/// Extent `(x0, x1, y0, y1)` of the unrotated lattice.
///
/// Rotated and polar layouts are distance preserving about a center, so
/// they can pull points in from outside the canvas. Their lattice covers
/// the disc around that center reaching the farthest canvas corner, plus
/// one cell (and one ring for concentric). The disc is capped at one
/// canvas diagonal beyond each edge.
fn lattice_bounds(
    dims: Dimensions,
    cell: f64,
    layout: &Layout,
    theta: f64,
) -> (f64, f64, f64, f64) {
    let width = f64::from(dims.width);
    let height = f64::from(dims.height);
    let reach = match layout.arrangement {
        Arrangement::Spiral => {
            let spiral = &layout.spiral;
            Some((percent_point(dims, spiral.center_x, spiral.center_y), cell))
        }
        Arrangement::Concentric => {
            let rings = &layout.concentric;
            let spacing = (cell * finite_or(rings.ring_spacing, 1.0)).max(1.0);
            Some((percent_point(dims, rings.center_x, rings.center_y), cell + spacing))
        }
        _ if theta != 0.0 => Some((dims.center(), cell)),
        _ => None,
    };
    let Some((center, margin)) = reach else {
        return (0.0, width, 0.0, height);
    };
    let radius = [(0.0, 0.0), (width, 0.0), (0.0, height), (width, height)]
        .into_iter()
        .map(|(x, y)| (center.x - x).hypot(center.y - y))
        .fold(0.0, f64::max)
        + margin;
    let cap = width.hypot(height);
    (
        (center.x - radius).clamp(-cap, 0.0),
        (center.x + radius).clamp(width, width + cap),
        (center.y - radius).clamp(-cap, 0.0),
        (center.y + radius).clamp(height, height + cap),
    )
}

fn rotate(p: Point, center: Point, theta: f64) -> Point {
    if theta == 0.0 {
        p
    } else {
        p.rotate_about(center, theta)
    }
}

fn spiral(p: Point, dims: Dimensions, cell: f64, params: &SpiralParams, theta: f64) -> Point {
    let center = percent_point(dims, params.center_x, params.center_y);
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    let distance = dx.hypot(dy);
    let twist = distance / cell
        * finite_or(params.tightness, 0.1)
        * finite_or(params.expansion, 1.0);
    let angle = dy.atan2(dx) + finite_or(params.rotation, 0.0).to_radians() + theta + twist;
    Point::new(
        distance.mul_add(angle.cos(), center.x),
        distance.mul_add(angle.sin(), center.y),
    )
}

/// Snap `p` onto the nearest ring. Returns `None` for points that snap to
/// the center itself.
fn concentric(
    p: Point,
    dims: Dimensions,
    cell: f64,
    params: &ConcentricParams,
    theta: f64,
) -> Option<Point> {
    let center = percent_point(dims, params.center_x, params.center_y);
    let spacing = (cell * finite_or(params.ring_spacing, 1.0)).max(1.0);
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    let radius = (dx.hypot(dy) / spacing).round() * spacing;
    if radius == 0.0 {
        return None;
    }
    let angle = (dy.atan2(dx) + theta).rem_euclid(2.0 * PI);
    Some(Point::new(
        radius.mul_add(angle.cos(), center.x),
        radius.mul_add(angle.sin(), center.y),
    ))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn layout(arrangement: Arrangement) -> Layout {
        Layout {
            arrangement,
            ..Layout::default()
        }
    }

    fn points(arrangement: Arrangement, angle: f64) -> Vec<Point> {
        sample_points(
            dims(100, 100),
            10.0,
            &layout(arrangement),
            angle,
            &mut StdRng::seed_from_u64(9),
        )
    }

    #[test]
    fn grid_points_sit_at_cell_centers() {
        let pts = points(Arrangement::Grid, 0.0);
        assert_eq!(pts.len(), 100);
        assert_eq!(pts[0], Point::new(5.0, 5.0));
        assert!(pts.contains(&Point::new(95.0, 95.0)));
    }

    #[test]
    fn hexagonal_rows_alternate_offset() {
        let pts = points(Arrangement::Hexagonal, 0.0);
        let first_row: Vec<_> = pts.iter().filter(|p| p.y < 8.0).collect();
        let second_row: Vec<_> = pts.iter().filter(|p| p.y > 8.0 && p.y < 16.0).collect();
        assert!((first_row[0].x - 5.0).abs() < 1e-9);
        assert!((second_row[0].x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rotated_grid_stays_in_bounds_and_covers_canvas() {
        let pts = points(Arrangement::Grid, 45.0);
        assert!(pts.iter().all(|p| dims(100, 100).contains(*p)));
        // Area-preserving rotation keeps roughly one point per cell.
        assert!((80..=120).contains(&pts.len()), "{}", pts.len());
    }

    #[test]
    fn random_jitter_is_bounded_and_seeded() {
        let a = points(Arrangement::Random, 0.0);
        let b = points(Arrangement::Random, 0.0);
        assert_eq!(a, b);
        for p in &a {
            let cx = (p.x / 10.0).floor().mul_add(10.0, 5.0);
            assert!((p.x - cx).abs() <= 10.0);
        }
    }

    #[test]
    fn concentric_points_lie_on_rings() {
        let pts = points(Arrangement::Concentric, 0.0);
        let center = Point::new(50.0, 50.0);
        assert!(!pts.is_empty());
        for p in pts {
            let r = p.distance(center) / 10.0;
            assert!((r - r.round()).abs() < 1e-6, "radius {r}");
        }
    }

    #[test]
    fn rotated_lattice_covers_only_the_circumscribed_disc() {
        let (x0, x1, y0, y1) = lattice_bounds(
            dims(100, 100),
            10.0,
            &layout(Arrangement::Grid),
            45.0_f64.to_radians(),
        );
        let reach = 50.0_f64.hypot(50.0) + 10.0;
        assert!((x0 - (50.0 - reach)).abs() < 1e-9);
        assert!((x1 - (50.0 + reach)).abs() < 1e-9);
        assert!((y0 - (50.0 - reach)).abs() < 1e-9);
        assert!((y1 - (50.0 + reach)).abs() < 1e-9);
    }

    #[test]
    fn unrotated_grid_lattice_matches_canvas() {
        let bounds = lattice_bounds(dims(80, 40), 10.0, &layout(Arrangement::Grid), 0.0);
        assert_eq!(bounds, (0.0, 80.0, 0.0, 40.0));
    }

    #[test]
    fn corner_spiral_still_reaches_the_far_corner() {
        let mut l = layout(Arrangement::Spiral);
        l.spiral.center_x = 0.0;
        l.spiral.center_y = 0.0;
        let pts = sample_points(dims(100, 100), 10.0, &l, 0.0, &mut StdRng::seed_from_u64(0));
        let origin = Point::new(0.0, 0.0);
        assert!(pts.iter().any(|p| p.distance(origin) > 100.0));
        assert!(pts.iter().all(|p| dims(100, 100).contains(*p)));
    }

    #[test]
    fn spiral_preserves_distance_to_center() {
        let mut l = layout(Arrangement::Spiral);
        l.spiral.tightness = 0.3;
        let pts = sample_points(dims(60, 60), 10.0, &l, 0.0, &mut StdRng::seed_from_u64(0));
        assert!(!pts.is_empty());
        let grid = sample_points(
            dims(60, 60),
            10.0,
            &layout(Arrangement::Grid),
            0.0,
            &mut StdRng::seed_from_u64(0),
        );
        assert_ne!(pts, grid);
    }

    #[test]
    fn missing_spiral_fields_use_defaults() {
        let l: Layout =
            serde_json::from_str(r#"{"arrangement":"spiral","spiral":{"rotation":30}}"#)
                .unwrap_or_default();
        assert_eq!(l.arrangement, Arrangement::Spiral);
        assert!((l.spiral.tightness - 0.1).abs() < f64::EPSILON);
        assert!((l.spiral.rotation - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_canvas_has_no_points() {
        let pts = sample_points(
            dims(0, 10),
            5.0,
            &Layout::default(),
            0.0,
            &mut StdRng::seed_from_u64(0),
        );
        assert!(pts.is_empty());
    }
}
