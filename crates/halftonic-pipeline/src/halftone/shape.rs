//! Dot outlines shared by the raster renderer and the SVG exporter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Outline drawn for each halftone dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DotShape {
    /// Disc with diameter equal to the dot size.
    #[default]
    Circle,
    /// Axis-aligned square with side equal to the dot size.
    Square,
    /// Square rotated 45 degrees, tip to tip equal to the dot size.
    Diamond,
    /// Upward equilateral triangle inscribed in the dot's circle.
    Triangle,
    /// Pointy-top hexagon inscribed in the dot's circle.
    Hexagon,
}

impl DotShape {
    /// Every shape.
    pub const ALL: [Self; 5] = [
        Self::Circle,
        Self::Square,
        Self::Diamond,
        Self::Triangle,
        Self::Hexagon,
    ];

    /// Name used in settings documents.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Circle => "circle",
            Self::Square => "square",
            Self::Diamond => "diamond",
            Self::Triangle => "triangle",
            Self::Hexagon => "hexagon",
        }
    }

    /// Size multiplier applied when dots are recomputed for vector output
    /// without a recorded geometry.
    ///
    /// Empirically tuned so the inked area of an SVG outline approximates
    /// the anti-aliased raster dot of the same nominal size. These are
    /// heuristics, not derived identities.
    #[must_use]
    pub const fn area_correction(self) -> f64 {
        match self {
            Self::Circle => 1.0,
            Self::Square => 0.85,
            Self::Diamond => 0.9,
            Self::Triangle => 1.1,
            Self::Hexagon => 0.95,
        }
    }

    /// Polygon vertices for a dot of `size` at `center`, rotated by
    /// `rotation` degrees about its center. Returns `None` for
    /// [`DotShape::Circle`], which has no polygonal outline.
    #[must_use]
    pub fn outline(self, center: Point, size: f64, rotation: f64) -> Option<Vec<Point>> {
        let half = size / 2.0;
        let local: Vec<Point> = match self {
            Self::Circle => return None,
            Self::Square => vec![
                Point::new(-half, -half),
                Point::new(half, -half),
                Point::new(half, half),
                Point::new(-half, half),
            ],
            Self::Diamond => vec![
                Point::new(0.0, -half),
                Point::new(half, 0.0),
                Point::new(0.0, half),
                Point::new(-half, 0.0),
            ],
            Self::Triangle => regular_polygon(3, half, -90.0),
            Self::Hexagon => regular_polygon(6, half, -90.0),
        };
        let origin = Point::new(0.0, 0.0);
        let theta = rotation.to_radians();
        Some(
            local
                .into_iter()
                .map(|p| {
                    let r = if theta == 0.0 { p } else { p.rotate_about(origin, theta) };
                    Point::new(center.x + r.x, center.y + r.y)
                })
                .collect(),
        )
    }
}

#[allow(clippy::cast_precision_loss)]
fn regular_polygon(sides: usize, radius: f64, start_deg: f64) -> Vec<Point> {
    (0..sides)
        .map(|i| {
            let angle = (start_deg + 360.0 * i as f64 / sides as f64).to_radians();
            Point::new(radius * angle.cos(), radius * angle.sin())
        })
        .collect()
}

impl fmt::Display for DotShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn circle_has_no_outline() {
        assert!(DotShape::Circle.outline(Point::new(0.0, 0.0), 4.0, 0.0).is_none());
    }

    #[test]
    fn square_outline_spans_size() {
        let pts = DotShape::Square
            .outline(Point::new(10.0, 20.0), 4.0, 0.0)
            .unwrap();
        assert_eq!(pts.len(), 4);
        assert_eq!(pts[0], Point::new(8.0, 18.0));
        assert_eq!(pts[2], Point::new(12.0, 22.0));
    }

    #[test]
    fn polygon_vertex_counts() {
        let c = Point::new(0.0, 0.0);
        assert_eq!(DotShape::Triangle.outline(c, 2.0, 0.0).unwrap().len(), 3);
        assert_eq!(DotShape::Hexagon.outline(c, 2.0, 0.0).unwrap().len(), 6);
        assert_eq!(DotShape::Diamond.outline(c, 2.0, 0.0).unwrap().len(), 4);
    }

    #[test]
    fn vertices_lie_on_circumcircle() {
        let c = Point::new(5.0, 5.0);
        for p in DotShape::Hexagon.outline(c, 6.0, 17.0).unwrap() {
            assert!((p.distance(c) - 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn rotated_square_becomes_diamond() {
        let c = Point::new(0.0, 0.0);
        let rotated = DotShape::Square.outline(c, 2.0, 45.0).unwrap();
        let r = 2.0_f64.sqrt();
        assert!(rotated.iter().any(|p| (p.y + r).abs() < 1e-9 && p.x.abs() < 1e-9));
    }

    #[test]
    fn area_corrections_are_positive() {
        for shape in DotShape::ALL {
            assert!(shape.area_correction() > 0.0, "{shape}");
        }
    }
}
