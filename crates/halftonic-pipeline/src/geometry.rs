//! Exact vector primitives recorded during a raster render.
//!
//! A [`GeometryRecord`] is the bridge between the raster renderer and the
//! SVG exporter. It is an explicit value returned from the stage that drew
//! it, tagged with the canvas size, a fingerprint of the settings that
//! produced it, and the render generation. Export code reuses it verbatim
//! so vectors match the raster without re-rolling any randomness.

use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

use crate::halftone::cmyk::CmykChannel;
use crate::halftone::shape::DotShape;
use crate::stage::StageId;
use crate::types::{Dimensions, Point, Rgb, RgbaImage};

/// One halftone dot exactly as it was drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dot {
    /// Dot center in canvas pixels.
    pub center: Point,
    /// Full extent of the dot (diameter for circles, side for squares).
    pub size: f64,
    /// Fill color.
    pub color: Rgb,
    /// CMYK separation layer, or `None` for single-layer halftones.
    pub channel: Option<CmykChannel>,
}

impl Dot {
    /// Whether this dot can be emitted as a shape: finite position and a
    /// finite, strictly positive size.
    #[must_use]
    pub fn is_drawable(&self) -> bool {
        self.center.is_finite() && self.size.is_finite() && self.size > 0.0
    }
}

/// One axis-aligned rectangle of uniform color from visible-cell dithering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Left edge in canvas pixels.
    pub x: u32,
    /// Top edge in canvas pixels.
    pub y: u32,
    /// Width in canvas pixels.
    pub width: u32,
    /// Height in canvas pixels.
    pub height: u32,
    /// Fill color.
    pub color: Rgb,
}

impl Cell {
    /// Whether the rectangle has a non-zero area.
    #[must_use]
    pub const fn is_drawable(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// What kind of geometry a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum GeometryKind {
    /// Halftone dots drawn with `shape`, each rotated by `rotation` degrees.
    Halftone {
        /// Dot outline.
        shape: DotShape,
        /// Per-dot shape rotation in degrees.
        rotation: f64,
    },
    /// Dither cells.
    DitherCells,
}

/// The recorded primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Primitives {
    /// Halftone dots in draw order.
    Dots(Vec<Dot>),
    /// Dither cells in raster order.
    Cells(Vec<Cell>),
}

impl Primitives {
    /// Number of recorded primitives.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Dots(dots) => dots.len(),
            Self::Cells(cells) => cells.len(),
        }
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The pre-halftone image blended over the dots when `mix < 100`.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    /// Image drawn on top of the dots.
    pub image: RgbaImage,
    /// Opacity of `image`, in `(0, 1]`.
    pub opacity: f64,
}

/// Geometry emitted by one raster render of the halftone or dither stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    /// Stage that produced the record.
    pub stage: StageId,
    /// Shape family of the primitives.
    pub kind: GeometryKind,
    /// Canvas size the primitives are positioned in.
    pub dimensions: Dimensions,
    /// Fingerprint of the stage settings that produced the record.
    pub settings_fingerprint: u64,
    /// Render generation that produced the record.
    pub generation: u64,
    /// The primitives.
    pub primitives: Primitives,
    /// Background the primitives were drawn over, if any.
    pub paper: Option<Rgb>,
    /// Optional blended overlay.
    pub overlay: Option<Overlay>,
}

impl GeometryRecord {
    /// Whether the record was produced for a canvas of `dimensions`.
    #[must_use]
    pub fn matches(&self, dimensions: Dimensions) -> bool {
        self.dimensions == dimensions
    }

    /// Whether the record was produced from `settings`.
    #[must_use]
    pub fn produced_by<T: Serialize>(&self, settings: &T) -> bool {
        self.settings_fingerprint == fingerprint(settings)
    }

    /// Number of recorded primitives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Whether no primitive was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

/// Stable fingerprint of a settings value.
///
/// Hashes the JSON serialization with SipHash-1-3 under fixed keys, so the
/// value is reproducible across runs and platforms.
#[must_use]
pub fn fingerprint<T: Serialize>(settings: &T) -> u64 {
    let bytes = serde_json::to_vec(settings).unwrap_or_default();
    let mut hasher = SipHasher13::new_with_keys(0x6861_6c66, 0x746f_6e69);
    hasher.write(&bytes);
    hasher.finish()
}
