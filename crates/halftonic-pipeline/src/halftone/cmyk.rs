//! CMYK separation for print-style halftones.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Rgb;

/// One ink layer of a CMYK separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CmykChannel {
    /// Cyan ink.
    Cyan,
    /// Magenta ink.
    Magenta,
    /// Yellow ink.
    Yellow,
    /// Key (black) ink.
    Black,
}

impl CmykChannel {
    /// Layers in draw order.
    pub const ALL: [Self; 4] = [Self::Cyan, Self::Magenta, Self::Yellow, Self::Black];

    /// Short name used in SVG group ids.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cyan => "cyan",
            Self::Magenta => "magenta",
            Self::Yellow => "yellow",
            Self::Black => "black",
        }
    }

    /// Ink color of the layer.
    #[must_use]
    pub const fn ink(self) -> Rgb {
        match self {
            Self::Cyan => Rgb::new(0, 255, 255),
            Self::Magenta => Rgb::new(255, 0, 255),
            Self::Yellow => Rgb::new(255, 255, 0),
            Self::Black => Rgb::BLACK,
        }
    }

    /// This channel's component of a separated color.
    #[must_use]
    pub const fn amount(self, cmyk: [f64; 4]) -> f64 {
        match self {
            Self::Cyan => cmyk[0],
            Self::Magenta => cmyk[1],
            Self::Yellow => cmyk[2],
            Self::Black => cmyk[3],
        }
    }
}

impl fmt::Display for CmykChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Separate an RGB color into `[c, m, y, k]` ink coverages in `0..=1`.
///
/// Uses gray component replacement: `k = 1 - max(r, g, b)`, and the
/// chromatic inks carry the rest. Pure black is `[0, 0, 0, 1]`.
#[must_use]
pub fn rgb_to_cmyk(r: u8, g: u8, b: u8) -> [f64; 4] {
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;
    let k = 1.0 - r.max(g).max(b);
    if k >= 1.0 {
        return [0.0, 0.0, 0.0, 1.0];
    }
    let denom = 1.0 - k;
    [
        (1.0 - r - k) / denom,
        (1.0 - g - k) / denom,
        (1.0 - b - k) / denom,
        k,
    ]
}

/// Which ink layers are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelToggles {
    /// Cyan layer.
    pub c: bool,
    /// Magenta layer.
    pub m: bool,
    /// Yellow layer.
    pub y: bool,
    /// Black layer.
    pub k: bool,
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self {
            c: true,
            m: true,
            y: true,
            k: true,
        }
    }
}

impl ChannelToggles {
    /// Whether `channel` is drawn.
    #[must_use]
    pub const fn enabled(&self, channel: CmykChannel) -> bool {
        match channel {
            CmykChannel::Cyan => self.c,
            CmykChannel::Magenta => self.m,
            CmykChannel::Yellow => self.y,
            CmykChannel::Black => self.k,
        }
    }

    /// Whether at least one layer is drawn.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.c || self.m || self.y || self.k
    }
}

/// Screen angle per ink, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CmykAngles {
    /// Cyan screen angle.
    pub c: f64,
    /// Magenta screen angle.
    pub m: f64,
    /// Yellow screen angle.
    pub y: f64,
    /// Black screen angle.
    pub k: f64,
}

impl Default for CmykAngles {
    fn default() -> Self {
        Self {
            c: 15.0,
            m: 75.0,
            y: 0.0,
            k: 45.0,
        }
    }
}

impl CmykAngles {
    /// Screen angle of `channel`; non-finite values fall back to 0.
    #[must_use]
    pub const fn angle(&self, channel: CmykChannel) -> f64 {
        let angle = match channel {
            CmykChannel::Cyan => self.c,
            CmykChannel::Magenta => self.m,
            CmykChannel::Yellow => self.y,
            CmykChannel::Black => self.k,
        };
        crate::types::finite_or(angle, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 4], b: [f64; 4]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn primaries_separate_cleanly() {
        assert!(close(rgb_to_cmyk(0, 0, 0), [0.0, 0.0, 0.0, 1.0]));
        assert!(close(rgb_to_cmyk(255, 255, 255), [0.0, 0.0, 0.0, 0.0]));
        assert!(close(rgb_to_cmyk(0, 255, 255), [1.0, 0.0, 0.0, 0.0]));
        assert!(close(rgb_to_cmyk(255, 0, 0), [0.0, 1.0, 1.0, 0.0]));
    }

    #[test]
    fn separation_is_within_unit_range() {
        for (r, g, b) in [(12, 200, 99), (255, 128, 0), (1, 2, 3)] {
            for v in rgb_to_cmyk(r, g, b) {
                assert!((0.0..=1.0).contains(&v), "{v} out of range");
            }
        }
    }

    #[test]
    fn default_angles() {
        let angles = CmykAngles::default();
        assert!((angles.angle(CmykChannel::Cyan) - 15.0).abs() < f64::EPSILON);
        assert!((angles.angle(CmykChannel::Black) - 45.0).abs() < f64::EPSILON);
        let bad = CmykAngles {
            m: f64::NAN,
            ..angles
        };
        assert!(bad.angle(CmykChannel::Magenta).abs() < f64::EPSILON);
    }

    #[test]
    fn toggles() {
        let none = ChannelToggles {
            c: false,
            m: false,
            y: false,
            k: false,
        };
        assert!(!none.any());
        assert!(ChannelToggles::default().enabled(CmykChannel::Yellow));
    }
}
