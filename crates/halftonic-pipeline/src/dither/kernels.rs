//! Static dithering tables: error-diffusion kernels and Bayer matrices.
//!
//! Diffusion taps are `(dx, dy, weight)` relative to the pixel being
//! quantized. Every tap points forward in raster order (`dy > 0`, or
//! `dy == 0 && dx > 0`) so finalized pixels are never revisited, and the
//! weights of each kernel sum to 1.

use serde::{Deserialize, Serialize};

/// A named error-diffusion kernel.
#[derive(Debug)]
pub struct DiffusionKernel {
    /// Kernel name as used in settings documents.
    pub name: &'static str,
    /// Forward taps `(dx, dy, weight)`.
    pub taps: &'static [(i32, i32, f32)],
}

/// Floyd-Steinberg (1976).
pub static FLOYD_STEINBERG: DiffusionKernel = DiffusionKernel {
    name: "floyd-steinberg",
    taps: &[
        (1, 0, 7.0 / 16.0),
        (-1, 1, 3.0 / 16.0),
        (0, 1, 5.0 / 16.0),
        (1, 1, 1.0 / 16.0),
    ],
};

const JJN_TAPS: [(i32, i32, f32); 12] = [
    (1, 0, 7.0 / 48.0),
    (2, 0, 5.0 / 48.0),
    (-2, 1, 3.0 / 48.0),
    (-1, 1, 5.0 / 48.0),
    (0, 1, 7.0 / 48.0),
    (1, 1, 5.0 / 48.0),
    (2, 1, 3.0 / 48.0),
    (-2, 2, 1.0 / 48.0),
    (-1, 2, 3.0 / 48.0),
    (0, 2, 5.0 / 48.0),
    (1, 2, 3.0 / 48.0),
    (2, 2, 1.0 / 48.0),
];

/// Jarvis, Judice and Ninke three-row kernel.
pub static JARVIS: DiffusionKernel = DiffusionKernel {
    name: "jarvis",
    taps: &JJN_TAPS,
};

/// Same published matrix as [`JARVIS`], kept under its second name so
/// settings using either spelling resolve.
pub static JUDICE_NINKE: DiffusionKernel = DiffusionKernel {
    name: "judice-ninke",
    taps: &JJN_TAPS,
};

/// Stucki (1981).
pub static STUCKI: DiffusionKernel = DiffusionKernel {
    name: "stucki",
    taps: &[
        (1, 0, 8.0 / 42.0),
        (2, 0, 4.0 / 42.0),
        (-2, 1, 2.0 / 42.0),
        (-1, 1, 4.0 / 42.0),
        (0, 1, 8.0 / 42.0),
        (1, 1, 4.0 / 42.0),
        (2, 1, 2.0 / 42.0),
        (-2, 2, 1.0 / 42.0),
        (-1, 2, 2.0 / 42.0),
        (0, 2, 4.0 / 42.0),
        (1, 2, 2.0 / 42.0),
        (2, 2, 1.0 / 42.0),
    ],
};

/// Burkes (1988), a two-row Stucki.
pub static BURKES: DiffusionKernel = DiffusionKernel {
    name: "burkes",
    taps: &[
        (1, 0, 8.0 / 32.0),
        (2, 0, 4.0 / 32.0),
        (-2, 1, 2.0 / 32.0),
        (-1, 1, 4.0 / 32.0),
        (0, 1, 8.0 / 32.0),
        (1, 1, 4.0 / 32.0),
        (2, 1, 2.0 / 32.0),
    ],
};

/// Every diffusion kernel, for lookup by name.
pub static DIFFUSION_KERNELS: [&DiffusionKernel; 5] =
    [&FLOYD_STEINBERG, &JARVIS, &JUDICE_NINKE, &STUCKI, &BURKES];

/// Look up a diffusion kernel by name (case-insensitive, `-` or `_`).
#[must_use]
pub fn kernel_by_name(name: &str) -> Option<&'static DiffusionKernel> {
    let wanted = name.trim().to_ascii_lowercase().replace('_', "-");
    DIFFUSION_KERNELS
        .iter()
        .copied()
        .find(|kernel| kernel.name == wanted)
}

const BAYER_1: [u8; 1] = [0];

const BAYER_2: [u8; 4] = [0, 2, 3, 1];

const BAYER_4: [u8; 16] = [0, 8, 2, 10, 12, 4, 14, 6, 3, 11, 1, 9, 15, 7, 13, 5];

const BAYER_8: [u8; 64] = [
    0, 32, 8, 40, 2, 34, 10, 42, //
    48, 16, 56, 24, 50, 18, 58, 26, //
    12, 44, 4, 36, 14, 46, 6, 38, //
    60, 28, 52, 20, 62, 30, 54, 22, //
    3, 35, 11, 43, 1, 33, 9, 41, //
    51, 19, 59, 27, 49, 17, 57, 25, //
    15, 47, 7, 39, 13, 45, 5, 37, //
    63, 31, 55, 23, 61, 29, 53, 21,
];

/// Side length of an ordered-dither threshold matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BayerSize {
    /// 1x1: plain rounding, no pattern.
    #[serde(rename = "1x1")]
    One,
    /// 2x2 matrix.
    #[serde(rename = "2x2")]
    Two,
    /// 4x4 matrix.
    #[default]
    #[serde(rename = "4x4")]
    Four,
    /// 8x8 matrix.
    #[serde(rename = "8x8")]
    Eight,
}

impl BayerSize {
    /// Matrix side length.
    #[must_use]
    pub const fn side(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    const fn table(self) -> &'static [u8] {
        match self {
            Self::One => &BAYER_1,
            Self::Two => &BAYER_2,
            Self::Four => &BAYER_4,
            Self::Eight => &BAYER_8,
        }
    }

    /// Normalized threshold at canvas position `(x, y)`, in `(0, 1)`.
    ///
    /// Uses `(rank + 0.5) / n^2`, so the 1x1 matrix yields exactly 0.5 and
    /// ordered dithering degrades to nearest rounding.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn threshold(self, x: u32, y: u32) -> f32 {
        let side = self.side();
        let rank = self.table()[(y as usize % side) * side + (x as usize % side)];
        (f32::from(rank) + 0.5) / (side * side) as f32
    }
}
