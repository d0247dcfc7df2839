//! halftonic-pipeline: pure pixel-effect pipeline (sans-IO).
//!
//! Feeds an RGBA buffer through a user-ordered sequence of effect stages:
//! color/tone, duotone threshold, dithering, halftone, text dithering,
//! glitch, grid split and displacement. The halftone and dither stages
//! also return the exact primitives they drew as a [`GeometryRecord`], so
//! vector export can match the raster without re-rolling randomness.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! buffers and returns structured data. File handling and serialization
//! to PNG/SVG live in `halftonic-export` and the `halftonic` CLI.
//!
//! ```
//! use halftonic_pipeline::{EffectSettings, EffectsOrder, RgbaImage, render};
//!
//! let source = RgbaImage::from_pixel(100, 100, image::Rgba([0, 0, 0, 255]));
//! let mut settings = EffectSettings::default();
//! settings.halftone.enabled = true;
//!
//! let output = render(&source, &settings, &EffectsOrder::default(), 0);
//! assert_eq!(output.geometry.map(|g| g.len()), Some(100));
//! ```

pub mod canvas;
pub mod color;
pub mod decode;
pub mod diagnostics;
pub mod displacement;
pub mod dither;
pub mod editor;
pub mod geometry;
pub mod glitch;
pub mod grid;
pub mod halftone;
pub mod pipeline;
pub mod settings;
pub mod stage;
pub mod text_dither;
pub mod types;

pub use canvas::{ResampleFilter, fit_to_canvas};
pub use decode::decode_rgba;
pub use editor::{Editor, EditorState, RenderJob};
pub use geometry::{Cell, Dot, GeometryKind, GeometryRecord, Overlay, Primitives};
pub use pipeline::{Render, RenderOutput, render, render_with_diagnostics, stage_rng};
pub use settings::EffectSettings;
pub use stage::{EffectsOrder, StageId};
pub use types::{Dimensions, PipelineError, PixelBuffer, Point, Rgb, RgbaImage};
