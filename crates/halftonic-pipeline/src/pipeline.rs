//! Orchestrator: walk the effects order once and feed the working buffer
//! through every enabled stage.
//!
//! [`Render`] is a stepwise runner. Each call to [`Render::advance`] runs
//! exactly one enabled stage, so a host can stop between stages when the
//! render is no longer wanted (see [`crate::editor`]). [`render`] and
//! [`render_with_diagnostics`] drive it to completion.
//!
//! Geometry records follow the buffer: a record survives only while the
//! stage that produced it is the last stage to have changed the pixels.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::color;
use crate::diagnostics::{
    Clock, PipelineDiagnostics, PipelineSummary, StageDiagnostics, StageMetrics, WebClock,
    count_changed_pixels,
};
use crate::displacement;
use crate::dither;
use crate::geometry::{GeometryKind, GeometryRecord, Overlay, Primitives};
use crate::glitch;
use crate::grid;
use crate::halftone;
use crate::settings::EffectSettings;
use crate::stage::{EffectsOrder, StageId};
use crate::text_dither;
use crate::types::{Dimensions, Rgb, RgbaImage};

/// Deterministic random source for `stage` under document seed `seed`.
///
/// Each stage gets an independent stream, so enabling one stochastic
/// stage never shifts the randomness seen by another.
#[must_use]
pub fn stage_rng(seed: u64, stage: StageId) -> StdRng {
    StdRng::seed_from_u64(seed ^ stage.seed_salt().wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Everything a finished render hands to display and export.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// The composited canvas.
    pub image: RgbaImage,
    /// Exact primitives of the last stage to touch the pixels, when that
    /// stage records geometry.
    pub geometry: Option<GeometryRecord>,
    /// Buffer that entered the halftone stage, kept only while halftone is
    /// the last stage to have changed the pixels. Exporters recompute dots
    /// from it when the geometry record no longer fits the canvas.
    pub halftone_input: Option<RgbaImage>,
    /// Stages that ran, in order.
    pub applied: Vec<StageId>,
    /// Generation this render was started for.
    pub generation: u64,
}

impl RenderOutput {
    /// Canvas size of the output.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.image)
    }
}

/// Result of one stage invocation.
struct StageRun {
    image: RgbaImage,
    geometry: Option<GeometryRecord>,
    metrics: StageMetrics,
}

/// A render in progress.
///
/// Starts from a copy of the untouched source and holds the working buffer
/// between stages.
#[derive(Debug)]
pub struct Render<'a> {
    settings: &'a EffectSettings,
    pending: Vec<StageId>,
    next: usize,
    seed: u64,
    generation: u64,
    image: RgbaImage,
    geometry: Option<GeometryRecord>,
    halftone_input: Option<RgbaImage>,
    diagnostics: Vec<StageDiagnostics>,
}

impl<'a> Render<'a> {
    /// Prepare a render of `source`. Only stages enabled in `settings` are
    /// scheduled, in the order given by `order`.
    #[must_use]
    pub fn new(
        source: &RgbaImage,
        settings: &'a EffectSettings,
        order: &EffectsOrder,
        seed: u64,
    ) -> Self {
        let pending = settings.enabled_stages(order.stages());
        tracing::debug!(stages = ?pending, seed, "render scheduled");
        Self {
            settings,
            pending,
            next: 0,
            seed,
            generation: 0,
            image: source.clone(),
            geometry: None,
            halftone_input: None,
            diagnostics: Vec::new(),
        }
    }

    /// Tag the render, and any geometry it records, with `generation`.
    #[must_use]
    pub const fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// The stage [`advance`](Self::advance) will run next.
    #[must_use]
    pub fn next_stage(&self) -> Option<StageId> {
        self.pending.get(self.next).copied()
    }

    /// Whether every scheduled stage has run.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.next >= self.pending.len()
    }

    /// The working buffer as of the last completed stage.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Run the next scheduled stage. Returns the stage that ran, or `None`
    /// when the render was already complete.
    pub fn advance<C: Clock>(&mut self, clock: &C) -> Option<StageId> {
        let stage = self.next_stage()?;
        self.next += 1;

        let start = clock.now();
        let mut rng = stage_rng(self.seed, stage);
        let run = run_stage(stage, &self.image, self.settings, &mut rng, self.generation);
        let duration = clock.elapsed(&start);
        tracing::debug!(%stage, ?duration, "stage complete");

        let changed = run.image != self.image;
        if let Some(record) = run.geometry {
            self.geometry = Some(record);
        } else if changed && self.geometry.take().is_some() {
            tracing::debug!(%stage, "geometry record invalidated");
        }
        if stage == StageId::Halftone {
            self.halftone_input = Some(std::mem::replace(&mut self.image, run.image));
        } else {
            if changed {
                self.halftone_input = None;
            }
            self.image = run.image;
        }

        self.diagnostics.push(StageDiagnostics {
            stage,
            duration,
            metrics: run.metrics,
        });
        Some(stage)
    }

    /// Finish the render, running any stages that are still pending.
    #[must_use]
    pub fn finish(self) -> RenderOutput {
        self.finish_with_diagnostics(std::time::Duration::ZERO).0
    }

    /// Finish the render and collect diagnostics, with `total_duration`
    /// measured by the caller.
    #[must_use]
    pub fn finish_with_diagnostics(
        mut self,
        total_duration: std::time::Duration,
    ) -> (RenderOutput, PipelineDiagnostics) {
        while self.advance(&WebClock).is_some() {}
        let applied: Vec<StageId> = self.diagnostics.iter().map(|d| d.stage).collect();
        let summary = PipelineSummary::new(
            Dimensions::of(&self.image),
            applied.len(),
            self.geometry.as_ref().map(GeometryRecord::len),
        );
        let diagnostics = PipelineDiagnostics {
            stages: self.diagnostics,
            total_duration,
            summary,
        };
        let output = RenderOutput {
            image: self.image,
            geometry: self.geometry,
            halftone_input: self.halftone_input,
            applied,
            generation: self.generation,
        };
        (output, diagnostics)
    }
}

/// Render `source` through every enabled stage in `order`.
#[must_use]
pub fn render(
    source: &RgbaImage,
    settings: &EffectSettings,
    order: &EffectsOrder,
    seed: u64,
) -> RenderOutput {
    Render::new(source, settings, order, seed).finish()
}

/// Like [`render`], also timing every stage with `clock`.
#[must_use]
pub fn render_with_diagnostics<C: Clock>(
    source: &RgbaImage,
    settings: &EffectSettings,
    order: &EffectsOrder,
    seed: u64,
    clock: &C,
) -> (RenderOutput, PipelineDiagnostics) {
    let start = clock.now();
    let mut render = Render::new(source, settings, order, seed);
    while render.advance(clock).is_some() {}
    render.finish_with_diagnostics(clock.elapsed(&start))
}

fn pixel_metrics(before: &RgbaImage, after: &RgbaImage) -> StageMetrics {
    StageMetrics::Pixels {
        changed_pixels: count_changed_pixels(before, after),
        total_pixels: Dimensions::of(after).area(),
    }
}

fn run_stage(
    stage: StageId,
    input: &RgbaImage,
    settings: &EffectSettings,
    rng: &mut StdRng,
    generation: u64,
) -> StageRun {
    let dimensions = Dimensions::of(input);
    let plain = |image: RgbaImage| StageRun {
        metrics: pixel_metrics(input, &image),
        image,
        geometry: None,
    };

    match stage {
        StageId::Color => plain(color::adjust(input, &settings.color)),
        StageId::Threshold => plain(color::threshold(input, &settings.threshold)),
        StageId::Glitch => plain(glitch::apply(input, &settings.glitch, rng)),
        StageId::Grid => plain(grid::split(input, &settings.grid, rng)),
        StageId::Displacement => plain(displacement::displace(input, &settings.displacement, rng)),
        StageId::TextDither => StageRun {
            image: text_dither::stamp(input, &settings.text_dither, rng),
            geometry: None,
            metrics: StageMetrics::TextDither {
                glyphs: if settings.text_dither.text.is_empty() {
                    0
                } else {
                    settings
                        .text_dither
                        .glyph_count(dimensions.width, dimensions.height)
                },
            },
        },
        StageId::Dither => {
            let out = dither::dither(input, &settings.dither, rng);
            let metrics = StageMetrics::Dither {
                algorithm: settings.dither.algorithm.name().to_owned(),
                changed_pixels: count_changed_pixels(input, &out.image),
                cells: out.cells.as_ref().map(Vec::len),
            };
            let geometry = out.cells.map(|cells| GeometryRecord {
                stage,
                kind: GeometryKind::DitherCells,
                dimensions,
                settings_fingerprint: settings.stage_fingerprint(stage),
                generation,
                primitives: Primitives::Cells(cells),
                paper: None,
                overlay: None,
            });
            StageRun {
                image: out.image,
                geometry,
                metrics,
            }
        }
        StageId::Halftone => {
            let ht = &settings.halftone;
            let out = halftone::render(input, ht, rng);
            let metrics = StageMetrics::Halftone {
                dots: out.dots.len(),
                cmyk: ht.uses_cmyk(),
            };
            let overlay = ht.overlay_opacity().map(|opacity| Overlay {
                image: input.clone(),
                opacity,
            });
            let geometry = GeometryRecord {
                stage,
                kind: GeometryKind::Halftone {
                    shape: ht.shape,
                    rotation: ht.effective_rotation(),
                },
                dimensions,
                settings_fingerprint: settings.stage_fingerprint(stage),
                generation,
                primitives: Primitives::Dots(out.dots),
                paper: Some(Rgb::WHITE),
                overlay,
            };
            StageRun {
                image: out.image,
                geometry: Some(geometry),
                metrics,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::dither::DitherAlgorithm;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            let v = ((x + y) * 255 / (w + h - 2)) as u8;
            Rgba([v, v / 2, 255 - v, 255])
        })
    }

    fn halftone_on() -> EffectSettings {
        let mut settings = EffectSettings::default();
        settings.halftone.enabled = true;
        settings
    }

    #[test]
    fn nothing_enabled_is_identity() {
        let img = gradient(20, 10);
        let out = render(&img, &EffectSettings::default(), &EffectsOrder::default(), 1);
        assert_eq!(out.image, img);
        assert!(out.applied.is_empty());
        assert!(out.geometry.is_none());
        assert!(out.halftone_input.is_none());
    }

    #[test]
    fn stage_streams_are_independent() {
        use rand::RngCore;
        let a = stage_rng(7, StageId::Glitch).next_u64();
        let b = stage_rng(7, StageId::Grid).next_u64();
        let c = stage_rng(7, StageId::Glitch).next_u64();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn halftone_last_keeps_geometry() {
        let img = gradient(40, 40);
        let out = render(&img, &halftone_on(), &EffectsOrder::default(), 3);
        let record = out.geometry.as_ref().unwrap();
        assert_eq!(record.stage, StageId::Halftone);
        assert!(record.matches(out.dimensions()));
        assert!(record.produced_by(&halftone_on().halftone));
        assert_eq!(out.halftone_input.as_ref(), Some(&img));
        assert_eq!(out.applied, vec![StageId::Halftone]);
    }

    #[test]
    fn later_pixel_stage_invalidates_geometry() {
        let mut settings = halftone_on();
        settings.glitch.enabled = true;
        settings.glitch.scan_lines.enabled = true;
        let order: EffectsOrder = "halftone,glitch".parse().unwrap();
        let out = render(&gradient(40, 40), &settings, &order, 3);
        assert!(out.geometry.is_none());
        assert!(out.halftone_input.is_none());
    }

    #[test]
    fn unchanged_buffer_keeps_geometry() {
        let mut settings = halftone_on();
        // Master flag on, every sub-effect off.
        settings.glitch.enabled = true;
        let order: EffectsOrder = "halftone,glitch".parse().unwrap();
        let out = render(&gradient(40, 40), &settings, &order, 3);
        assert!(out.geometry.is_some());
        assert_eq!(out.applied, vec![StageId::Halftone, StageId::Glitch]);
    }

    #[test]
    fn earlier_stage_does_not_invalidate() {
        let mut settings = halftone_on();
        settings.color.enabled = true;
        settings.color.invert = true;
        let order: EffectsOrder = "color,halftone".parse().unwrap();
        let out = render(&gradient(30, 30), &settings, &order, 0);
        assert!(out.geometry.is_some());
    }

    #[test]
    fn dither_cells_become_geometry() {
        let mut settings = EffectSettings::default();
        settings.dither.enabled = true;
        settings.dither.algorithm = DitherAlgorithm::Ordered;
        settings.dither.resolution = 25.0;
        let out = render(&gradient(40, 40), &settings, &EffectsOrder::default(), 0);
        let record = out.geometry.unwrap();
        assert_eq!(record.kind, GeometryKind::DitherCells);
        assert!(!record.is_empty());
    }

    #[test]
    fn mix_records_overlay() {
        let mut settings = halftone_on();
        settings.halftone.mix = 40.0;
        let img = gradient(20, 20);
        let out = render(&img, &settings, &EffectsOrder::default(), 0);
        let overlay = out.geometry.unwrap().overlay.unwrap();
        assert_eq!(overlay.image, img);
        assert!((overlay.opacity - 0.6).abs() < 1e-9);
    }

    #[test]
    fn stepping_follows_enabled_order() {
        let mut settings = EffectSettings::default();
        for stage in [StageId::Grid, StageId::Threshold, StageId::Dither] {
            settings.set_enabled(stage, true);
        }
        let order: EffectsOrder = "dither,grid,halftone,threshold".parse().unwrap();
        let img = gradient(16, 16);
        let mut render = Render::new(&img, &settings, &order, 9);
        let mut seen = Vec::new();
        while let Some(stage) = render.advance(&WebClock) {
            seen.push(stage);
        }
        assert!(render.is_complete());
        assert_eq!(seen, vec![StageId::Dither, StageId::Grid, StageId::Threshold]);
        assert_eq!(render.advance(&WebClock), None);
    }

    #[test]
    fn same_seed_same_output() {
        let mut settings = halftone_on();
        settings.halftone.layout.arrangement = halftone::Arrangement::Random;
        settings.glitch.enabled = true;
        settings.glitch.noise.enabled = true;
        let img = gradient(32, 32);
        let a = render(&img, &settings, &EffectsOrder::default(), 42);
        let b = render(&img, &settings, &EffectsOrder::default(), 42);
        let c = render(&img, &settings, &EffectsOrder::default(), 43);
        assert_eq!(a.image, b.image);
        assert_ne!(a.image, c.image);
    }

    #[test]
    fn diagnostics_cover_each_stage() {
        let mut settings = halftone_on();
        settings.threshold.enabled = true;
        let (out, diag) = render_with_diagnostics(
            &gradient(20, 20),
            &settings,
            &EffectsOrder::default(),
            0,
            &WebClock,
        );
        assert_eq!(diag.stages.len(), out.applied.len());
        assert_eq!(diag.summary.stages_run, 2);
        assert_eq!(
            diag.summary.geometry_primitives,
            out.geometry.as_ref().map(GeometryRecord::len)
        );
        assert!(diag.stages.iter().all(|s| s.duration <= diag.total_duration));
    }

    #[test]
    fn generation_tags_geometry() {
        let img = gradient(20, 20);
        let settings = halftone_on();
        let out = Render::new(&img, &settings, &EffectsOrder::default(), 0)
            .with_generation(5)
            .finish();
        assert_eq!(out.generation, 5);
        assert_eq!(out.geometry.unwrap().generation, 5);
    }
}
