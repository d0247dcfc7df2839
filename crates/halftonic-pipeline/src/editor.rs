//! The single active document: source image, settings, order and seed,
//! plus the render state machine `Idle -> Processing -> Idle`.
//!
//! Every change bumps a generation counter and hands out a [`RenderJob`]
//! tagged with it. Jobs own everything they need, so a host may run them
//! on another thread. A job stops between stages once a newer generation
//! has been requested, and [`Editor::present`] only accepts the frame of
//! the latest generation, so a stale render can never replace a newer one
//! on screen no matter which finishes first.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::diagnostics::{Clock, PipelineDiagnostics, WebClock};
use crate::pipeline::{Render, RenderOutput};
use crate::settings::EffectSettings;
use crate::stage::{EffectsOrder, StageId};
use crate::types::{PipelineError, RgbaImage};

/// Render state of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    /// The displayed frame reflects the latest change.
    Idle,
    /// A render for `generation` has been requested and not yet presented.
    Processing {
        /// Generation awaited.
        generation: u64,
    },
}

/// The active document.
#[derive(Debug)]
pub struct Editor {
    source: Arc<RgbaImage>,
    settings: EffectSettings,
    order: EffectsOrder,
    seed: u64,
    latest: Arc<AtomicU64>,
    state: EditorState,
    displayed: Option<RenderOutput>,
}

impl Editor {
    /// Open a document on `source` with default settings and order.
    #[must_use]
    pub fn new(source: RgbaImage) -> Self {
        Self {
            source: Arc::new(source),
            settings: EffectSettings::default(),
            order: EffectsOrder::default(),
            seed: 0,
            latest: Arc::new(AtomicU64::new(0)),
            state: EditorState::Idle,
            displayed: None,
        }
    }

    /// Use `seed` for every stochastic stage.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The untouched source image.
    #[must_use]
    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> &EffectSettings {
        &self.settings
    }

    /// Current effects order.
    #[must_use]
    pub const fn order(&self) -> &EffectsOrder {
        &self.order
    }

    /// Document seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Latest requested generation; 0 before the first request.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    /// Current render state.
    #[must_use]
    pub const fn state(&self) -> EditorState {
        self.state
    }

    /// The frame on screen, if any.
    #[must_use]
    pub const fn displayed(&self) -> Option<&RenderOutput> {
        self.displayed.as_ref()
    }

    /// Replace the source image and request a render.
    pub fn set_source(&mut self, source: RgbaImage) -> RenderJob {
        self.source = Arc::new(source);
        self.request_render()
    }

    /// Replace the settings wholesale and request a render.
    pub fn set_settings(&mut self, settings: EffectSettings) -> RenderJob {
        self.settings = settings;
        self.request_render()
    }

    /// Replace the effects order and request a render.
    pub fn set_order(&mut self, order: EffectsOrder) -> RenderJob {
        self.order = order;
        self.request_render()
    }

    /// Swap `stage` with its predecessor. Returns a job only if the order
    /// changed.
    pub fn move_up(&mut self, stage: StageId) -> Option<RenderJob> {
        self.order.move_up(stage).then(|| self.request_render())
    }

    /// Swap `stage` with its successor. Returns a job only if the order
    /// changed.
    pub fn move_down(&mut self, stage: StageId) -> Option<RenderJob> {
        self.order.move_down(stage).then(|| self.request_render())
    }

    /// Start a new generation and return the job that renders it.
    ///
    /// Any job handed out earlier becomes superseded.
    pub fn request_render(&mut self) -> RenderJob {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        self.state = EditorState::Processing { generation };
        tracing::debug!(generation, "render requested");
        RenderJob {
            generation,
            source: Arc::clone(&self.source),
            settings: self.settings.clone(),
            order: self.order.clone(),
            seed: self.seed,
            latest: Arc::clone(&self.latest),
        }
    }

    /// Offer a finished frame for display.
    ///
    /// Accepted only when it belongs to the latest requested generation;
    /// the editor then returns to [`EditorState::Idle`]. Stale frames are
    /// dropped and `false` is returned.
    pub fn present(&mut self, frame: RenderOutput) -> bool {
        let latest = self.generation();
        if frame.generation != latest {
            tracing::debug!(frame = frame.generation, latest, "stale frame dropped");
            return false;
        }
        self.displayed = Some(frame);
        self.state = EditorState::Idle;
        true
    }
}

/// One requested render, detached from the editor.
#[derive(Debug, Clone)]
pub struct RenderJob {
    generation: u64,
    source: Arc<RgbaImage>,
    settings: EffectSettings,
    order: EffectsOrder,
    seed: u64,
    latest: Arc<AtomicU64>,
}

impl RenderJob {
    /// Generation this job renders.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a newer render has been requested since this job was made.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.generation
    }

    /// Run the render, stopping between stages once superseded.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Superseded`] if a newer generation was
    /// requested before the render finished.
    pub fn run(&self) -> Result<RenderOutput, PipelineError> {
        self.run_with_diagnostics(&WebClock).map(|(output, _)| output)
    }

    /// Like [`run`](Self::run), also timing every stage with `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Superseded`] if a newer generation was
    /// requested before the render finished.
    pub fn run_with_diagnostics<C: Clock>(
        &self,
        clock: &C,
    ) -> Result<(RenderOutput, PipelineDiagnostics), PipelineError> {
        let start = clock.now();
        let mut render = Render::new(&self.source, &self.settings, &self.order, self.seed)
            .with_generation(self.generation);
        loop {
            if self.is_superseded() {
                tracing::debug!(generation = self.generation, "render abandoned");
                return Err(PipelineError::Superseded {
                    generation: self.generation,
                });
            }
            if render.advance(clock).is_none() {
                break;
            }
        }
        Ok(render.finish_with_diagnostics(clock.elapsed(&start)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;

    fn source() -> RgbaImage {
        RgbaImage::from_fn(24, 24, |x, y| {
            let v = ((x + y) * 5) as u8;
            Rgba([v, v, v, 255])
        })
    }

    fn with(stage: StageId) -> EffectSettings {
        let mut settings = EffectSettings::default();
        settings.set_enabled(stage, true);
        settings
    }

    #[test]
    fn request_enters_processing_and_present_returns_to_idle() {
        let mut editor = Editor::new(source());
        assert_eq!(editor.state(), EditorState::Idle);
        let job = editor.set_settings(with(StageId::Threshold));
        assert_eq!(editor.state(), EditorState::Processing { generation: 1 });
        let frame = job.run().unwrap();
        assert!(editor.present(frame));
        assert_eq!(editor.state(), EditorState::Idle);
        assert_eq!(editor.displayed().unwrap().applied, vec![StageId::Threshold]);
    }

    #[test]
    fn superseded_job_stops() {
        let mut editor = Editor::new(source());
        let first = editor.set_settings(with(StageId::Halftone));
        let second = editor.set_settings(with(StageId::Threshold));
        assert!(first.is_superseded());
        assert!(!second.is_superseded());
        assert!(matches!(
            first.run(),
            Err(PipelineError::Superseded { generation: 1 })
        ));
        assert!(second.run().is_ok());
    }

    #[test]
    fn stale_frame_never_replaces_newer() {
        let mut editor = Editor::new(source());
        let first = editor.set_settings(with(StageId::Halftone));
        let old = first.run().unwrap();
        let second = editor.set_settings(with(StageId::Threshold));
        let new = second.run().unwrap();

        assert!(editor.present(new));
        assert!(!editor.present(old));
        assert_eq!(editor.displayed().unwrap().generation, 2);
    }

    #[test]
    fn stale_frame_does_not_end_processing() {
        let mut editor = Editor::new(source());
        let first = editor.request_render();
        let old = first.run().unwrap();
        let _second = editor.request_render();
        assert!(!editor.present(old));
        assert_eq!(editor.state(), EditorState::Processing { generation: 2 });
        assert!(editor.displayed().is_none());
    }

    #[test]
    fn jobs_can_run_on_another_thread() {
        let mut editor = Editor::new(source()).with_seed(3);
        let job = editor.set_settings(with(StageId::Glitch));
        let frame = std::thread::spawn(move || job.run()).join().unwrap().unwrap();
        assert!(editor.present(frame));
    }

    #[test]
    fn noop_reorder_requests_nothing() {
        let mut editor = Editor::new(source());
        let first = editor.order().stages()[0];
        assert!(editor.move_up(first).is_none());
        assert_eq!(editor.generation(), 0);
        assert!(editor.move_down(first).is_some());
        assert_eq!(editor.order().stages()[1], first);
    }

    #[test]
    fn job_sees_settings_at_request_time() {
        let mut editor = Editor::new(source());
        let job = editor.set_settings(with(StageId::Threshold));
        // The editor may change afterwards; the job keeps its snapshot.
        let frame = job.run().unwrap();
        assert_eq!(frame.applied, vec![StageId::Threshold]);
        assert_eq!(editor.settings(), &with(StageId::Threshold));
    }
}
