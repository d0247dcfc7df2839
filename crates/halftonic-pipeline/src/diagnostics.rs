//! Render diagnostics: timing and counts for each stage that ran.
//!
//! Every call to [`render_with_diagnostics`](crate::render_with_diagnostics)
//! collects one [`StageDiagnostics`] per enabled stage, in execution order.
//!
//! Durations use [`std::time::Duration`]. Timestamps come from a
//! [`Clock`]; [`WebClock`] is backed by the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` natively.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stage::StageId;
use crate::types::{Dimensions, RgbaImage};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of monotonic timestamps.
///
/// Injected so tests and hosts without a monotonic clock can supply their
/// own.
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// The current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from one render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Enabled stages in execution order.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the render (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts.
    pub summary: PipelineSummary,
}

/// Diagnostics for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Which stage ran.
    pub stage: StageId,
    /// Wall-clock duration of the stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// A per-pixel transform.
    Pixels {
        /// Pixels whose value changed.
        changed_pixels: u64,
        /// Canvas pixel count.
        total_pixels: u64,
    },
    /// Dithering.
    Dither {
        /// Algorithm name.
        algorithm: String,
        /// Pixels whose value changed.
        changed_pixels: u64,
        /// Visible cells recorded, if cell mode applied.
        cells: Option<usize>,
    },
    /// Halftone dots.
    Halftone {
        /// Dots drawn.
        dots: usize,
        /// Whether the dots were CMYK separated.
        cmyk: bool,
    },
    /// Glyph stamping.
    TextDither {
        /// Glyphs stamped.
        glyphs: u64,
    },
}

/// High-level summary of a render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Canvas pixel count.
    pub pixel_count: u64,
    /// Number of stages that ran.
    pub stages_run: usize,
    /// Primitives in the surviving geometry record, if any.
    pub geometry_primitives: Option<usize>,
}

impl PipelineSummary {
    /// Summary for a canvas of `dimensions`.
    #[must_use]
    pub const fn new(
        dimensions: Dimensions,
        stages_run: usize,
        geometry_primitives: Option<usize>,
    ) -> Self {
        Self {
            width: dimensions.width,
            height: dimensions.height,
            pixel_count: dimensions.area(),
            stages_run,
            geometry_primitives,
        }
    }
}

impl PipelineDiagnostics {
    /// Duration of `stage`, if it ran.
    #[must_use]
    pub fn stage_duration(&self, stage: StageId) -> Option<Duration> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.duration)
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Render Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Canvas: {}x{} ({} pixels)",
            self.summary.width, self.summary.height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage",
            "Duration",
            "% Total",
            "Details"
        ));
        lines.push("-".repeat(72));

        let total_ms = duration_ms(self.total_duration);
        for diag in &self.stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!(
                "{:<16} {ms:>8.3}ms {pct:>9.1}%  {details}",
                diag.stage.name()
            ));
        }
        if self.stages.is_empty() {
            lines.push("(no stage enabled)".to_owned());
        }

        lines.push(String::new());
        match self.summary.geometry_primitives {
            Some(n) => lines.push(format!("Geometry record: {n} primitives")),
            None => lines.push("Geometry record: none".to_owned()),
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Pixels {
            changed_pixels,
            total_pixels,
        } => format!(
            "changed={changed_pixels} ({:.1}%)",
            percent(*changed_pixels, *total_pixels)
        ),
        StageMetrics::Dither {
            algorithm,
            changed_pixels,
            cells,
        } => match cells {
            Some(cells) => format!("{algorithm} changed={changed_pixels} cells={cells}"),
            None => format!("{algorithm} changed={changed_pixels}"),
        },
        StageMetrics::Halftone { dots, cmyk } => {
            if *cmyk {
                format!("{dots} dots (cmyk)")
            } else {
                format!("{dots} dots")
            }
        }
        StageMetrics::TextDither { glyphs } => format!("{glyphs} glyphs"),
    }
}

/// Count pixels that differ between two equally sized buffers.
pub(crate) fn count_changed_pixels(before: &RgbaImage, after: &RgbaImage) -> u64 {
    before
        .pixels()
        .zip(after.pixels())
        .map(|(a, b)| u64::from(a != b))
        .sum()
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn count_changed_pixels_works() {
        let a = RgbaImage::new(10, 10);
        let mut b = a.clone();
        for i in 0..5 {
            b.put_pixel(i, 0, Rgba([255, 0, 0, 0]));
        }
        assert_eq!(count_changed_pixels(&a, &b), 5);
        assert_eq!(count_changed_pixels(&a, &a), 0);
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let diag = StageDiagnostics {
            stage: StageId::Glitch,
            duration: Duration::from_millis(1500),
            metrics: StageMetrics::Pixels {
                changed_pixels: 1,
                total_pixels: 4,
            },
        };
        let json = serde_json::to_value(&diag).unwrap_or_default();
        assert_eq!(json["stage"], "glitch");
        assert!((json["duration"].as_f64().unwrap_or_default() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = r#"{"stage":"grid","duration":-1.0,"metrics":{"TextDither":{"glyphs":3}}}"#;
        assert!(serde_json::from_str::<StageDiagnostics>(json).is_err());
    }

    #[test]
    fn report_lists_each_stage() {
        let diag = PipelineDiagnostics {
            stages: vec![
                StageDiagnostics {
                    stage: StageId::Color,
                    duration: Duration::from_millis(5),
                    metrics: StageMetrics::Pixels {
                        changed_pixels: 50,
                        total_pixels: 100,
                    },
                },
                StageDiagnostics {
                    stage: StageId::Halftone,
                    duration: Duration::from_millis(15),
                    metrics: StageMetrics::Halftone {
                        dots: 100,
                        cmyk: true,
                    },
                },
            ],
            total_duration: Duration::from_millis(20),
            summary: PipelineSummary::new(
                Dimensions {
                    width: 10,
                    height: 10,
                },
                2,
                Some(100),
            ),
        };

        let report = diag.report();
        assert!(report.contains("Render Diagnostics Report"));
        assert!(report.contains("color"));
        assert!(report.contains("100 dots (cmyk)"));
        assert!(report.contains("changed=50 (50.0%)"));
        assert!(report.contains("Geometry record: 100 primitives"));
        assert_eq!(diag.stage_duration(StageId::Halftone), Some(Duration::from_millis(15)));
        assert_eq!(diag.stage_duration(StageId::Grid), None);
    }

    #[test]
    fn web_clock_is_monotonic() {
        let clock = WebClock;
        let start = clock.now();
        assert!(clock.elapsed(&start) < Duration::from_secs(60));
    }
}
