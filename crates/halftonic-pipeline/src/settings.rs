//! The full effect settings document.

use serde::{Deserialize, Serialize};

use crate::color::{ColorSettings, ThresholdSettings};
use crate::displacement::DisplacementSettings;
use crate::dither::DitherSettings;
use crate::geometry::fingerprint;
use crate::glitch::GlitchSettings;
use crate::grid::GridSettings;
use crate::halftone::HalftoneSettings;
use crate::stage::StageId;
use crate::text_dither::TextDitherSettings;
use crate::types::PipelineError;

/// Settings for every stage, replaced as a whole when anything changes.
///
/// Missing fields deserialize to their defaults, so a document only needs
/// to mention what it changes:
///
/// ```
/// use halftonic_pipeline::EffectSettings;
///
/// let settings = EffectSettings::from_json(r#"{"halftone": {"enabled": true}}"#).unwrap();
/// assert!(settings.halftone.enabled);
/// assert!((settings.halftone.cell_size - 10.0).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectSettings {
    /// Color/tone adjustments.
    pub color: ColorSettings,
    /// Duotone threshold.
    pub threshold: ThresholdSettings,
    /// Dithering.
    pub dither: DitherSettings,
    /// Halftone dots.
    pub halftone: HalftoneSettings,
    /// Glyph stamping.
    pub text_dither: TextDitherSettings,
    /// Glitch effects.
    pub glitch: GlitchSettings,
    /// Grid split.
    pub grid: GridSettings,
    /// Pixel displacement.
    pub displacement: DisplacementSettings,
}

impl EffectSettings {
    /// Parse a settings document.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `json` is not a valid
    /// settings document.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    /// Serialize to a compact JSON document.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Whether `stage` will run.
    #[must_use]
    pub const fn is_enabled(&self, stage: StageId) -> bool {
        match stage {
            StageId::Color => self.color.enabled,
            StageId::Threshold => self.threshold.enabled,
            StageId::Dither => self.dither.enabled,
            StageId::Halftone => self.halftone.enabled,
            StageId::TextDither => self.text_dither.enabled,
            StageId::Glitch => self.glitch.enabled,
            StageId::Grid => self.grid.enabled,
            StageId::Displacement => self.displacement.enabled,
        }
    }

    /// Turn `stage` on or off, leaving its other settings untouched.
    pub const fn set_enabled(&mut self, stage: StageId, enabled: bool) {
        match stage {
            StageId::Color => self.color.enabled = enabled,
            StageId::Threshold => self.threshold.enabled = enabled,
            StageId::Dither => self.dither.enabled = enabled,
            StageId::Halftone => self.halftone.enabled = enabled,
            StageId::TextDither => self.text_dither.enabled = enabled,
            StageId::Glitch => self.glitch.enabled = enabled,
            StageId::Grid => self.grid.enabled = enabled,
            StageId::Displacement => self.displacement.enabled = enabled,
        }
    }

    /// Stages that will run, in the order given.
    #[must_use]
    pub fn enabled_stages(&self, order: &[StageId]) -> Vec<StageId> {
        order.iter().copied().filter(|s| self.is_enabled(*s)).collect()
    }

    /// Fingerprint of the settings block of `stage`.
    ///
    /// Geometry records carry this value so exporters can tell whether a
    /// record still describes the current settings.
    #[must_use]
    pub fn stage_fingerprint(&self, stage: StageId) -> u64 {
        match stage {
            StageId::Color => fingerprint(&self.color),
            StageId::Threshold => fingerprint(&self.threshold),
            StageId::Dither => fingerprint(&self.dither),
            StageId::Halftone => fingerprint(&self.halftone),
            StageId::TextDither => fingerprint(&self.text_dither),
            StageId::Glitch => fingerprint(&self.glitch),
            StageId::Grid => fingerprint(&self.grid),
            StageId::Displacement => fingerprint(&self.displacement),
        }
    }
}
