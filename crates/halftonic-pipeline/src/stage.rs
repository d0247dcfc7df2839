//! Pipeline stage identifiers and the user-configurable effects order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Identifier for one effect stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageId {
    /// Levels, hue/saturation/brightness/contrast, posterize, invert.
    Color,
    /// Duotone threshold.
    Threshold,
    /// Ordered or error-diffusion dithering.
    Dither,
    /// Halftone dots, optionally CMYK separated.
    Halftone,
    /// Brightness-driven glyph stamping.
    TextDither,
    /// Pixel sort, channel shift, scan lines, noise, block displacement.
    Glitch,
    /// Grid split with per-cell rotation and resampling.
    Grid,
    /// Brightness- or noise-driven pixel displacement.
    Displacement,
}

impl StageId {
    /// All stages in their default pipeline order.
    pub const ALL: [Self; 8] = [
        Self::Color,
        Self::Threshold,
        Self::Grid,
        Self::Displacement,
        Self::Glitch,
        Self::Dither,
        Self::Halftone,
        Self::TextDither,
    ];

    /// Stable machine name, identical to the serde representation.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Threshold => "threshold",
            Self::Dither => "dither",
            Self::Halftone => "halftone",
            Self::TextDither => "textDither",
            Self::Glitch => "glitch",
            Self::Grid => "grid",
            Self::Displacement => "displacement",
        }
    }

    /// Whether this stage emits a geometry record for vector export.
    #[must_use]
    pub const fn records_geometry(self) -> bool {
        matches!(self, Self::Halftone | Self::Dither)
    }

    /// Per-stage salt mixed into the document seed.
    pub(crate) const fn seed_salt(self) -> u64 {
        match self {
            Self::Color => 0x01,
            Self::Threshold => 0x02,
            Self::Dither => 0x03,
            Self::Halftone => 0x04,
            Self::TextDither => 0x05,
            Self::Glitch => 0x06,
            Self::Grid => 0x07,
            Self::Displacement => 0x08,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        Self::ALL
            .into_iter()
            .find(|stage| stage.name().to_ascii_lowercase() == wanted)
            .ok_or_else(|| PipelineError::InvalidOrder(format!("unknown stage '{s}'")))
    }
}

/// Ordered sequence of every stage, without duplicates.
///
/// The order decides which stage's output feeds which stage's input.
/// Construction validates that the sequence is a permutation of
/// [`StageId::ALL`], so every stage appears exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StageId>", into = "Vec<StageId>")]
pub struct EffectsOrder(Vec<StageId>);

impl Default for EffectsOrder {
    fn default() -> Self {
        Self(StageId::ALL.to_vec())
    }
}

impl EffectsOrder {
    /// Build an order from an explicit stage list.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidOrder`] if a stage is missing or
    /// repeated.
    pub fn new(stages: Vec<StageId>) -> Result<Self, PipelineError> {
        for stage in StageId::ALL {
            let count = stages.iter().filter(|s| **s == stage).count();
            if count != 1 {
                return Err(PipelineError::InvalidOrder(format!(
                    "stage '{stage}' appears {count} times, expected exactly once"
                )));
            }
        }
        if stages.len() != StageId::ALL.len() {
            return Err(PipelineError::InvalidOrder(format!(
                "expected {} stages, got {}",
                StageId::ALL.len(),
                stages.len()
            )));
        }
        Ok(Self(stages))
    }

    /// Build an order where `leading` stages come first, in the given
    /// order, followed by the remaining stages in default order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidOrder`] if `leading` repeats a stage.
    pub fn with_leading(leading: &[StageId]) -> Result<Self, PipelineError> {
        let mut stages = leading.to_vec();
        stages.extend(StageId::ALL.into_iter().filter(|s| !leading.contains(s)));
        Self::new(stages)
    }

    /// The stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageId] {
        &self.0
    }

    /// Position of `stage` in the order.
    #[must_use]
    pub fn position(&self, stage: StageId) -> usize {
        self.0.iter().position(|s| *s == stage).unwrap_or(0)
    }

    /// Swap `stage` with its predecessor. Returns `false` if it is already
    /// first.
    pub fn move_up(&mut self, stage: StageId) -> bool {
        let index = self.position(stage);
        if index == 0 {
            return false;
        }
        self.0.swap(index, index - 1);
        true
    }

    /// Swap `stage` with its successor. Returns `false` if it is already
    /// last.
    pub fn move_down(&mut self, stage: StageId) -> bool {
        let index = self.position(stage);
        if index + 1 >= self.0.len() {
            return false;
        }
        self.0.swap(index, index + 1);
        true
    }

    /// Exchange the positions of `a` and `b`.
    pub fn swap(&mut self, a: StageId, b: StageId) {
        let (i, j) = (self.position(a), self.position(b));
        self.0.swap(i, j);
    }
}

impl TryFrom<Vec<StageId>> for EffectsOrder {
    type Error = PipelineError;

    fn try_from(stages: Vec<StageId>) -> Result<Self, Self::Error> {
        Self::new(stages)
    }
}

impl From<EffectsOrder> for Vec<StageId> {
    fn from(order: EffectsOrder) -> Self {
        order.0
    }
}

impl FromStr for EffectsOrder {
    type Err = PipelineError;

    /// Parse a comma-separated list of stage names. Stages not mentioned
    /// keep their default relative order after the listed ones.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let leading = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(StageId::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_leading(&leading)
    }
}

impl fmt::Display for EffectsOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(stage.name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn all_contains_every_variant_once() {
        let mut seen = std::collections::HashSet::new();
        for stage in StageId::ALL {
            assert!(seen.insert(stage), "duplicate stage in ALL: {stage}");
        }
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn default_order_is_valid() {
        let order = EffectsOrder::default();
        assert!(EffectsOrder::new(order.stages().to_vec()).is_ok());
    }

    #[test]
    fn duplicate_stage_is_rejected() {
        let mut stages = StageId::ALL.to_vec();
        stages[1] = StageId::Color;
        assert!(matches!(
            EffectsOrder::new(stages),
            Err(PipelineError::InvalidOrder(_))
        ));
    }

    #[test]
    fn missing_stage_is_rejected() {
        let stages = StageId::ALL[..7].to_vec();
        assert!(EffectsOrder::new(stages).is_err());
    }

    #[test]
    fn move_up_and_down_swap_neighbors() {
        let mut order = EffectsOrder::default();
        assert!(!order.move_up(StageId::Color));
        assert!(order.move_down(StageId::Color));
        assert_eq!(order.stages()[0], StageId::Threshold);
        assert_eq!(order.stages()[1], StageId::Color);
        assert!(order.move_up(StageId::Color));
        assert_eq!(order, EffectsOrder::default());
        assert!(!order.move_down(StageId::TextDither));
    }

    #[test]
    fn swap_exchanges_any_two() {
        let mut order = EffectsOrder::default();
        order.swap(StageId::Color, StageId::TextDither);
        assert_eq!(order.stages()[0], StageId::TextDither);
        assert_eq!(order.stages()[7], StageId::Color);
        order.swap(StageId::Grid, StageId::Grid);
        assert_eq!(order.position(StageId::Grid), 2);
    }

    #[test]
    fn parse_leading_stages() {
        let order: EffectsOrder = "halftone, threshold".parse().unwrap();
        assert_eq!(order.stages()[0], StageId::Halftone);
        assert_eq!(order.stages()[1], StageId::Threshold);
        assert_eq!(order.stages().len(), 8);
    }

    #[test]
    fn parse_accepts_kebab_case() {
        assert_eq!("text-dither".parse::<StageId>().unwrap(), StageId::TextDither);
        assert!("sharpen".parse::<StageId>().is_err());
    }

    #[test]
    fn serde_rejects_duplicates() {
        let json = r#"["color","color","dither","halftone","textDither","glitch","grid","displacement"]"#;
        assert!(serde_json::from_str::<EffectsOrder>(json).is_err());
    }

    #[test]
    fn serde_round_trip() {
        let order: EffectsOrder = "grid,glitch".parse().unwrap();
        let json = serde_json::to_string(&order).unwrap();
        assert!(json.starts_with(r#"["grid","glitch""#));
        let back: EffectsOrder = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }
}
