//! Tuning constants for the live pipeline.
//!
//! Every struct here is a plain construction parameter: build it (or load a
//! `PipelineConfig` from JSON), validate it once, then hand it to the stage
//! that needs it. Nothing reads configuration from globals.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{TrackError, TrackResult};
use crate::fix::MPS_TO_MPH;

/// Minimum spacing between adjacent speed tiers (mph)
pub const MIN_TIER_GAP_MPH: f64 = 0.5;

/// Six speed thresholds in mph, ordered easy < medium < hard per direction.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub downhill_easy: f64,
    pub downhill_medium: f64,
    pub downhill_hard: f64,
    pub uphill_easy: f64,
    pub uphill_medium: f64,
    pub uphill_hard: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            downhill_easy: 3.0,
            downhill_medium: 10.0,
            downhill_hard: 20.0,
            uphill_easy: 1.0,
            uphill_medium: 2.0,
            uphill_hard: 3.0,
        }
    }
}

impl ThresholdConfig {
    pub fn new(downhill: [f64; 3], uphill: [f64; 3]) -> TrackResult<Self> {
        let config = ThresholdConfig {
            downhill_easy: downhill[0],
            downhill_medium: downhill[1],
            downhill_hard: downhill[2],
            uphill_easy: uphill[0],
            uphill_medium: uphill[1],
            uphill_hard: uphill[2],
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackResult<()> {
        validate_tiers(
            "downhill",
            [self.downhill_easy, self.downhill_medium, self.downhill_hard],
        )?;
        validate_tiers("uphill", [self.uphill_easy, self.uphill_medium, self.uphill_hard])
    }

    /// Speed below which neither direction leaves `Idle`.
    pub fn idle_cutoff_mph(&self) -> f64 {
        self.downhill_easy.min(self.uphill_easy)
    }
}

fn validate_tiers(direction: &str, tiers: [f64; 3]) -> TrackResult<()> {
    for value in tiers {
        if !value.is_finite() || value <= 0.0 {
            return Err(TrackError::Config(format!(
                "{} threshold {} must be a positive number",
                direction, value
            )));
        }
    }
    for pair in tiers.windows(2) {
        if pair[1] - pair[0] < MIN_TIER_GAP_MPH {
            return Err(TrackError::Config(format!(
                "{} thresholds {} and {} must increase by at least {} mph",
                direction, pair[0], pair[1], MIN_TIER_GAP_MPH
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct VelocitySmootherConfig {
    pub absolute_max_value: f64,
    pub spike_multiplier: f64,
    pub min_value_threshold: f64,
    /// Weight given to the new reading
    pub alpha: f64,
}

impl Default for VelocitySmootherConfig {
    fn default() -> Self {
        VelocitySmootherConfig {
            absolute_max_value: 30.0 * MPS_TO_MPH,
            spike_multiplier: 3.0,
            min_value_threshold: 0.45,
            alpha: 0.6,
        }
    }
}

impl VelocitySmootherConfig {
    pub fn validate(&self) -> TrackResult<()> {
        validate_alpha("velocity", self.alpha)?;
        if !(self.absolute_max_value > 0.0) {
            return Err(TrackError::Config(format!(
                "velocity absolute_max_value {} must be positive",
                self.absolute_max_value
            )));
        }
        if !(self.spike_multiplier >= 1.0) {
            return Err(TrackError::Config(format!(
                "velocity spike_multiplier {} must be at least 1",
                self.spike_multiplier
            )));
        }
        if !(self.min_value_threshold >= 0.0) {
            return Err(TrackError::Config(format!(
                "velocity min_value_threshold {} must not be negative",
                self.min_value_threshold
            )));
        }
        Ok(())
    }
}

/// Trend-following EMA weight for the elevation smoother.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdaptiveAlpha {
    pub alpha_min: f64,
    pub alpha_max: f64,
    pub trend_window: usize,
}

impl Default for AdaptiveAlpha {
    fn default() -> Self {
        AdaptiveAlpha {
            alpha_min: 0.25,
            alpha_max: 0.75,
            trend_window: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ElevationSmootherConfig {
    /// meters; readings reporting worse vertical accuracy are rejected
    pub vertical_accuracy_threshold: f64,
    pub alpha: f64,
    pub adaptive: Option<AdaptiveAlpha>,
    /// Guess accuracy from the recent altitude pattern when the fix has none
    pub estimate_missing_accuracy: bool,
    /// meters; a reversal larger than this on both sides reads as a spike
    pub spike_reversal_threshold: f64,
}

impl Default for ElevationSmootherConfig {
    fn default() -> Self {
        ElevationSmootherConfig {
            vertical_accuracy_threshold: 15.0,
            alpha: 0.3,
            adaptive: None,
            estimate_missing_accuracy: false,
            spike_reversal_threshold: 3.0,
        }
    }
}

impl ElevationSmootherConfig {
    pub fn validate(&self) -> TrackResult<()> {
        validate_alpha("elevation", self.alpha)?;
        if !(self.vertical_accuracy_threshold >= 0.0) {
            return Err(TrackError::Config(format!(
                "vertical_accuracy_threshold {} must not be negative",
                self.vertical_accuracy_threshold
            )));
        }
        if let Some(adaptive) = self.adaptive {
            validate_alpha("adaptive alpha_min", adaptive.alpha_min)?;
            validate_alpha("adaptive alpha_max", adaptive.alpha_max)?;
            if adaptive.alpha_min > adaptive.alpha_max {
                return Err(TrackError::Config(format!(
                    "adaptive alpha_min {} exceeds alpha_max {}",
                    adaptive.alpha_min, adaptive.alpha_max
                )));
            }
            if adaptive.trend_window < 3 {
                return Err(TrackError::Config(
                    "adaptive trend_window must hold at least 3 readings".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn validate_alpha(name: &str, alpha: f64) -> TrackResult<()> {
    if alpha > 0.0 && alpha <= 1.0 {
        Ok(())
    } else {
        Err(TrackError::Config(format!(
            "{} alpha {} must be in (0, 1]",
            name, alpha
        )))
    }
}

/// Everything the live pipeline needs, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub thresholds: ThresholdConfig,
    pub velocity: VelocitySmootherConfig,
    pub elevation: ElevationSmootherConfig,
    pub use_metric: bool,
    /// Written into the `creator` attribute of recorded GPX files
    pub creator: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            thresholds: ThresholdConfig::default(),
            velocity: VelocitySmootherConfig::default(),
            elevation: ElevationSmootherConfig::default(),
            use_metric: false,
            creator: "rust-gpx-tracker".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> TrackResult<()> {
        self.thresholds.validate()?;
        self.velocity.validate()?;
        self.elevation.validate()
    }

    pub fn from_json_str(json: &str) -> TrackResult<Self> {
        let config: PipelineConfig =
            serde_json::from_str(json).map_err(|e| TrackError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> TrackResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
