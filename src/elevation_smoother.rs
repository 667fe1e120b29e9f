//! Streaming altitude smoother.
//!
//! Readings with a reported vertical accuracy worse than the configured
//! threshold are rejected and the previous smoothed altitude is re-emitted;
//! everything else goes through a slow EMA. The first reading is always
//! accepted. Optionally the EMA weight follows the recent trend, and a missing
//! accuracy can be estimated from the shape of the last few raw altitudes.

use std::collections::VecDeque;

use tracing::debug;

use crate::config::{AdaptiveAlpha, ElevationSmootherConfig};

/// Raw altitudes kept for accuracy estimation. Five, so the flat-jitter check
/// (all within 1 m of their mean) has a full window to look at.
const PATTERN_HISTORY: usize = 5;

#[derive(Debug, Clone)]
pub struct ElevationSmoother {
    config: ElevationSmootherConfig,
    last_raw: Option<f64>,
    last_smoothed: Option<f64>,
    recent_raw: VecDeque<f64>,
    recent_accepted: VecDeque<f64>,
}

impl ElevationSmoother {
    pub fn new(config: ElevationSmootherConfig) -> Self {
        ElevationSmoother {
            config,
            last_raw: None,
            last_smoothed: None,
            recent_raw: VecDeque::with_capacity(PATTERN_HISTORY),
            recent_accepted: VecDeque::new(),
        }
    }

    pub fn add_reading(&mut self, altitude: f64, vertical_accuracy: Option<f64>) -> f64 {
        push_bounded(&mut self.recent_raw, altitude, PATTERN_HISTORY);

        let accuracy = match vertical_accuracy {
            Some(acc) => Some(acc),
            None if self.config.estimate_missing_accuracy => Some(self.estimate_accuracy()),
            None => None,
        };

        let Some(previous) = self.last_smoothed else {
            self.accept(altitude, altitude);
            return altitude;
        };

        if matches!(accuracy, Some(acc) if acc > self.config.vertical_accuracy_threshold) {
            debug!(altitude, ?accuracy, "rejected low-accuracy altitude");
            return previous;
        }

        let alpha = self.current_alpha(altitude);
        let smoothed = alpha * altitude + (1.0 - alpha) * previous;
        self.accept(altitude, smoothed);
        smoothed
    }

    fn accept(&mut self, raw: f64, smoothed: f64) {
        self.last_raw = Some(raw);
        self.last_smoothed = Some(smoothed);
        if let Some(adaptive) = self.config.adaptive {
            push_bounded(&mut self.recent_accepted, raw, adaptive.trend_window);
        }
    }

    /// EMA weight for a reading about to be accepted
    fn current_alpha(&self, incoming: f64) -> f64 {
        match self.config.adaptive {
            None => self.config.alpha,
            Some(adaptive) => {
                let mut window: Vec<f64> = self.recent_accepted.iter().copied().collect();
                window.push(incoming);
                if window.len() > adaptive.trend_window {
                    window.remove(0);
                }
                trend_alpha(&window, &adaptive)
            }
        }
    }

    /// Vertical accuracy guess (meters) from the recent raw altitude pattern
    fn estimate_accuracy(&self) -> f64 {
        let raw: Vec<f64> = self.recent_raw.iter().copied().collect();
        let recent = &raw[raw.len().saturating_sub(4)..];
        if recent.len() < 4 {
            return 20.0;
        }

        let changes: Vec<f64> = recent.windows(2).map(|w| w[1] - w[0]).collect();
        let last = changes[changes.len() - 1];
        let second_last = changes[changes.len() - 2];
        let reversal = self.config.spike_reversal_threshold;

        if last.abs() > reversal
            && second_last.abs() > reversal
            && last.signum() != second_last.signum()
        {
            return 30.0;
        }

        let signs: Vec<f64> = changes
            .iter()
            .map(|c| if *c == 0.0 { 0.0 } else { c.signum() })
            .collect();
        if signs.iter().all(|s| *s != 0.0) && signs[0] != signs[1] && signs[1] != signs[2] {
            return 25.0;
        }

        if raw.len() >= PATTERN_HISTORY {
            let mean = raw.iter().sum::<f64>() / raw.len() as f64;
            let max_deviation = raw.iter().map(|e| (e - mean).abs()).fold(0.0, f64::max);
            if max_deviation < 1.0 {
                return 15.0;
            }
        }

        8.0
    }

    pub fn reset(&mut self) {
        self.last_raw = None;
        self.last_smoothed = None;
        self.recent_raw.clear();
        self.recent_accepted.clear();
    }

    pub fn last_smoothed(&self) -> Option<f64> {
        self.last_smoothed
    }

    pub fn last_raw(&self) -> Option<f64> {
        self.last_raw
    }
}

impl Default for ElevationSmoother {
    fn default() -> Self {
        Self::new(ElevationSmootherConfig::default())
    }
}

fn push_bounded(buffer: &mut VecDeque<f64>, value: f64, capacity: usize) {
    buffer.push_back(value);
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}

fn trend_alpha(accepted: &[f64], adaptive: &AdaptiveAlpha) -> f64 {
    if accepted.len() < 3 {
        return adaptive.alpha_min;
    }

    let changes: Vec<f64> = accepted.windows(2).map(|w| w[1] - w[0]).collect();
    let rising = changes.iter().filter(|c| **c > 0.0).count();
    let falling = changes.iter().filter(|c| **c < 0.0).count();
    if rising + falling == 0 {
        return adaptive.alpha_min;
    }

    let trend_strength = rising.max(falling) as f64 / (rising + falling) as f64;
    let mean_magnitude = changes.iter().map(|c| c.abs()).sum::<f64>() / changes.len() as f64;
    let magnitude_boost = (mean_magnitude / 2.0).min(1.0);

    let strength = (trend_strength + magnitude_boost) / 2.0;
    let alpha = adaptive.alpha_min + strength * (adaptive.alpha_max - adaptive.alpha_min);
    alpha.clamp(adaptive.alpha_min, adaptive.alpha_max)
}
