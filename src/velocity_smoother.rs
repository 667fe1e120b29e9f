//! Streaming speed smoother: spike rejection followed by an EMA.
//!
//! Call `add_reading` once per fix, in order. A reading is treated as a spike
//! only when it is both physically implausible (`> absolute_max_value`) and a
//! large jump (`> spike_multiplier * previous`); spikes are replaced by the
//! previous accepted reading. Readings below `min_value_threshold` skip the EMA
//! so a stop shows up immediately.

use tracing::debug;

use crate::config::VelocitySmootherConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmootherState {
    pub last_raw: f64,
    pub last_smoothed: f64,
}

#[derive(Debug, Clone)]
pub struct VelocitySmoother {
    config: VelocitySmootherConfig,
    state: Option<SmootherState>,
}

impl VelocitySmoother {
    pub fn new(config: VelocitySmootherConfig) -> Self {
        VelocitySmoother { config, state: None }
    }

    pub fn add_reading(&mut self, raw: f64) -> f64 {
        let Some(prev) = self.state else {
            self.state = Some(SmootherState {
                last_raw: raw,
                last_smoothed: raw,
            });
            return raw;
        };

        let accepted = if self.is_spike(raw, prev.last_raw) {
            debug!(raw, previous = prev.last_raw, "rejected speed spike");
            prev.last_raw
        } else {
            raw
        };

        let smoothed = if accepted < self.config.min_value_threshold {
            accepted
        } else {
            self.config.alpha * accepted + (1.0 - self.config.alpha) * prev.last_smoothed
        };

        self.state = Some(SmootherState {
            last_raw: accepted,
            last_smoothed: smoothed,
        });
        smoothed
    }

    fn is_spike(&self, raw: f64, previous_raw: f64) -> bool {
        raw > self.config.absolute_max_value && raw > self.config.spike_multiplier * previous_raw
    }

    pub fn reset(&mut self) {
        self.state = None;
    }

    pub fn state(&self) -> Option<SmootherState> {
        self.state
    }
}

impl Default for VelocitySmoother {
    fn default() -> Self {
        Self::new(VelocitySmootherConfig::default())
    }
}
