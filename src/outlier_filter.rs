//! MAD-based outlier replacement for whole series (chart smoothing, bulk cleanup).
//!
//! Two passes: global median/MAD over the "movement" values, then each flagged
//! value is replaced by the median of its valid neighbours. Values under
//! `min_value_threshold` are left alone so stationary stretches survive, and
//! they are also kept out of the statistics.

use tracing::debug;

/// Scales MAD to a standard deviation for normally distributed data
pub const MAD_TO_SIGMA: f64 = 1.4826;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierConfig {
    pub mad_multiplier: f64,
    pub absolute_max_value: Option<f64>,
    pub min_value_threshold: Option<f64>,
    pub replacement_window_radius: usize,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        OutlierConfig {
            mad_multiplier: 3.0,
            absolute_max_value: None,
            min_value_threshold: None,
            replacement_window_radius: 5,
        }
    }
}

impl OutlierConfig {
    fn is_stationary(&self, value: f64) -> bool {
        matches!(self.min_value_threshold, Some(min) if value < min)
    }
}

pub fn remove_outliers(values: &[Option<f64>], config: &OutlierConfig) -> Vec<Option<f64>> {
    let movement: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| !config.is_stationary(*v))
        .collect();

    if movement.is_empty() {
        return values.to_vec();
    }

    let center = median(&movement);
    let mad = median_absolute_deviation(&movement, center);
    let threshold = center + config.mad_multiplier * mad * MAD_TO_SIGMA;

    let flagged: Vec<bool> = values
        .iter()
        .map(|value| match value {
            None => false,
            Some(v) if config.is_stationary(*v) => false,
            Some(v) => {
                *v > threshold || matches!(config.absolute_max_value, Some(max) if *v > max)
            }
        })
        .collect();

    let radius = config.replacement_window_radius;
    let mut result = values.to_vec();
    let mut replaced = 0;

    for (i, is_outlier) in flagged.iter().enumerate() {
        if !is_outlier {
            continue;
        }

        let start = i.saturating_sub(radius);
        let end = (i + radius).min(values.len() - 1);
        let neighbours: Vec<f64> = (start..=end)
            .filter(|&j| j != i && !flagged[j])
            .filter_map(|j| values[j])
            .collect();

        result[i] = Some(if neighbours.is_empty() {
            center
        } else {
            median(&neighbours)
        });
        replaced += 1;
    }

    if replaced > 0 {
        debug!(
            replaced,
            median = center,
            mad,
            threshold,
            "replaced outliers"
        );
    }

    result
}

/// Median of an unsorted slice; 0.0 for an empty one.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn median_absolute_deviation(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}
