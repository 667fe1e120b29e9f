//! Trip summary over a finished (or in-progress) fix sequence.
//!
//! One pass over consecutive pairs. Vertical totals are always reported in
//! feet; distance and per-direction average speed follow `use_metric`
//! (km and km/h, otherwise miles and mph). Everything accumulates in meters
//! and seconds and is converted once at the end.

use serde::Serialize;

use crate::classifier::Direction;
use crate::config::ThresholdConfig;
use crate::fix::{LocationFix, METERS_PER_MILE, METERS_TO_FEET, MPS_TO_KMH, MPS_TO_MPH};
use crate::track_analysis::pair_speed;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrackStats {
    pub vertical_feet_up: f64,
    pub vertical_feet_down: f64,
    /// km when metric, miles otherwise
    pub horizontal_distance: f64,
    /// km/h when metric, mph otherwise
    pub avg_downhill_pace: f64,
    pub avg_uphill_pace: f64,
    pub num_uphill_segments: u32,
    pub num_downhill_segments: u32,
    pub moving_time_seconds: f64,
}

/// Pairs at or below the default classifier `Idle` cutoff count as stationary.
pub fn calculate_stats(fixes: &[LocationFix], use_metric: bool) -> TrackStats {
    calculate_stats_with_idle_speed(
        fixes,
        use_metric,
        ThresholdConfig::default().idle_cutoff_mph(),
    )
}

#[derive(Debug, Default)]
struct DirectionTotals {
    distance_m: f64,
    seconds: f64,
}

impl DirectionTotals {
    fn average_speed(&self, use_metric: bool) -> f64 {
        if self.seconds <= 0.0 {
            return 0.0;
        }
        let mps = self.distance_m / self.seconds;
        if use_metric {
            mps * MPS_TO_KMH
        } else {
            mps * MPS_TO_MPH
        }
    }
}

pub fn calculate_stats_with_idle_speed(
    fixes: &[LocationFix],
    use_metric: bool,
    idle_speed_mph: f64,
) -> TrackStats {
    if fixes.len() < 2 {
        return TrackStats::default();
    }

    let idle_speed_mps = idle_speed_mph / MPS_TO_MPH;

    let mut gain_m = 0.0;
    let mut loss_m = 0.0;
    let mut distance_m = 0.0;
    let mut moving_seconds = 0.0;
    let mut uphill_segments = 0;
    let mut downhill_segments = 0;
    let mut run: Option<Direction> = None;
    let mut uphill = DirectionTotals::default();
    let mut downhill = DirectionTotals::default();

    for w in fixes.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);

        let delta = cur.altitude - prev.altitude;
        if delta > 0.0 {
            gain_m += delta;
            if run != Some(Direction::Uphill) {
                uphill_segments += 1;
                run = Some(Direction::Uphill);
            }
        } else if delta < 0.0 {
            loss_m += -delta;
            if run != Some(Direction::Downhill) {
                downhill_segments += 1;
                run = Some(Direction::Downhill);
            }
        }

        let step_m = prev.distance_to(cur);
        distance_m += step_m;

        let seconds = cur.seconds_since(prev);
        let speed = cur.speed.or_else(|| pair_speed(prev, cur));
        let moving = seconds > 0.0 && matches!(speed, Some(s) if s > idle_speed_mps);
        if !moving {
            continue;
        }

        moving_seconds += seconds;
        let totals = match run {
            Some(Direction::Uphill) => &mut uphill,
            Some(Direction::Downhill) => &mut downhill,
            None => continue,
        };
        totals.distance_m += step_m;
        totals.seconds += seconds;
    }

    let horizontal_distance = if use_metric {
        distance_m / 1000.0
    } else {
        distance_m / METERS_PER_MILE
    };

    TrackStats {
        vertical_feet_up: gain_m * METERS_TO_FEET,
        vertical_feet_down: loss_m * METERS_TO_FEET,
        horizontal_distance,
        avg_downhill_pace: downhill.average_speed(use_metric),
        avg_uphill_pace: uphill.average_speed(use_metric),
        num_uphill_segments: uphill_segments,
        num_downhill_segments: downhill_segments,
        moving_time_seconds: moving_seconds,
    }
}
