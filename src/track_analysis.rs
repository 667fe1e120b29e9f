//! Offline helpers over a recorded fix sequence: speeds derived from position,
//! loop (return-to-start) detection and fixed-interval time interpolation.

use chrono::Duration;
use tracing::debug;

use crate::error::{TrackError, TrackResult};
use crate::fix::LocationFix;

pub const DEFAULT_LOOP_RADIUS_M: f64 = 50.0;
pub const DEFAULT_LOOP_SKIP_POINTS: usize = 10;
pub const DEFAULT_INTERPOLATION_SECONDS: i64 = 10;

/// Ground speed in m/s between two fixes, `None` when no time elapsed.
pub fn pair_speed(prev: &LocationFix, cur: &LocationFix) -> Option<f64> {
    let seconds = cur.seconds_since(prev);
    if seconds > 0.0 {
        Some(prev.distance_to(cur) / seconds)
    } else {
        None
    }
}

/// Speed of each fix relative to its predecessor (m/s). The first entry is always `None`.
pub fn derived_speeds(fixes: &[LocationFix]) -> Vec<Option<f64>> {
    let mut speeds = Vec::with_capacity(fixes.len());
    if fixes.is_empty() {
        return speeds;
    }

    speeds.push(None);
    for w in fixes.windows(2) {
        speeds.push(pair_speed(&w[0], &w[1]));
    }
    speeds
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartReturn {
    pub index: usize,
    pub distance_m: f64,
    pub seconds_since_start: f64,
}

/// Fixes that come back within `radius_m` of the first fix, ignoring the first `skip_points`.
pub fn returns_to_start(fixes: &[LocationFix], radius_m: f64, skip_points: usize) -> Vec<StartReturn> {
    let Some(start) = fixes.first() else {
        return Vec::new();
    };

    fixes
        .iter()
        .enumerate()
        .skip(skip_points.saturating_add(1))
        .filter_map(|(index, fix)| {
            let distance_m = start.distance_to(fix);
            (distance_m < radius_m).then(|| StartReturn {
                index,
                distance_m,
                seconds_since_start: fix.seconds_since(start),
            })
        })
        .collect()
}

/// Inserts linearly interpolated fixes so consecutive fixes are at most
/// `interval` apart. Original fixes are kept unchanged.
pub fn interpolate_track(fixes: &[LocationFix], interval: Duration) -> TrackResult<Vec<LocationFix>> {
    if interval <= Duration::zero() {
        return Err(TrackError::Config(format!(
            "interpolation interval must be positive, got {}s",
            interval.num_seconds()
        )));
    }

    let mut result = Vec::with_capacity(fixes.len());
    let interval_ms = interval.num_milliseconds() as f64;

    for w in fixes.windows(2) {
        let (p1, p2) = (&w[0], &w[1]);
        result.push(*p1);

        let gap = p2.timestamp.signed_duration_since(p1.timestamp);
        if gap <= interval {
            continue;
        }

        let gap_ms = gap.num_milliseconds() as f64;
        let mut current = p1.timestamp + interval;
        let mut step = 1.0;
        while current < p2.timestamp {
            let t = step * interval_ms / gap_ms;
            let fix = LocationFix::new(
                p1.latitude() + (p2.latitude() - p1.latitude()) * t,
                p1.longitude() + (p2.longitude() - p1.longitude()) * t,
                p1.altitude + (p2.altitude - p1.altitude) * t,
                current,
            );
            result.push(fix);

            current = current + interval;
            step += 1.0;
        }
    }

    if let Some(last) = fixes.last() {
        result.push(*last);
    }

    debug!(
        original = fixes.len(),
        interpolated = result.len(),
        "interpolated track"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn fix(lat: f64, seconds: i64) -> LocationFix {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds);
        LocationFix::new(lat, -122.0, 100.0 + seconds as f64, t)
    }

    #[test]
    fn test_derived_speeds() {
        let fixes = vec![fix(37.0, 0), fix(37.001, 10), fix(37.001, 10)];
        let speeds = derived_speeds(&fixes);
        assert_eq!(speeds.len(), 3);
        assert_eq!(speeds[0], None);
        assert!((speeds[1].unwrap() - 11.119).abs() < 0.01);
        // duplicate timestamp
        assert_eq!(speeds[2], None);
        assert!(derived_speeds(&[]).is_empty());
    }

    #[test]
    fn test_returns_to_start() {
        let mut fixes: Vec<LocationFix> = (0..12).map(|i| fix(37.0 + i as f64 * 0.001, i)).collect();
        fixes.push(fix(37.0001, 12));
        fixes.push(fix(37.01, 13));

        let returns = returns_to_start(&fixes, DEFAULT_LOOP_RADIUS_M, DEFAULT_LOOP_SKIP_POINTS);
        assert_eq!(returns.len(), 1);
        assert_eq!(returns[0].index, 12);
        assert!(returns[0].distance_m < 12.0);
        assert_eq!(returns[0].seconds_since_start, 12.0);
    }

    #[test]
    fn test_interpolation_fills_gaps() {
        let fixes = vec![fix(37.0, 0), fix(37.003, 30), fix(37.0031, 35)];
        let out = interpolate_track(&fixes, Duration::seconds(10)).unwrap();

        // 0, 10, 20, 30, 35
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], fixes[0]);
        assert!((out[1].latitude() - 37.001).abs() < 1e-9);
        assert!((out[2].altitude - 120.0).abs() < 1e-9);
        assert_eq!(out[3], fixes[1]);
        assert_eq!(out[4], fixes[2]);
    }

    #[test]
    fn test_interpolation_rejects_bad_interval() {
        assert!(interpolate_track(&[fix(37.0, 0)], Duration::zero()).is_err());
        assert_eq!(interpolate_track(&[], Duration::seconds(10)).unwrap().len(), 0);
    }
}
