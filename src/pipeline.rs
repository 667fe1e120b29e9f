//! Per-fix live pipeline and the batch chart smoothing built from the same stages.
//!
//! `LivePipeline` owns one velocity smoother, one elevation smoother, the
//! direction tracker and (optionally) the GPX recorder for a session. It takes
//! `&mut self` per fix, so callers sharing it across threads wrap it in a
//! mutex and feed fixes in arrival order.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::classifier::{classify, Classification, DirectionTracker};
use crate::config::PipelineConfig;
use crate::elevation_smoother::ElevationSmoother;
use crate::error::{TrackError, TrackResult};
use crate::fix::{LocationFix, MPS_TO_KMH, MPS_TO_MPH};
use crate::gpx_codec::GpxTrackWriter;
use crate::moving_average::moving_average;
use crate::outlier_filter::{remove_outliers, OutlierConfig};
use crate::track_analysis::{derived_speeds, pair_speed};
use crate::track_stats::{calculate_stats_with_idle_speed, TrackStats};
use crate::velocity_smoother::VelocitySmoother;

#[derive(Debug)]
pub struct FixOutput {
    /// The incoming fix with smoothed altitude and speed (m/s); speed stays
    /// `None` until a reading is known
    pub smoothed_fix: LocationFix,
    /// 0.0 while no speed is known yet
    pub smoothed_speed_mph: f64,
    pub classification: Classification,
    /// Set when the fix could not be appended to the track file
    pub write_error: Option<TrackError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsSource {
    Raw,
    Smoothed,
}

#[derive(Debug)]
pub struct LivePipeline {
    config: PipelineConfig,
    velocity: VelocitySmoother,
    elevation: ElevationSmoother,
    direction: DirectionTracker,
    recorder: Option<GpxTrackWriter>,
    raw_fixes: Vec<LocationFix>,
    smoothed_fixes: Vec<LocationFix>,
}

impl LivePipeline {
    pub fn new(config: PipelineConfig) -> TrackResult<Self> {
        config.validate()?;
        Ok(LivePipeline {
            velocity: VelocitySmoother::new(config.velocity),
            elevation: ElevationSmoother::new(config.elevation),
            direction: DirectionTracker::new(),
            recorder: None,
            raw_fixes: Vec::new(),
            smoothed_fixes: Vec::new(),
            config,
        })
    }

    /// Starts a fresh track file; every later fix is appended to it.
    pub fn start_recording(&mut self, path: impl Into<PathBuf>) -> TrackResult<()> {
        let writer = GpxTrackWriter::new(path, self.config.creator.clone());
        writer.start_new_track()?;
        self.recorder = Some(writer);
        Ok(())
    }

    pub fn process_fix(&mut self, fix: LocationFix) -> FixOutput {
        let reading_mph = fix
            .speed
            .or_else(|| self.raw_fixes.last().and_then(|prev| pair_speed(prev, &fix)))
            .map(|mps| mps * MPS_TO_MPH);

        // an unknown speed leaves the smoother untouched
        let smoothed_mph = match reading_mph {
            Some(mph) => Some(self.velocity.add_reading(mph)),
            None => self.velocity.state().map(|state| state.last_smoothed),
        };
        let smoothed_speed_mph = smoothed_mph.unwrap_or(0.0);
        let altitude = self.elevation.add_reading(fix.altitude, fix.vertical_accuracy);
        let direction = self.direction.update(altitude);
        let classification = classify(smoothed_speed_mph, direction, &self.config.thresholds);

        let smoothed_fix = LocationFix {
            altitude,
            speed: smoothed_mph.map(|mph| mph / MPS_TO_MPH),
            ..fix
        };
        self.raw_fixes.push(fix);
        self.smoothed_fixes.push(smoothed_fix);

        let write_error = self
            .recorder
            .as_ref()
            .and_then(|writer| writer.append_point(&fix).err());
        if let Some(e) = &write_error {
            warn!(error = %e, "could not append fix to track, continuing");
        }

        FixOutput {
            smoothed_fix,
            smoothed_speed_mph,
            classification,
            write_error,
        }
    }

    pub fn stats(&self, source: StatsSource) -> TrackStats {
        let fixes = match source {
            StatsSource::Raw => &self.raw_fixes,
            StatsSource::Smoothed => &self.smoothed_fixes,
        };
        calculate_stats_with_idle_speed(
            fixes,
            self.config.use_metric,
            self.config.thresholds.idle_cutoff_mph(),
        )
    }

    /// Closes the track file, if recording.
    pub fn finish(&self) -> TrackResult<()> {
        match &self.recorder {
            Some(writer) => writer.finalize_track(),
            None => Ok(()),
        }
    }

    /// Clears smoother state and buffers; a recording restarts from an empty track.
    pub fn reset(&mut self) -> TrackResult<()> {
        self.velocity.reset();
        self.elevation.reset();
        self.direction.reset();
        self.raw_fixes.clear();
        self.smoothed_fixes.clear();
        info!("pipeline reset");

        match &self.recorder {
            Some(writer) => writer.start_new_track(),
            None => Ok(()),
        }
    }

    pub fn raw_fixes(&self) -> &[LocationFix] {
        &self.raw_fixes
    }

    pub fn smoothed_fixes(&self) -> &[LocationFix] {
        &self.smoothed_fixes
    }

    pub fn recorder(&self) -> Option<&GpxTrackWriter> {
        self.recorder.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartConfig {
    pub outlier: OutlierConfig,
    pub window_size: i64,
}

impl Default for ChartConfig {
    fn default() -> Self {
        ChartConfig {
            outlier: OutlierConfig::default(),
            window_size: 5,
        }
    }
}

/// Outlier replacement followed by a centered moving average.
pub fn smooth_series(values: &[Option<f64>], config: &ChartConfig) -> Vec<Option<f64>> {
    let cleaned = remove_outliers(values, &config.outlier);
    moving_average(&cleaned, config.window_size)
}

/// Chart-ready speeds (mph, or km/h when metric) derived from positions.
pub fn speed_chart(fixes: &[LocationFix], use_metric: bool, config: &ChartConfig) -> Vec<Option<f64>> {
    let factor = if use_metric { MPS_TO_KMH } else { MPS_TO_MPH };
    let speeds: Vec<Option<f64>> = derived_speeds(fixes)
        .into_iter()
        .map(|s| s.map(|mps| mps * factor))
        .collect();
    smooth_series(&speeds, config)
}

pub fn elevation_chart(fixes: &[LocationFix], config: &ChartConfig) -> Vec<Option<f64>> {
    let altitudes: Vec<Option<f64>> = fixes.iter().map(|f| Some(f.altitude)).collect();
    smooth_series(&altitudes, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::VelocityBucket;
    use crate::track_stats::calculate_stats;
    use chrono::{Duration, TimeZone, Utc};

    fn fix(lat: f64, altitude: f64, seconds: i64, speed_mps: f64) -> LocationFix {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds);
        LocationFix::new(lat, -122.0, altitude, t).with_speed(speed_mps)
    }

    #[test]
    fn test_first_fix_is_idle_and_unsmoothed() {
        let mut pipeline = LivePipeline::new(PipelineConfig::default()).unwrap();
        let out = pipeline.process_fix(fix(37.0, 100.0, 0, 5.0));

        assert_eq!(out.classification, Classification::IDLE);
        assert_eq!(out.smoothed_fix.altitude, 100.0);
        assert!((out.smoothed_speed_mph - 5.0 * MPS_TO_MPH).abs() < 1e-9);
        assert!(out.write_error.is_none());
    }

    #[test]
    fn test_descent_classified_downhill() {
        let mut pipeline = LivePipeline::new(PipelineConfig::default()).unwrap();
        let mut last = None;
        for i in 0..10 {
            // 6 m/s ~ 13.4 mph, dropping 2 m per second
            let out = pipeline.process_fix(fix(37.0 + i as f64 * 0.00005, 500.0 - 2.0 * i as f64, i, 6.0));
            last = Some(out);
        }
        let out = last.unwrap();
        assert_eq!(out.classification.bucket, VelocityBucket::DownhillMedium);
        assert!(out.classification.interpolation > 0.0 && out.classification.interpolation < 1.0);
        assert_eq!(pipeline.raw_fixes().len(), 10);
        assert_eq!(pipeline.smoothed_fixes().len(), 10);
    }

    #[test]
    fn test_missing_speed_is_derived_from_position() {
        let mut pipeline = LivePipeline::new(PipelineConfig::default()).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        pipeline.process_fix(LocationFix::new(37.0, -122.0, 100.0, t0));
        let out = pipeline.process_fix(LocationFix::new(37.0001, -122.0, 101.0, t0 + Duration::seconds(1)));
        // the derived 11.1 m/s is the first reading, so nothing drags it down
        assert!((out.smoothed_speed_mph - 11.1195 * MPS_TO_MPH).abs() < 0.05);
    }

    #[test]
    fn test_unknown_first_speed_not_reported() {
        let mut pipeline = LivePipeline::new(PipelineConfig::default()).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let out = pipeline.process_fix(LocationFix::new(37.0, -122.0, 100.0, t0));

        assert_eq!(out.smoothed_fix.speed, None);
        assert_eq!(out.smoothed_speed_mph, 0.0);
        assert_eq!(out.classification, Classification::IDLE);
    }

    #[test]
    fn test_stats_agree_with_direct_calculation() {
        let mut pipeline = LivePipeline::new(PipelineConfig::default()).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        // crawling at about 0.75 mph, no reported speed
        let fixes: Vec<LocationFix> = (0..6)
            .map(|i| {
                LocationFix::new(37.0 + i as f64 * 0.00003, -122.0, 100.0 + i as f64, t0 + Duration::seconds(i * 10))
            })
            .collect();
        for fix in &fixes {
            pipeline.process_fix(*fix);
        }

        let direct = calculate_stats(&fixes, false);
        assert_eq!(pipeline.stats(StatsSource::Raw), direct);
        assert_eq!(direct.moving_time_seconds, 0.0);
    }

    #[test]
    fn test_stats_from_both_buffers() {
        let mut config = PipelineConfig::default();
        config.use_metric = true;
        let mut pipeline = LivePipeline::new(config).unwrap();
        for i in 0..5 {
            pipeline.process_fix(fix(37.0 + i as f64 * 0.001, 100.0 + 10.0 * i as f64, i * 10, 11.0));
        }

        let raw = pipeline.stats(StatsSource::Raw);
        let smoothed = pipeline.stats(StatsSource::Smoothed);
        assert!((raw.vertical_feet_up - 40.0 * 3.28084).abs() < 1e-6);
        // the slow EMA lags behind the climb
        assert!(smoothed.vertical_feet_up < raw.vertical_feet_up);
        assert!((raw.horizontal_distance - smoothed.horizontal_distance).abs() < 1e-12);
        assert!(raw.moving_time_seconds > 0.0);
    }

    #[test]
    fn test_write_failure_does_not_disturb_pipeline() {
        let path = std::env::temp_dir().join(format!("rust_gpx_tracker_pipeline_{}.gpx", std::process::id()));
        let mut pipeline = LivePipeline::new(PipelineConfig::default()).unwrap();
        pipeline.start_recording(&path).unwrap();
        pipeline.process_fix(fix(37.0, 100.0, 0, 2.0));

        // the file disappears underneath the recorder
        std::fs::remove_file(&path).unwrap();
        let out = pipeline.process_fix(fix(37.0001, 99.0, 1, 2.0));
        assert!(matches!(out.write_error, Some(TrackError::Io(_))));
        assert_eq!(pipeline.raw_fixes().len(), 2);

        pipeline.reset().unwrap();
        assert!(pipeline.raw_fixes().is_empty());
        pipeline.process_fix(fix(37.0, 100.0, 0, 2.0));
        pipeline.finish().unwrap();
        let recorded = pipeline.recorder().unwrap().read_track().unwrap();
        assert_eq!(recorded.len(), 1);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.thresholds.downhill_medium = config.thresholds.downhill_easy;
        assert!(matches!(LivePipeline::new(config), Err(TrackError::Config(_))));
    }

    #[test]
    fn test_elevation_chart_drops_spike() {
        let mut altitudes = vec![100.0; 12];
        altitudes[6] = 400.0;
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let fixes: Vec<LocationFix> = altitudes
            .iter()
            .enumerate()
            .map(|(i, a)| LocationFix::new(37.0, -122.0, *a, t0 + Duration::seconds(i as i64)))
            .collect();

        let chart = elevation_chart(&fixes, &ChartConfig::default());
        assert_eq!(chart.len(), fixes.len());
        assert!(chart.iter().all(|v| (v.unwrap() - 100.0).abs() < 1e-9));

        let speeds = speed_chart(&fixes, false, &ChartConfig::default());
        assert_eq!(speeds[0], None);
        assert_eq!(speeds[1], Some(0.0));
    }
}
