//! GPS fix processing for outdoor activity tracking.
//!
//! Streaming stages (`VelocitySmoother`, `ElevationSmoother`, `classify`) run
//! once per incoming fix; batch stages (`remove_outliers`, `moving_average`,
//! `calculate_stats`, `gpx_codec::parse`) work on a finished sequence.

pub mod classifier;
pub mod config;
pub mod elevation_smoother;
pub mod error;
pub mod fix;
pub mod gpx_codec;
pub mod moving_average;
pub mod outlier_filter;
pub mod pipeline;
pub mod track_analysis;
pub mod track_stats;
pub mod velocity_smoother;

pub use classifier::{classify, Classification, Direction, DirectionTracker, VelocityBucket};
pub use config::{
    AdaptiveAlpha, ElevationSmootherConfig, PipelineConfig, ThresholdConfig, VelocitySmootherConfig,
};
pub use elevation_smoother::ElevationSmoother;
pub use error::{TrackError, TrackResult};
pub use fix::{haversine_distance, LocationFix};
pub use gpx_codec::GpxTrackWriter;
pub use moving_average::moving_average;
pub use outlier_filter::{remove_outliers, OutlierConfig};
pub use pipeline::{ChartConfig, FixOutput, LivePipeline, StatsSource};
pub use track_stats::{calculate_stats, TrackStats};
pub use velocity_smoother::VelocitySmoother;
