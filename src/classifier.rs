//! Activity classification from smoothed speed and direction of travel.
//!
//! `classify` is pure: the bucket depends only on the direction, the speed
//! (mph) and the thresholds. The interpolation factor tells the renderer how
//! far through the bucket's speed range the current speed sits.

use serde::Serialize;

use crate::config::ThresholdConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VelocityBucket {
    Idle,
    DownhillEasy,
    DownhillMedium,
    DownhillHard,
    UphillEasy,
    UphillMedium,
    UphillHard,
}

impl VelocityBucket {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            VelocityBucket::Idle => None,
            VelocityBucket::DownhillEasy
            | VelocityBucket::DownhillMedium
            | VelocityBucket::DownhillHard => Some(Direction::Downhill),
            VelocityBucket::UphillEasy | VelocityBucket::UphillMedium | VelocityBucket::UphillHard => {
                Some(Direction::Uphill)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Downhill,
    Uphill,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub bucket: VelocityBucket,
    /// Position inside the bucket's speed range, 0.0..=1.0
    pub interpolation: f64,
}

impl Classification {
    pub const IDLE: Classification = Classification {
        bucket: VelocityBucket::Idle,
        interpolation: 0.0,
    };
}

/// `direction` is `None` when there is no previous fix to compare against.
pub fn classify(
    speed_mph: f64,
    direction: Option<Direction>,
    thresholds: &ThresholdConfig,
) -> Classification {
    let Some(direction) = direction else {
        return Classification::IDLE;
    };

    let (easy, medium, hard, buckets) = match direction {
        Direction::Downhill => (
            thresholds.downhill_easy,
            thresholds.downhill_medium,
            thresholds.downhill_hard,
            [
                VelocityBucket::DownhillEasy,
                VelocityBucket::DownhillMedium,
                VelocityBucket::DownhillHard,
            ],
        ),
        Direction::Uphill => (
            thresholds.uphill_easy,
            thresholds.uphill_medium,
            thresholds.uphill_hard,
            [
                VelocityBucket::UphillEasy,
                VelocityBucket::UphillMedium,
                VelocityBucket::UphillHard,
            ],
        ),
    };

    // NaN speed falls through every comparison and lands here too
    if !(speed_mph > easy) {
        return Classification::IDLE;
    }

    if speed_mph >= hard {
        Classification {
            bucket: buckets[2],
            interpolation: 1.0,
        }
    } else if speed_mph >= medium {
        Classification {
            bucket: buckets[1],
            interpolation: tier_fraction(speed_mph, medium, hard),
        }
    } else {
        Classification {
            bucket: buckets[0],
            interpolation: tier_fraction(speed_mph, easy, medium),
        }
    }
}

fn tier_fraction(speed: f64, lower: f64, upper: f64) -> f64 {
    ((speed - lower) / (upper - lower)).clamp(0.0, 1.0)
}

/// Tracks uphill/downhill from consecutive smoothed altitudes.
/// A flat step keeps the previous direction.
#[derive(Debug, Clone, Default)]
pub struct DirectionTracker {
    last_altitude: Option<f64>,
    direction: Option<Direction>,
}

impl DirectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, altitude: f64) -> Option<Direction> {
        if let Some(previous) = self.last_altitude {
            let delta = altitude - previous;
            if delta > 0.0 {
                self.direction = Some(Direction::Uphill);
            } else if delta < 0.0 {
                self.direction = Some(Direction::Downhill);
            }
        }
        self.last_altitude = Some(altitude);
        self.direction
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
