//! GPS fix model and the distance/unit helpers every stage shares

use chrono::{DateTime, Utc};
use geo::{point, Point};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const METERS_TO_FEET: f64 = 3.28084;
pub const MPS_TO_MPH: f64 = 2.23694;
pub const MPS_TO_KMH: f64 = 3.6;
pub const METERS_PER_MILE: f64 = 1609.344;

/// One GPS observation. `x` of `position` is longitude, `y` is latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub position: Point<f64>,
    /// meters
    pub altitude: f64,
    /// m/s, `None` when the provider did not report it
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// meters
    pub horizontal_accuracy: Option<f64>,
    /// meters
    pub vertical_accuracy: Option<f64>,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, altitude: f64, timestamp: DateTime<Utc>) -> Self {
        LocationFix {
            position: point!(x: longitude, y: latitude),
            altitude,
            speed: None,
            timestamp,
            horizontal_accuracy: None,
            vertical_accuracy: None,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        // Providers report negative speed when unknown
        self.speed = if speed_mps >= 0.0 { Some(speed_mps) } else { None };
        self
    }

    pub fn with_accuracy(mut self, horizontal: Option<f64>, vertical: Option<f64>) -> Self {
        self.horizontal_accuracy = horizontal.filter(|a| *a >= 0.0);
        self.vertical_accuracy = vertical.filter(|a| *a >= 0.0);
        self
    }

    pub fn latitude(&self) -> f64 {
        self.position.y()
    }

    pub fn longitude(&self) -> f64 {
        self.position.x()
    }

    pub fn distance_to(&self, other: &LocationFix) -> f64 {
        haversine_distance(self.position, other.position)
    }

    /// Seconds elapsed since `earlier`; negative if the stream went backwards.
    pub fn seconds_since(&self, earlier: &LocationFix) -> f64 {
        let delta = self.timestamp.signed_duration_since(earlier.timestamp);
        delta.num_milliseconds() as f64 / 1000.0
    }
}

/// Great-circle distance in meters on a sphere of radius `EARTH_RADIUS_M`.
pub fn haversine_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    let phi1 = a.y().to_radians();
    let phi2 = b.y().to_radians();
    let d_phi = (b.y() - a.y()).to_radians();
    let d_lambda = (b.x() - a.x()).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_haversine_latitude_step() {
        let a = point!(x: -122.4194, y: 37.7749);
        let b = point!(x: -122.4194, y: 37.7759);
        let d = haversine_distance(a, b);
        assert!((d - 111.19).abs() < 0.1, "got {}", d);
        assert_eq!(haversine_distance(a, a), 0.0);
    }

    #[test]
    fn test_negative_speed_is_unknown() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let fix = LocationFix::new(1.0, 2.0, 3.0, t).with_speed(-1.0);
        assert_eq!(fix.speed, None);
        assert_eq!(fix.latitude(), 1.0);
        assert_eq!(fix.longitude(), 2.0);

        let fix = fix.with_accuracy(Some(-1.0), Some(4.0));
        assert_eq!(fix.horizontal_accuracy, None);
        assert_eq!(fix.vertical_accuracy, Some(4.0));
    }
}
