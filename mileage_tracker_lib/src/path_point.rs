use geo_types::Point;
use serde::{Deserialize, Serialize};

/// A raw sample from the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
        }
    }
}

/// An accepted fix, kept as part of the recorded path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
}

impl PathPoint {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
        }
    }

    /// Position as a `geo_types` point (x = longitude, y = latitude).
    pub fn position(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}

impl From<Fix> for PathPoint {
    fn from(fix: Fix) -> Self {
        Self::new(fix.latitude, fix.longitude, fix.accuracy_meters)
    }
}

pub const POOR_ACCURACY_METERS: f64 = 30.;
pub const MEDIUM_ACCURACY_METERS: f64 = 15.;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpsQuality {
    #[default]
    Good,
    Medium,
    Poor,
}

impl GpsQuality {
    pub fn from_accuracy(accuracy_meters: f64) -> Self {
        if accuracy_meters > POOR_ACCURACY_METERS || accuracy_meters.is_nan() {
            GpsQuality::Poor
        } else if accuracy_meters > MEDIUM_ACCURACY_METERS {
            GpsQuality::Medium
        } else {
            GpsQuality::Good
        }
    }
}
