use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path_point::PathPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripType {
    #[default]
    Work,
    Personal,
}

impl fmt::Display for TripType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripType::Work => write!(f, "work"),
            TripType::Personal => write!(f, "personal"),
        }
    }
}

impl FromStr for TripType {
    type Err = String;

    // Also accepts the Spanish labels older records were written with
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "work" | "trabajo" => Ok(TripType::Work),
            "personal" => Ok(TripType::Personal),
            other => Err(format!("Unknown trip type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub formatted: String,
    pub latitude: f64,
    pub longitude: f64,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedAddress {
    pub fn new(formatted: String, latitude: f64, longitude: f64) -> Self {
        Self {
            formatted,
            latitude,
            longitude,
            resolved_at: Utc::now(),
        }
    }
}

/// The finalized trip handed to the surrounding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub distance_miles: f64,
    pub path: Vec<PathPoint>,
    pub trip_type: TripType,
    pub start_address: Option<ResolvedAddress>,
    pub end_address: Option<ResolvedAddress>,
    /// True when at least one fix was accepted, i.e. the distance came from GPS
    pub gps_used: bool,
}

impl TripRecord {
    pub fn start_text(&self) -> Option<&str> {
        self.start_address.as_ref().map(|address| address.formatted.as_str())
    }

    pub fn end_text(&self) -> Option<&str> {
        self.end_address.as_ref().map(|address| address.formatted.as_str())
    }
}
