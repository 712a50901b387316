use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{path_point::PathPoint, trip_record::TripType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Tracking,
}

/// Durable projection of an in-progress trip, used to resume after the
/// process is suspended or killed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub distance_miles: f64,
    pub path: Vec<PathPoint>,
    pub last_accepted_fix: Option<PathPoint>,
    pub trip_type: TripType,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(distance_miles: f64, path: Vec<PathPoint>, last_accepted_fix: Option<PathPoint>, trip_type: TripType) -> Self {
        Self {
            status: SessionStatus::Tracking,
            distance_miles,
            path,
            last_accepted_fix,
            trip_type,
            saved_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|err| format!("Failed to serialize snapshot: {err}"))
    }

    /// The fix to measure the next step from: the recorded one, else the path tail.
    pub fn resume_point(&self) -> Option<PathPoint> {
        self.last_accepted_fix.or_else(|| self.path.last().copied())
    }
}

impl TryFrom<&str> for SessionSnapshot {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        serde_json::from_str(value).map_err(|err| format!("Failed to deserialize snapshot: {err}"))
    }
}
