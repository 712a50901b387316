use serde::{Deserialize, Serialize};

use crate::geo_math::haversine_miles;

/// A location the user has named, used to personalize resolved addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPlace {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
}

impl SavedPlace {
    pub fn new(latitude: f64, longitude: f64, name: String) -> Self {
        Self {
            latitude,
            longitude,
            name,
        }
    }

    pub fn distance_miles_to(&self, latitude: f64, longitude: f64) -> f64 {
        haversine_miles(self.latitude, self.longitude, latitude, longitude)
    }
}
