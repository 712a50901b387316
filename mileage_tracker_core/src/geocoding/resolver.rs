use std::sync::Arc;

use mileage_tracker_lib::trip_record::ResolvedAddress;

use crate::places::PlaceCache;

use super::{GeocodeResult, Geocoder, ResolutionError, STATUS_OK};

/// Grid-cell results that are never a useful address.
const PLUS_CODE: &str = "plus_code";
const SPECIFIC_TYPES: [&str; 5] = ["street_address", "route", "intersection", "point_of_interest", "establishment"];
const AREA_TYPES: [&str; 2] = ["neighborhood", "locality"];

/// Turns a coordinate into a readable address, preferring the user's own
/// name for the place when one is saved nearby.
pub struct AddressResolver {
    geocoder: Arc<dyn Geocoder>,
    places: Arc<PlaceCache>,
}

impl AddressResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, places: Arc<PlaceCache>) -> Self {
        Self { geocoder, places }
    }

    pub async fn resolve(&self, latitude: f64, longitude: f64) -> Result<ResolvedAddress, ResolutionError> {
        let response = self.geocoder.reverse_geocode(latitude, longitude).await?;

        if response.status != STATUS_OK {
            return Err(ResolutionError::Status(response.status));
        }
        let Some(formatted) = select_address(&response.results) else {
            return Err(ResolutionError::Status("ZERO_RESULTS".into()));
        };

        let formatted = match self.places.lookup(latitude, longitude).await {
            Some(name) => name,
            None => formatted.to_string(),
        };

        Ok(ResolvedAddress::new(formatted, latitude, longitude))
    }
}

/// Picks the most specific formatted address: a street-level result first,
/// then a neighborhood or locality, then whatever the service ranked first.
pub fn select_address(results: &[GeocodeResult]) -> Option<&str> {
    let specific = results.iter().find(|result| {
        !result.has_type(PLUS_CODE) && SPECIFIC_TYPES.iter().any(|tag| result.has_type(tag))
    });
    let area = || results.iter().find(|result| AREA_TYPES.iter().any(|tag| result.has_type(tag)));

    specific
        .or_else(area)
        .or_else(|| results.first())
        .map(|result| result.formatted_address.as_str())
}
