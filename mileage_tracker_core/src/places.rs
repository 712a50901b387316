use std::sync::Arc;

use mileage_tracker_lib::{geo_math::meters_to_miles, place::SavedPlace};
use tokio::sync::RwLock;

use crate::{config::TrackerConfig, storage::KeyValueStore, TrackerError, SAVED_PLACES_KEY};

/// Places the user has named, persisted as one JSON list.
pub struct PlaceCache {
    store: Arc<dyn KeyValueStore>,
    places: RwLock<Vec<SavedPlace>>,
    match_radius_miles: f64,
    dedup_radius_miles: f64,
}

impl PlaceCache {
    pub async fn load(store: Arc<dyn KeyValueStore>, config: &TrackerConfig) -> Self {
        let places = match read_places(store.as_ref()).await {
            Ok(places) => places,
            Err(err) => {
                tracing::warn!("Starting with no saved places: {err}");
                Vec::new()
            }
        };
        tracing::debug!("Loaded {} saved places", places.len());

        Self {
            store,
            places: RwLock::new(places),
            match_radius_miles: meters_to_miles(config.place_match_radius_meters),
            dedup_radius_miles: meters_to_miles(config.place_dedup_radius_meters),
        }
    }

    /// Name of the first saved place within the match radius.
    pub async fn lookup(&self, latitude: f64, longitude: f64) -> Option<String> {
        self.places.read().await
            .iter()
            .find(|place| place.distance_miles_to(latitude, longitude) <= self.match_radius_miles)
            .map(|place| place.name.clone())
    }

    /// Learns a place. Returns false when the name is blank or the same name
    /// is already saved close by.
    pub async fn save(&self, latitude: f64, longitude: f64, name: &str) -> Result<bool, TrackerError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(false);
        }

        let mut places = self.places.write().await;

        // Start from the durable list so entries learned elsewhere are kept
        let mut current = read_places(self.store.as_ref()).await?;

        let duplicate = current.iter().any(|place| {
            place.name == name && place.distance_miles_to(latitude, longitude) < self.dedup_radius_miles
        });
        if duplicate {
            *places = current;
            return Ok(false);
        }

        current.push(SavedPlace::new(latitude, longitude, name.to_string()));

        let json = serde_json::to_string(&current)
            .map_err(|err| TrackerError::Serialization(format!("Failed to serialize places: {err}")))?;
        self.store.set(SAVED_PLACES_KEY, &json).await?;

        tracing::info!("Learned new place: {}", name);
        *places = current;
        Ok(true)
    }

    pub async fn places(&self) -> Vec<SavedPlace> {
        self.places.read().await.clone()
    }
}

async fn read_places(store: &dyn KeyValueStore) -> Result<Vec<SavedPlace>, TrackerError> {
    match store.get(SAVED_PLACES_KEY).await? {
        Some(json) => serde_json::from_str(&json)
            .map_err(|err| TrackerError::Serialization(format!("Failed to deserialize places: {err}"))),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use crate::{storage::MemoryStore, test_support::north_meters};

    use super::*;

    const HOME: (f64, f64) = (18.4655, -66.1057);

    async fn cache(store: Arc<MemoryStore>) -> PlaceCache {
        PlaceCache::load(store, &TrackerConfig::default()).await
    }

    #[tokio::test]
    async fn duplicate_nearby_name_is_stored_once() {
        let store = Arc::new(MemoryStore::new());
        let places = cache(store.clone()).await;

        assert!(places.save(HOME.0, HOME.1, "Home").await.unwrap());
        assert!(!places.save(north_meters(HOME.0, 10.), HOME.1, " Home ").await.unwrap());

        assert_eq!(places.places().await.len(), 1);
        let reloaded = cache(store).await;
        assert_eq!(reloaded.places().await.len(), 1);
    }

    #[tokio::test]
    async fn same_name_far_away_is_a_new_place() {
        let places = cache(Arc::new(MemoryStore::new())).await;
        assert!(places.save(HOME.0, HOME.1, "Office").await.unwrap());
        assert!(places.save(north_meters(HOME.0, 30.), HOME.1, "Office").await.unwrap());
        assert!(places.save(HOME.0, HOME.1, "Home").await.unwrap());
        assert_eq!(places.places().await.len(), 3);
    }

    #[tokio::test]
    async fn lookup_radius() {
        let places = cache(Arc::new(MemoryStore::new())).await;
        places.save(HOME.0, HOME.1, "Home").await.unwrap();

        assert_eq!(places.lookup(north_meters(HOME.0, 40.), HOME.1).await.as_deref(), Some("Home"));
        assert_eq!(places.lookup(north_meters(HOME.0, 60.), HOME.1).await, None);
    }

    #[tokio::test]
    async fn blank_names_are_not_saved() {
        let store = Arc::new(MemoryStore::new());
        let places = cache(store.clone()).await;
        assert!(!places.save(HOME.0, HOME.1, "   ").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_list_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(SAVED_PLACES_KEY, "{oops").await.unwrap();
        let places = cache(store).await;
        assert!(places.places().await.is_empty());
    }
}
