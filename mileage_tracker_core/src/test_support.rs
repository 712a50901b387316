//! Fakes for the collaborators, shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mileage_tracker_lib::geo_math::{EARTH_RADIUS_MILES, METERS_PER_MILE};

use crate::{
    geocoding::{GeocodeResponse, GeocodeResult, Geocoder, ResolutionError, STATUS_OK},
    storage::KeyValueStore,
    TrackerError,
};

/// Latitude `meters` north of `latitude`.
pub fn north_meters(latitude: f64, meters: f64) -> f64 {
    let meters_per_degree = EARTH_RADIUS_MILES * METERS_PER_MILE * std::f64::consts::PI / 180.;
    latitude + meters / meters_per_degree
}

pub fn result(formatted_address: &str, types: &[&str]) -> GeocodeResult {
    GeocodeResult {
        formatted_address: formatted_address.to_string(),
        types: types.iter().map(|t| t.to_string()).collect(),
    }
}

enum Script {
    Answer(String),
    Status(String),
    Offline,
}

/// Answers every lookup the same way and counts the calls.
pub struct ScriptedGeocoder {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedGeocoder {
    pub fn answering(formatted_address: &str) -> Self {
        Self::new(Script::Answer(formatted_address.to_string()))
    }

    pub fn status(status: &str) -> Self {
        Self::new(Script::Status(status.to_string()))
    }

    pub fn offline() -> Self {
        Self::new(Script::Offline)
    }

    fn new(script: Script) -> Self {
        Self { script, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for ScriptedGeocoder {
    async fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> Result<GeocodeResponse, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Answer(text) => Ok(GeocodeResponse {
                status: STATUS_OK.to_string(),
                results: vec![result(text, &["street_address"])],
            }),
            Script::Status(status) => Ok(GeocodeResponse { status: status.clone(), results: Vec::new() }),
            Script::Offline => Err(ResolutionError::Network("connection refused".into())),
        }
    }
}

/// A store whose disk is always full.
#[derive(Default)]
pub struct FailingStore {
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> TrackerError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        TrackerError::Storage("No space left on device".into())
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, TrackerError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), TrackerError> {
        Err(self.fail())
    }

    async fn remove(&self, _key: &str) -> Result<(), TrackerError> {
        Err(self.fail())
    }
}
