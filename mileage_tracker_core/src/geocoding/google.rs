//! Reverse geocoding through the Google Maps Geocoding API.

use async_trait::async_trait;
use reqwest::Client;

use crate::{config::TrackerConfig, TrackerError};

use super::{GeocodeResponse, Geocoder, ResolutionError};

const GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

pub struct GoogleGeocoder {
    client: Client,
    api_key: String,
    language: String,
    endpoint: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: String, language: String, config: &TrackerConfig) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .timeout(config.geocoding_timeout())
            .build()
            .map_err(|err| TrackerError::Config(format!("Failed to create HTTP client: {err}")))?;

        Ok(Self {
            client,
            api_key,
            language,
            endpoint: GEOCODE_ENDPOINT.to_string(),
        })
    }

    /// `None` when the config carries no API key.
    pub fn from_config(config: &TrackerConfig) -> Result<Option<Self>, TrackerError> {
        match &config.geocoding_api_key {
            Some(key) => Self::new(key.clone(), config.geocoding_language.clone(), config).map(Some),
            None => Ok(None),
        }
    }

    /// Points the client at another server speaking the same protocol.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<GeocodeResponse, ResolutionError> {
        let latlng = format!("{latitude},{longitude}");

        let response = self.client
            .get(&self.endpoint)
            .query(&[("latlng", latlng.as_str()), ("key", self.api_key.as_str()), ("language", self.language.as_str())])
            .send()
            .await
            .map_err(|err| ResolutionError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolutionError::Status(format!("HTTP {}", response.status())));
        }

        response
            .json::<GeocodeResponse>()
            .await
            .map_err(|err| ResolutionError::Network(format!("Malformed response: {err}")))
    }
}
