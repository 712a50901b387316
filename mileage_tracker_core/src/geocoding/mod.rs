use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

pub mod google;
mod resolver;

pub use google::GoogleGeocoder;
pub use resolver::{select_address, AddressResolver};

pub const STATUS_OK: &str = "OK";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodeResult {
    pub formatted_address: String,
    #[serde(default)]
    pub types: Vec<String>,
}

impl GeocodeResult {
    pub fn has_type(&self, tag: &str) -> bool {
        self.types.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionError {
    /// No geocoding service is configured.
    Disabled,
    Network(String),
    Status(String),
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::Disabled => write!(f, "Geocoding is disabled"),
            ResolutionError::Network(cause) => write!(f, "Connection error: {cause}"),
            ResolutionError::Status(status) => write!(f, "Geocoder returned {status}"),
        }
    }
}

impl std::error::Error for ResolutionError {}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<GeocodeResponse, ResolutionError>;
}

/// Used when no API key is configured. Every lookup fails with `Disabled`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> Result<GeocodeResponse, ResolutionError> {
        Err(ResolutionError::Disabled)
    }
}
