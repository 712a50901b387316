use std::fmt;

use const_format::concatcp;

pub mod accumulator;
pub mod advisory;
pub mod config;
pub mod geocoding;
pub mod location;
pub mod places;
pub mod storage;
mod session;

#[cfg(test)]
mod test_support;

pub use session::*;

pub const DATA_DIR: &str = "data/";
pub const STORE_DIR: &str = concatcp!(DATA_DIR, "store");
pub const CONFIG_PATH: &str = concatcp!(DATA_DIR, "tracker.conf");

pub const TRIP_STATE_KEY: &str = "current_trip_state_v1";
pub const SAVED_PLACES_KEY: &str = "saved_places_v1";
pub const BATTERY_NOTICE_KEY: &str = "battery_warn_seen";

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerError {
    PermissionDenied,
    Storage(String),
    Provider(String),
    Config(String),
    Serialization(String),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::PermissionDenied => write!(f, "Location permission denied"),
            TrackerError::Storage(cause) => write!(f, "Storage error: {cause}"),
            TrackerError::Provider(cause) => write!(f, "Location provider error: {cause}"),
            TrackerError::Config(cause) => write!(f, "Configuration error: {cause}"),
            TrackerError::Serialization(cause) => write!(f, "Serialization error: {cause}"),
        }
    }
}

impl std::error::Error for TrackerError {}
