use std::{path::{Path, PathBuf}, str::FromStr, time::Duration};

use crate::{accumulator::FilterLimits, location::WatchOptions, TrackerError, STORE_DIR};

pub const API_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub limits: FilterLimits,

    pub place_match_radius_meters: f64,
    pub place_dedup_radius_meters: f64,

    pub distance_filter_meters: f64,
    pub background_title: String,
    pub background_message: String,

    pub geocoding_api_key: Option<String>,
    pub geocoding_language: String,
    pub geocoding_timeout_secs: u64,

    pub store_dir: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            limits: FilterLimits::default(),
            place_match_radius_meters: 50.,
            place_dedup_radius_meters: 20.,
            distance_filter_meters: 5.,
            background_title: "GPS active".into(),
            background_message: "Recording route in the background".into(),
            geocoding_api_key: None,
            geocoding_language: "es".into(),
            geocoding_timeout_secs: 10,
            store_dir: project_root().join(STORE_DIR),
        }
    }
}

impl TrackerConfig {
    /// Parses `key = value` lines on top of the defaults. Blank lines and
    /// lines starting with `#` are skipped, unknown keys are ignored.
    pub fn parse(text: &str) -> Result<Self, TrackerError> {
        let mut config = Self::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(TrackerError::Config(format!("Expected key = value, got: {line}")));
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "max_accuracy_meters" => config.limits.max_accuracy_meters = parse_value(key, value)?,
                "max_jump_miles" => config.limits.max_jump_miles = parse_value(key, value)?,
                "min_movement_miles" => config.limits.min_movement_miles = parse_value(key, value)?,
                "flush_threshold_miles" => config.limits.flush_threshold_miles = parse_value(key, value)?,
                "max_path_points" => config.limits.max_path_points = parse_value(key, value)?,
                "reanchor_after_jumps" => config.limits.reanchor_after_jumps = parse_value(key, value)?,
                "place_match_radius_meters" => config.place_match_radius_meters = parse_value(key, value)?,
                "place_dedup_radius_meters" => config.place_dedup_radius_meters = parse_value(key, value)?,
                "distance_filter_meters" => config.distance_filter_meters = parse_value(key, value)?,
                "background_title" => config.background_title = value.to_string(),
                "background_message" => config.background_message = value.to_string(),
                "geocoding_api_key" => config.geocoding_api_key = Some(value.to_string()).filter(|key| !key.is_empty()),
                "geocoding_language" => config.geocoding_language = value.to_string(),
                "geocoding_timeout_secs" => config.geocoding_timeout_secs = parse_value(key, value)?,
                "store_dir" => config.store_dir = PathBuf::from(value),
                _ => {
                    tracing::warn!("Unknown config key: {}", key);
                }
            }
        }

        if config.limits.max_path_points == 0 {
            return Err(TrackerError::Config("max_path_points must be at least 1".into()));
        }

        Ok(config)
    }

    /// Reads the config file at `path`. A missing file gives the defaults.
    pub async fn load(path: &Path) -> Result<Self, TrackerError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(err) => Err(TrackerError::Config(format!("Failed to read {:?}: {err}", path))),
        }
    }

    /// Lets the environment supply the geocoding key.
    pub fn with_env(mut self) -> Self {
        if let Some(key) = std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty()) {
            self.geocoding_api_key = Some(key);
        }
        self
    }

    pub fn geocoding_timeout(&self) -> Duration {
        Duration::from_secs(self.geocoding_timeout_secs)
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            background_title: self.background_title.clone(),
            background_message: self.background_message.clone(),
            distance_filter_meters: self.distance_filter_meters,
            stale: false,
            request_permissions: true,
        }
    }
}

/// The workspace root, or the working directory when run outside of it.
pub fn project_root() -> PathBuf {
    project_root::get_project_root().unwrap_or_else(|_| PathBuf::from("."))
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, TrackerError> {
    value.parse().map_err(|_| TrackerError::Config(format!("Invalid value for {key}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_filter_constants() {
        let config = TrackerConfig::default();
        assert_eq!(config.limits.max_accuracy_meters, 50.);
        assert_eq!(config.limits.max_jump_miles, 0.5);
        assert_eq!(config.limits.min_movement_miles, 0.0031);
        assert_eq!(config.limits.flush_threshold_miles, 0.03);
        assert_eq!(config.limits.max_path_points, 500);
        assert_eq!(config.limits.reanchor_after_jumps, 0);
        assert_eq!(config.place_match_radius_meters, 50.);
        assert_eq!(config.place_dedup_radius_meters, 20.);
    }

    #[test]
    fn parse_overrides() {
        let config = TrackerConfig::parse("
            # tuned for a bicycle
            max_accuracy_meters = 25
            max_path_points=1000

            geocoding_api_key = abc123
            geocoding_language = en
            store_dir = /tmp/mileage
        ").unwrap();

        assert_eq!(config.limits.max_accuracy_meters, 25.);
        assert_eq!(config.limits.max_path_points, 1000);
        assert_eq!(config.limits.max_jump_miles, 0.5);
        assert_eq!(config.geocoding_api_key.as_deref(), Some("abc123"));
        assert_eq!(config.geocoding_language, "en");
        assert_eq!(config.store_dir, PathBuf::from("/tmp/mileage"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = TrackerConfig::parse("sim_pin = 1234").unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(matches!(TrackerConfig::parse("max_jump_miles = far"), Err(TrackerError::Config(_))));
        assert!(matches!(TrackerConfig::parse("just some words"), Err(TrackerError::Config(_))));
        assert!(matches!(TrackerConfig::parse("max_path_points = 0"), Err(TrackerError::Config(_))));
    }

    #[test]
    fn empty_key_means_no_geocoding() {
        let config = TrackerConfig::parse("geocoding_api_key =").unwrap();
        assert_eq!(config.geocoding_api_key, None);
    }

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!("mileage-missing-{}.conf", rand::random::<u64>()));
        let config = TrackerConfig::load(&path).await.unwrap();
        assert_eq!(config, TrackerConfig::default());
    }
}
