use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";
pub const API_KEY_ENV: &str = "DIRECTIONS_API_KEY";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionsConfig {
    pub base_url: String,
    pub api_key: String,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        DirectionsConfig {
            base_url: DEFAULT_DIRECTIONS_URL.to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub deviation_threshold_m: f64,
    pub recalculation_cooldown_ms: i64,
    pub eta_refresh_interval_ms: i64,
    pub camera_update_interval_ms: i64,
    pub camera_pitch: f64,
    pub camera_zoom: f64,
    pub camera_animation_ms: u64,
    pub fallback_speed_kmh: f64,
    pub location_min_interval_ms: i64,
    pub location_min_distance_m: f64,
    pub directions: DirectionsConfig,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        NavigationConfig {
            deviation_threshold_m: 100.0,
            recalculation_cooldown_ms: 10_000,
            eta_refresh_interval_ms: 10_000,
            camera_update_interval_ms: 500,
            camera_pitch: 45.0,
            camera_zoom: 17.0,
            camera_animation_ms: 500,
            fallback_speed_kmh: 30.0,
            location_min_interval_ms: 1000,
            location_min_distance_m: 5.0,
            directions: DirectionsConfig::default(),
        }
    }
}

impl NavigationConfig {
    /// Missing fields keep their defaults. An empty api key is filled from
    /// `DIRECTIONS_API_KEY`.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: NavigationConfig = serde_json::from_str(json)?;
        if config.directions.api_key.is_empty() {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                config.directions.api_key = key;
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.deviation_threshold_m.is_nan() || self.deviation_threshold_m < 0.0 {
            bail!(
                "deviation threshold must be non-negative, got {}",
                self.deviation_threshold_m
            );
        }
        if self.fallback_speed_kmh.is_nan() || self.fallback_speed_kmh <= 0.0 {
            bail!(
                "fallback speed must be positive, got {}",
                self.fallback_speed_kmh
            );
        }
        if self.recalculation_cooldown_ms < 0
            || self.eta_refresh_interval_ms < 0
            || self.camera_update_interval_ms < 0
            || self.location_min_interval_ms < 0
        {
            bail!("intervals must be non-negative");
        }
        Ok(())
    }
}
