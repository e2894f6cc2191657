/// Service configuration loaded from `airmon.toml`.
///
/// Every key is optional; missing keys fall back to the defaults below.
/// Secrets (API key, database URL) are not part of this file. They are read
/// from the environment after `dotenv` has loaded `.env`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::logging::LogLevel;

/// Shortest lookback that still covers two daily cycles of hourly data.
pub const MIN_MODEL_HISTORY_HOURS: u32 = 48;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// The config file could not be read.
    Io(String),
    /// The file is not valid TOML or has the wrong shape.
    Parse(String),
    /// The file parsed but a value is out of range.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Cannot read config: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    /// Forecast horizon in hours (FORECAST_HOURS).
    pub forecast_hours: usize,
    /// Lookback used to train the model (MODEL_HISTORY_HOURS).
    pub model_history_hours: u32,
    /// Two-sided interval level for the forecast bounds.
    pub confidence_level: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            forecast_hours: 24,
            model_history_hours: 168,
            confidence_level: 0.95,
        }
    }
}

/// Per-pollutant hazard limits in µg/m³. A pollutant absent from the map has
/// no threshold, which is distinct from a threshold of zero.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct HazardThresholds(BTreeMap<String, f64>);

impl HazardThresholds {
    pub fn new(limits: BTreeMap<String, f64>) -> Self {
        Self(limits)
    }

    pub fn get(&self, pollutant: &str) -> Option<f64> {
        self.0.get(pollutant).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for HazardThresholds {
    fn default() -> Self {
        let limits = [
            ("co", 10000.0),
            ("no", 200.0),
            ("no2", 200.0),
            ("o3", 100.0),
            ("so2", 20.0),
            ("pm2_5", 25.0),
            ("pm10", 50.0),
        ];
        Self(
            limits
                .iter()
                .map(|(code, limit)| (code.to_string(), *limit))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Lifetime of a memoized history fetch.
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            timestamps: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub forecast: ForecastSettings,
    pub hazard_thresholds: HazardThresholds,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl ServiceConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the config file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fc = &self.forecast;
        if fc.forecast_hours == 0 {
            return Err(ConfigError::Invalid(
                "forecast.forecast_hours must be at least 1".to_string(),
            ));
        }
        if fc.model_history_hours < MIN_MODEL_HISTORY_HOURS {
            return Err(ConfigError::Invalid(format!(
                "forecast.model_history_hours must be at least {} (two daily cycles), got {}",
                MIN_MODEL_HISTORY_HOURS, fc.model_history_hours
            )));
        }
        if !(fc.confidence_level > 0.0 && fc.confidence_level < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "forecast.confidence_level must be in (0, 1), got {}",
                fc.confidence_level
            )));
        }
        for (pollutant, limit) in self.hazard_thresholds.iter() {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "hazard threshold for '{}' must be a positive number, got {}",
                    pollutant, limit
                )));
            }
        }
        Ok(())
    }
}
