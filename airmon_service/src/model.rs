/// Observation, Forecast, HistoryError, ForecastError
///
/// Shared types for the facility air-quality forecaster. Every other module
/// imports from here; nothing in this file performs I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pollutant codes
// ---------------------------------------------------------------------------

/// Carbon monoxide, µg/m³.
pub const POLLUTANT_CO: &str = "co";
/// Nitrogen monoxide, µg/m³.
pub const POLLUTANT_NO: &str = "no";
/// Nitrogen dioxide, µg/m³.
pub const POLLUTANT_NO2: &str = "no2";
/// Ozone, µg/m³.
pub const POLLUTANT_O3: &str = "o3";
/// Sulphur dioxide, µg/m³.
pub const POLLUTANT_SO2: &str = "so2";
/// Fine particulate matter (≤ 2.5 µm), µg/m³.
pub const POLLUTANT_PM2_5: &str = "pm2_5";
/// Coarse particulate matter (≤ 10 µm), µg/m³.
pub const POLLUTANT_PM10: &str = "pm10";

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// A single concentration measurement for one pollutant at one instant.
///
/// Produced by a `HistoryProvider`; one upstream record carrying several
/// pollutant components expands into one `Observation` per component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub pollutant: String, // one of the POLLUTANT_* codes
    pub value: f64,        // µg/m³
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, pollutant: &str, value: f64) -> Self {
        Self {
            timestamp,
            pollutant: pollutant.to_string(),
            value,
        }
    }
}

// ---------------------------------------------------------------------------
// Forecast output
// ---------------------------------------------------------------------------

/// Point forecast with a two-sided interval per step.
///
/// `index[i]` is the i-th hour after the last observed hour; the four
/// vectors always have the same length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub index: Vec<DateTime<Utc>>,
    pub mean: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Forecast {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching observation history.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryError {
    /// Non-2xx HTTP response from the remote API.
    HttpError(u16),
    /// The response body could not be deserialized.
    ParseError(String),
    /// No API key was configured for the remote source.
    MissingApiKey,
    /// The request never produced a response (DNS, TLS, timeout...).
    Transport(String),
    /// The replay database rejected a query or was unreachable.
    Database(String),
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryError::HttpError(code) => write!(f, "HTTP error: {}", code),
            HistoryError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            HistoryError::MissingApiKey => write!(
                f,
                "OpenWeather API key is missing. Set OPENWEATHER_API_KEY in the environment or .env"
            ),
            HistoryError::Transport(msg) => write!(f, "Transport error: {}", msg),
            HistoryError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for HistoryError {}

/// Request-scoped failures of the forecasting pipeline.
///
/// None of these corrupt shared state; each is turned into a user-facing
/// message at the pipeline boundary. A missing hazard threshold is not an
/// error (see `alert::thresholds::HazardStatus::Undefined`).
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// The history provider itself failed.
    History(HistoryError),
    /// No observations for the requested pollutant in the lookback window.
    DataUnavailable(String),
    /// The prepared series is too short for the seasonal model.
    InsufficientHistory { required: usize, actual: usize },
    /// Parameter estimation failed; carries the underlying cause.
    ModelFit(String),
    /// The requested horizon was zero.
    InvalidHorizon(usize),
    /// The interval level was outside (0, 1).
    InvalidConfidenceLevel(f64),
}

impl std::fmt::Display for ForecastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForecastError::History(err) => write!(f, "History unavailable: {}", err),
            ForecastError::DataUnavailable(pollutant) => write!(
                f,
                "Insufficient historical data for modeling: no {} observations",
                pollutant
            ),
            ForecastError::InsufficientHistory { required, actual } => write!(
                f,
                "Insufficient history: need at least {} hourly points, got {}",
                required, actual
            ),
            ForecastError::ModelFit(cause) => write!(f, "Model fitting error: {}", cause),
            ForecastError::InvalidHorizon(h) => {
                write!(f, "Forecast horizon must be positive, got {}", h)
            }
            ForecastError::InvalidConfidenceLevel(level) => {
                write!(f, "Confidence level must be in (0, 1), got {}", level)
            }
        }
    }
}

impl std::error::Error for ForecastError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ForecastError::History(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HistoryError> for ForecastError {
    fn from(err: HistoryError) -> Self {
        ForecastError::History(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_error_messages() {
        assert_eq!(HistoryError::HttpError(503).to_string(), "HTTP error: 503");
        assert!(HistoryError::ParseError("bad json".into())
            .to_string()
            .starts_with("Parse error"));
    }

    #[test]
    fn test_model_fit_error_includes_cause() {
        let err = ForecastError::ModelFit("singular matrix".to_string());
        assert_eq!(err.to_string(), "Model fitting error: singular matrix");
    }

    #[test]
    fn test_history_error_converts_and_exposes_source() {
        use std::error::Error;
        let err: ForecastError = HistoryError::HttpError(401).into();
        assert_eq!(err, ForecastError::History(HistoryError::HttpError(401)));
        assert!(err.source().is_some());
    }
}
