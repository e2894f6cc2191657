/// OpenWeather Air Pollution API Client
///
/// Retrieves hourly pollutant concentrations (µg/m³) for facility
/// coordinates: the history endpoint feeds the forecasting pipeline, the
/// current endpoint feeds the current-level threshold check.
///
/// API Documentation: https://openweathermap.org/api/air-pollution
/// History: /data/2.5/air_pollution/history?lat&lon&start&end&appid
/// Current: /data/2.5/air_pollution?lat&lon&appid
/// Weather: /data/2.5/weather?lat&lon&units=metric&appid

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::facilities::Facility;
use crate::ingest::HistoryProvider;
use crate::logging::{self, DataSource};
use crate::model::{HistoryError, Observation};

const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

const HISTORY_TIMEOUT_SECS: u64 = 10;
const CURRENT_TIMEOUT_SECS: u64 = 5;
const WEATHER_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response body shared by the history and current endpoints
#[derive(Debug, Deserialize)]
pub struct AirPollutionResponse {
    #[serde(default)]
    pub list: Vec<AirPollutionEntry>,
}

/// One hourly record with every measured component
#[derive(Debug, Deserialize)]
pub struct AirPollutionEntry {
    pub dt: i64, // unix seconds, UTC
    pub main: Option<AqiIndex>,
    #[serde(default)]
    pub components: BTreeMap<String, f64>,
}

impl CurrentLevels {
    /// "AQI 2/5", or "AQI n/a" when the body carried no index.
    pub fn aqi_label(&self) -> String {
        match self.aqi {
            Some(aqi) => format!("AQI {}/5", aqi),
            None => "AQI n/a".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AqiIndex {
    pub aqi: u8, // 1 = good ... 5 = very poor
}

/// Latest pollutant levels for a facility
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentLevels {
    pub timestamp: DateTime<Utc>,
    pub aqi: Option<u8>,
    pub components: BTreeMap<String, f64>,
}

/// Current-weather body (metric units). Only the fields shown next to the
/// pollutant levels are decoded.
#[derive(Debug, Deserialize)]
pub struct WeatherResponse {
    pub dt: i64,
    pub main: WeatherMain,
    pub wind: Option<WeatherWind>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherMain {
    pub temp: f64,     // °C
    pub humidity: f64, // %
}

#[derive(Debug, Deserialize)]
pub struct WeatherWind {
    pub speed: f64, // m/s
}

/// Latest weather at a facility
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentWeather {
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_ms: Option<f64>,
}

impl CurrentWeather {
    pub fn summary(&self) -> String {
        let wind = match self.wind_speed_ms {
            Some(speed) => format!("{:.1} m/s", speed),
            None => "n/a".to_string(),
        };
        format!(
            "Temp {:.1} °C, humidity {:.0} %, wind {}",
            self.temperature_c, self.humidity_pct, wind
        )
    }
}

// ============================================================================
// URL Construction
// ============================================================================

pub fn build_history_url(
    facility: &Facility,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    api_key: &str,
) -> String {
    format!(
        "{}/data/2.5/air_pollution/history?lat={}&lon={}&start={}&end={}&appid={}",
        OPENWEATHER_BASE_URL,
        facility.latitude,
        facility.longitude,
        start.timestamp(),
        end.timestamp(),
        api_key
    )
}

pub fn build_current_url(facility: &Facility, api_key: &str) -> String {
    format!(
        "{}/data/2.5/air_pollution?lat={}&lon={}&appid={}",
        OPENWEATHER_BASE_URL, facility.latitude, facility.longitude, api_key
    )
}

pub fn build_weather_url(facility: &Facility, api_key: &str) -> String {
    format!(
        "{}/data/2.5/weather?lat={}&lon={}&units=metric&appid={}",
        OPENWEATHER_BASE_URL, facility.latitude, facility.longitude, api_key
    )
}

// ============================================================================
// Parsing
// ============================================================================

fn entry_timestamp(dt: i64) -> Result<DateTime<Utc>, HistoryError> {
    DateTime::from_timestamp(dt, 0)
        .ok_or_else(|| HistoryError::ParseError(format!("timestamp out of range: {}", dt)))
}

/// Parse a history response body into observations, one per component.
///
/// Only pollutants in `pollutants` are kept (all of them when empty).
/// Non-finite values are dropped. The result is sorted by timestamp.
pub fn parse_history_response(
    body: &str,
    pollutants: &[&str],
) -> Result<Vec<Observation>, HistoryError> {
    let response: AirPollutionResponse =
        serde_json::from_str(body).map_err(|e| HistoryError::ParseError(e.to_string()))?;

    let mut observations = Vec::new();
    for entry in response.list {
        let timestamp = entry_timestamp(entry.dt)?;
        for (pollutant, value) in entry.components {
            if !pollutants.is_empty() && !pollutants.contains(&pollutant.as_str()) {
                continue;
            }
            if !value.is_finite() {
                continue;
            }
            observations.push(Observation {
                timestamp,
                pollutant,
                value,
            });
        }
    }

    observations.sort_by_key(|obs| obs.timestamp);
    Ok(observations)
}

/// Parse a current-conditions response body.
pub fn parse_current_response(body: &str) -> Result<CurrentLevels, HistoryError> {
    let response: AirPollutionResponse =
        serde_json::from_str(body).map_err(|e| HistoryError::ParseError(e.to_string()))?;

    let entry = response
        .list
        .into_iter()
        .next()
        .ok_or_else(|| HistoryError::ParseError("No entries in response".to_string()))?;

    Ok(CurrentLevels {
        timestamp: entry_timestamp(entry.dt)?,
        aqi: entry.main.map(|m| m.aqi),
        components: entry.components,
    })
}

/// Parse a current-weather response body.
pub fn parse_weather_response(body: &str) -> Result<CurrentWeather, HistoryError> {
    let response: WeatherResponse =
        serde_json::from_str(body).map_err(|e| HistoryError::ParseError(e.to_string()))?;

    Ok(CurrentWeather {
        timestamp: entry_timestamp(response.dt)?,
        temperature_c: response.main.temp,
        humidity_pct: response.main.humidity,
        wind_speed_ms: response.wind.map(|w| w.speed),
    })
}

// ============================================================================
// API Client
// ============================================================================

pub struct OpenWeatherClient {
    http: reqwest::blocking::Client,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: &str) -> Result<Self, HistoryError> {
        if api_key.trim().is_empty() {
            return Err(HistoryError::MissingApiKey);
        }
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| HistoryError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
        })
    }

    /// Build a client from `OPENWEATHER_API_KEY` (after `.env` is loaded).
    pub fn from_env() -> Result<Self, HistoryError> {
        let key = std::env::var(API_KEY_ENV).map_err(|_| HistoryError::MissingApiKey)?;
        Self::new(&key)
    }

    fn get_body(&self, url: &str, timeout_secs: u64) -> Result<String, HistoryError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .send()
            .map_err(|e| HistoryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(HistoryError::HttpError(response.status().as_u16()));
        }

        response
            .text()
            .map_err(|e| HistoryError::Transport(e.to_string()))
    }

    /// Fetch the `hours` hours of history ending at `now`.
    pub fn fetch_history_at(
        &self,
        facility: &Facility,
        pollutants: &[&str],
        hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Observation>, HistoryError> {
        let start = now - Duration::hours(i64::from(hours));
        let url = build_history_url(facility, start, now, &self.api_key);
        let body = self.get_body(&url, HISTORY_TIMEOUT_SECS)?;
        let observations = parse_history_response(&body, pollutants)?;

        logging::debug(
            DataSource::OpenWeather,
            Some(facility.name),
            &format!("{} observations over {}h", observations.len(), hours),
        );
        Ok(observations)
    }

    /// Fetch the latest pollutant levels.
    pub fn fetch_current(&self, facility: &Facility) -> Result<CurrentLevels, HistoryError> {
        let url = build_current_url(facility, &self.api_key);
        let body = self.get_body(&url, CURRENT_TIMEOUT_SECS)?;
        parse_current_response(&body)
    }

    /// Fetch the current temperature, humidity and wind.
    pub fn fetch_weather(&self, facility: &Facility) -> Result<CurrentWeather, HistoryError> {
        let url = build_weather_url(facility, &self.api_key);
        let body = self.get_body(&url, WEATHER_TIMEOUT_SECS)?;
        parse_weather_response(&body)
    }
}

impl HistoryProvider for OpenWeatherClient {
    fn get_history(
        &self,
        facility: &Facility,
        pollutants: &[&str],
        lookback_hours: u32,
    ) -> Result<Vec<Observation>, HistoryError> {
        self.fetch_history_at(facility, pollutants, lookback_hours, Utc::now())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facilities::find_facility;
    use chrono::TimeZone;

    const HISTORY_BODY: &str = r#"{
        "coord": {"lon": 71.4861, "lat": 51.1414},
        "list": [
            {"dt": 1714572000, "main": {"aqi": 2},
             "components": {"co": 230.31, "no": 0.0, "no2": 4.11, "o3": 61.51,
                            "so2": 1.24, "pm2_5": 8.2, "pm10": 11.03, "nh3": 0.5}},
            {"dt": 1714568400, "main": {"aqi": 2},
             "components": {"co": 226.97, "no": 0.0, "no2": 3.98, "o3": 60.08,
                            "so2": 1.19, "pm2_5": 7.9, "pm10": 10.6, "nh3": 0.48}}
        ]
    }"#;

    #[test]
    fn test_history_expands_components_and_sorts() {
        let obs = parse_history_response(HISTORY_BODY, &[]).expect("valid body");
        assert_eq!(obs.len(), 16);
        assert!(obs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(obs[0].timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_history_filters_requested_pollutants() {
        let obs = parse_history_response(HISTORY_BODY, &["pm2_5"]).expect("valid body");
        let values: Vec<f64> = obs.iter().map(|o| o.value).collect();
        assert_eq!(values, vec![7.9, 8.2]);
        assert!(obs.iter().all(|o| o.pollutant == "pm2_5"));
    }

    #[test]
    fn test_empty_list_is_not_an_error() {
        let obs = parse_history_response(r#"{"coord": {}, "list": []}"#, &["co"])
            .expect("empty list parses");
        assert!(obs.is_empty());
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        let err = parse_history_response("<html>502</html>", &[]).unwrap_err();
        assert!(matches!(err, HistoryError::ParseError(_)));
    }

    #[test]
    fn test_current_response_takes_first_entry() {
        let levels = parse_current_response(HISTORY_BODY).expect("valid body");
        assert_eq!(levels.aqi, Some(2));
        assert_eq!(levels.aqi_label(), "AQI 2/5");
        assert_eq!(levels.components.get("so2"), Some(&1.24));
    }

    #[test]
    fn test_missing_aqi_is_labelled_unavailable() {
        let levels = CurrentLevels {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap(),
            aqi: None,
            components: BTreeMap::new(),
        };
        assert_eq!(levels.aqi_label(), "AQI n/a");
    }

    #[test]
    fn test_history_url_uses_unix_window() {
        let facility = find_facility("Refinery A").unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        let url = build_history_url(facility, end - Duration::hours(168), end, "KEY");
        assert!(url.contains("/data/2.5/air_pollution/history?"));
        assert!(url.contains("lat=51.1414&lon=71.4861"));
        assert!(url.contains("start=1713963600&end=1714568400"));
        assert!(url.ends_with("appid=KEY"));
    }

    const WEATHER_BODY: &str = r#"{
        "coord": {"lon": 71.4861, "lat": 51.1414},
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky"}],
        "main": {"temp": 18.4, "feels_like": 17.6, "pressure": 1014, "humidity": 52},
        "wind": {"speed": 4.1, "deg": 250},
        "dt": 1714568400,
        "name": "Astana"
    }"#;

    #[test]
    fn test_weather_response_extracts_temp_humidity_wind() {
        let weather = parse_weather_response(WEATHER_BODY).expect("valid body");
        assert_eq!(weather.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap());
        assert_eq!(weather.temperature_c, 18.4);
        assert_eq!(weather.humidity_pct, 52.0);
        assert_eq!(weather.wind_speed_ms, Some(4.1));
        assert_eq!(weather.summary(), "Temp 18.4 °C, humidity 52 %, wind 4.1 m/s");
    }

    #[test]
    fn test_weather_without_wind_block_still_parses() {
        let weather =
            parse_weather_response(r#"{"dt": 1714568400, "main": {"temp": -3.0, "humidity": 80}}"#)
                .expect("wind is optional");
        assert_eq!(weather.wind_speed_ms, None);
        assert_eq!(weather.summary(), "Temp -3.0 °C, humidity 80 %, wind n/a");
    }

    #[test]
    fn test_weather_without_main_is_parse_error() {
        let err = parse_weather_response(r#"{"dt": 1714568400, "cod": 401}"#).unwrap_err();
        assert!(matches!(err, HistoryError::ParseError(_)));
    }

    #[test]
    fn test_weather_url_requests_metric_units() {
        let facility = find_facility("Refinery A").unwrap();
        let url = build_weather_url(facility, "KEY");
        assert!(url.contains("/data/2.5/weather?lat=51.1414&lon=71.4861"));
        assert!(url.contains("units=metric"));
        assert!(url.ends_with("appid=KEY"));
    }

    #[test]
    fn test_blank_key_is_rejected() {
        assert!(matches!(
            OpenWeatherClient::new("  "),
            Err(HistoryError::MissingApiKey)
        ));
    }
}
