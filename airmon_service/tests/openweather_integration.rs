/// Live tests against the OpenWeather Air Pollution API
///
/// Tests verify:
/// 1. History for a registered facility parses into observations
/// 2. Current levels parse and can be checked against thresholds
/// 3. Current weather parses with plausible metric values
/// 4. A full forecast runs on live history
///
/// Prerequisites:
/// - OPENWEATHER_API_KEY set in the environment or .env
/// - Internet access to api.openweathermap.org
///
/// Run with: cargo test --test openweather_integration -- --ignored --test-threads=1

use airmon_service::alert::thresholds::check_current_levels;
use airmon_service::config::ServiceConfig;
use airmon_service::facilities::{FACILITY_REGISTRY, find_facility};
use airmon_service::ingest::HistoryProvider;
use airmon_service::ingest::openweather::OpenWeatherClient;
use airmon_service::pipeline::run_forecast;

use chrono::{Duration, Utc};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn live_client() -> OpenWeatherClient {
    dotenv::dotenv().ok();
    OpenWeatherClient::from_env().expect("OPENWEATHER_API_KEY must be set")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_history_returns_recent_hourly_observations() {
    let client = live_client();
    let facility = find_facility("Refinery A").unwrap();

    let observations = client
        .get_history(facility, &["pm2_5", "o3"], 48)
        .expect("history request succeeds");

    assert!(!observations.is_empty(), "no observations in the last 48h");
    assert!(observations.iter().all(|o| o.pollutant == "pm2_5" || o.pollutant == "o3"));
    assert!(observations.iter().all(|o| o.value >= 0.0));

    let oldest_allowed = Utc::now() - Duration::hours(49);
    assert!(observations.iter().all(|o| o.timestamp >= oldest_allowed));
}

#[test]
#[ignore]
fn test_current_levels_for_every_facility() {
    let client = live_client();
    let thresholds = ServiceConfig::default().hazard_thresholds;

    for facility in FACILITY_REGISTRY {
        let levels = client
            .fetch_current(facility)
            .unwrap_or_else(|e| panic!("{}: {}", facility.name, e));
        assert!(levels.components.contains_key("pm2_5"), "{}", facility.name);

        // must not panic; the result depends on live air quality
        let _ = check_current_levels(&levels.components, &thresholds);
    }
}

#[test]
#[ignore]
fn test_current_weather_is_metric() {
    let client = live_client();
    let facility = find_facility("Storage Site D").unwrap();

    let weather = client.fetch_weather(facility).expect("weather request succeeds");

    assert!((-60.0..60.0).contains(&weather.temperature_c), "{} °C", weather.temperature_c);
    assert!((0.0..=100.0).contains(&weather.humidity_pct));
    assert!(Utc::now() - weather.timestamp < Duration::hours(3));
}

#[test]
#[ignore]
fn test_live_forecast_produces_full_horizon() {
    let client = live_client();
    let config = ServiceConfig::default();
    let facility = find_facility("Gas Terminal C").unwrap();

    let report = run_forecast(
        &client,
        &config.forecast,
        &config.hazard_thresholds,
        facility,
        "pm10",
    )
    .expect("live forecast succeeds");

    assert_eq!(report.forecast.len(), config.forecast.forecast_hours);
}
