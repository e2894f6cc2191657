/// Air-quality forecasting for monitored industrial facilities.
///
/// Module map:
/// - `model`: shared data types and errors.
/// - `facilities`: facility registry and pollutant codes.
/// - `config`: TOML configuration.
/// - `logging`: process-wide structured logger.
/// - `ingest`: history providers (OpenWeather, TTL cache).
/// - `dev_mode`: PostgreSQL replay provider and backfill.
/// - `analysis`: hourly series preparation and the seasonal ARIMA model.
/// - `alert`: hazard threshold evaluation.
/// - `pipeline`: per-request forecast orchestration and report formatting.

pub mod alert;
pub mod analysis;
pub mod config;
pub mod dev_mode;
pub mod facilities;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
