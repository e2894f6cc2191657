/// Observation history sources.
///
/// The forecasting pipeline only sees the `HistoryProvider` trait; where the
/// observations come from (live OpenWeather API, the dev-mode replay
/// database, a cache in front of either) is decided by the caller.
///
/// Submodules:
/// - `openweather`: OpenWeather air-pollution API client.
/// - `cache`: TTL memoization layer for any provider.

pub mod cache;
pub mod openweather;

use crate::facilities::Facility;
use crate::model::{HistoryError, Observation};

/// Source of historical observations for one facility.
///
/// Implementations return every observation of the requested pollutants
/// (all pollutants when `pollutants` is empty) in the `lookback_hours`
/// window ending now. An empty result is not an error here; the pipeline
/// reports it as `ForecastError::DataUnavailable`.
pub trait HistoryProvider {
    fn get_history(
        &self,
        facility: &Facility,
        pollutants: &[&str],
        lookback_hours: u32,
    ) -> Result<Vec<Observation>, HistoryError>;
}

impl<P: HistoryProvider + ?Sized> HistoryProvider for &P {
    fn get_history(
        &self,
        facility: &Facility,
        pollutants: &[&str],
        lookback_hours: u32,
    ) -> Result<Vec<Observation>, HistoryError> {
        (**self).get_history(facility, pollutants, lookback_hours)
    }
}

impl<P: HistoryProvider + ?Sized> HistoryProvider for Box<P> {
    fn get_history(
        &self,
        facility: &Facility,
        pollutants: &[&str],
        lookback_hours: u32,
    ) -> Result<Vec<Observation>, HistoryError> {
        (**self).get_history(facility, pollutants, lookback_hours)
    }
}
