//! Series preparation: raw observations → regular hourly series.
//!
//! Readings falling in the same clock hour are averaged; hours with no
//! reading carry the previous hour's value forward. The series starts at the
//! first hour that holds a reading, so there is never a leading gap to fill.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{ForecastError, Observation};

const SECONDS_PER_HOUR: i64 = 3600;

/// Gap-free, hourly-spaced values starting at `start` (aligned to the hour).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegularSeries {
    start: DateTime<Utc>,
    values: Vec<f64>,
}

impl RegularSeries {
    /// Build a series from already-regular hourly values.
    ///
    /// Returns `None` if `values` is empty, contains a non-finite value, or
    /// `start` is not on an hour boundary.
    pub fn from_hourly(start: DateTime<Utc>, values: Vec<f64>) -> Option<Self> {
        if values.is_empty()
            || values.iter().any(|v| !v.is_finite())
            || start.timestamp().rem_euclid(SECONDS_PER_HOUR) != 0
            || start.timestamp_subsec_nanos() != 0
        {
            return None;
        }
        Some(Self { start, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Timestamp of the `i`-th value.
    pub fn timestamp_at(&self, i: usize) -> DateTime<Utc> {
        self.start + Duration::hours(i as i64)
    }

    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.timestamp_at(self.values.len().saturating_sub(1))
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.values.len()).map(|i| self.timestamp_at(i))
    }
}

/// Resample one pollutant's observations to an hourly, forward-filled series.
///
/// Non-finite readings are ignored. Returns `ForecastError::DataUnavailable`
/// when no usable reading of `pollutant` exists.
pub fn prepare_series(
    observations: &[Observation],
    pollutant: &str,
) -> Result<RegularSeries, ForecastError> {
    // hour index (unix hours) -> (sum, count)
    let mut buckets: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for obs in observations
        .iter()
        .filter(|o| o.pollutant == pollutant && o.value.is_finite())
    {
        let hour = obs.timestamp.timestamp().div_euclid(SECONDS_PER_HOUR);
        let bucket = buckets.entry(hour).or_insert((0.0, 0));
        bucket.0 += obs.value;
        bucket.1 += 1;
    }

    let (first_hour, last_hour) = match (buckets.keys().next(), buckets.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(ForecastError::DataUnavailable(pollutant.to_string())),
    };

    let mut values = Vec::with_capacity((last_hour - first_hour + 1) as usize);
    let mut carried = f64::NAN;
    for hour in first_hour..=last_hour {
        if let Some((sum, count)) = buckets.get(&hour) {
            carried = sum / *count as f64;
        }
        values.push(carried);
    }

    let start = DateTime::from_timestamp(first_hour * SECONDS_PER_HOUR, 0).ok_or_else(|| {
        ForecastError::DataUnavailable(format!("{} (timestamp out of range)", pollutant))
    })?;

    Ok(RegularSeries { start, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_missing_hour_is_forward_filled_not_interpolated() {
        let obs = vec![
            Observation::new(at(2, 0), "no2", 10.0),
            Observation::new(at(4, 0), "no2", 20.0),
        ];
        let series = prepare_series(&obs, "no2").expect("two readings");
        assert_eq!(series.values(), &[10.0, 10.0, 20.0]);
        assert_eq!(series.timestamp_at(1), at(3, 0));
    }

    #[test]
    fn test_readings_in_same_hour_are_averaged() {
        let obs = vec![
            Observation::new(at(5, 10), "pm10", 30.0),
            Observation::new(at(5, 50), "pm10", 50.0),
            Observation::new(at(6, 0), "pm10", 12.0),
        ];
        let series = prepare_series(&obs, "pm10").unwrap();
        assert_eq!(series.values(), &[40.0, 12.0]);
        assert_eq!(series.start(), at(5, 0));
    }

    #[test]
    fn test_other_pollutants_are_ignored() {
        let obs = vec![
            Observation::new(at(1, 0), "co", 200.0),
            Observation::new(at(1, 0), "o3", 60.0),
            Observation::new(at(3, 0), "co", 210.0),
        ];
        let series = prepare_series(&obs, "o3").unwrap();
        assert_eq!(series.values(), &[60.0]);
        assert_eq!(series.last_timestamp(), at(1, 0));
    }

    #[test]
    fn test_unsorted_input_produces_increasing_series() {
        let obs = vec![
            Observation::new(at(9, 0), "so2", 3.0),
            Observation::new(at(7, 0), "so2", 1.0),
            Observation::new(at(8, 0), "so2", 2.0),
        ];
        let series = prepare_series(&obs, "so2").unwrap();
        assert_eq!(series.values(), &[1.0, 2.0, 3.0]);
        let ts: Vec<_> = series.timestamps().collect();
        assert!(ts.windows(2).all(|w| w[1] - w[0] == Duration::hours(1)));
    }

    #[test]
    fn test_no_matching_observations_is_data_unavailable() {
        let obs = vec![Observation::new(at(1, 0), "co", 200.0)];
        assert_eq!(
            prepare_series(&obs, "pm2_5"),
            Err(ForecastError::DataUnavailable("pm2_5".to_string()))
        );
        assert!(matches!(
            prepare_series(&[], "co"),
            Err(ForecastError::DataUnavailable(_))
        ));
    }

    #[test]
    fn test_non_finite_readings_are_skipped() {
        let obs = vec![
            Observation::new(at(1, 0), "o3", f64::NAN),
            Observation::new(at(2, 0), "o3", 70.0),
        ];
        let series = prepare_series(&obs, "o3").unwrap();
        assert_eq!(series.values(), &[70.0]);
        assert_eq!(series.start(), at(2, 0));
    }

    #[test]
    fn test_from_hourly_rejects_unaligned_start() {
        assert!(RegularSeries::from_hourly(at(1, 30), vec![1.0]).is_none());
        assert!(RegularSeries::from_hourly(at(1, 0), vec![]).is_none());
        assert!(RegularSeries::from_hourly(at(1, 0), vec![1.0, f64::INFINITY]).is_none());
        assert!(RegularSeries::from_hourly(at(1, 0), vec![1.0, 2.0]).is_some());
    }
}
