//! Hazard threshold checking.
//!
//! Forecasts are judged on their point estimate: a step is a violation when
//! `mean[i] > threshold`. The interval bounds are not consulted, so a
//! forecast whose upper bound crosses the limit while its mean stays below
//! reports `Ok`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::HazardThresholds;
use crate::model::Forecast;

/// Outcome of evaluating one pollutant's forecast.
///
/// `Undefined` is not a failure: the pollutant simply has no configured
/// limit, and callers must render it differently from `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardStatus {
    Undefined,
    Ok,
    Violated,
}

/// One forecast step whose point estimate is above the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exceedance {
    pub timestamp: DateTime<Utc>,
    pub pollutant: String,
    pub forecast_value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HazardReport {
    pub pollutant: String,
    pub threshold: Option<f64>,
    pub status: HazardStatus,
    /// Every offending step, in forecast order. Empty unless `Violated`.
    pub violations: Vec<Exceedance>,
}

/// Compare each forecast step against `threshold`.
pub fn evaluate_forecast(
    forecast: &Forecast,
    pollutant: &str,
    threshold: Option<f64>,
) -> HazardReport {
    let Some(limit) = threshold else {
        return HazardReport {
            pollutant: pollutant.to_string(),
            threshold: None,
            status: HazardStatus::Undefined,
            violations: Vec::new(),
        };
    };

    let violations: Vec<Exceedance> = forecast
        .index
        .iter()
        .zip(forecast.mean.iter())
        .filter(|(_, value)| **value > limit)
        .map(|(timestamp, value)| Exceedance {
            timestamp: *timestamp,
            pollutant: pollutant.to_string(),
            forecast_value: *value,
            threshold: limit,
        })
        .collect();

    let status = if violations.is_empty() {
        HazardStatus::Ok
    } else {
        HazardStatus::Violated
    };

    HazardReport {
        pollutant: pollutant.to_string(),
        threshold: Some(limit),
        status,
        violations,
    }
}

/// A current reading above its configured limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentExceedance {
    pub pollutant: String,
    pub value: f64,
    pub threshold: f64,
}

/// Current pollutant levels that strictly exceed their threshold, ordered by
/// pollutant code. Components without a threshold (e.g. `nh3`) are skipped.
pub fn check_current_levels(
    levels: &BTreeMap<String, f64>,
    thresholds: &HazardThresholds,
) -> Vec<CurrentExceedance> {
    levels
        .iter()
        .filter_map(|(pollutant, value)| {
            let limit = thresholds.get(pollutant)?;
            (*value > limit).then(|| CurrentExceedance {
                pollutant: pollutant.clone(),
                value: *value,
                threshold: limit,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn forecast_of(means: &[f64]) -> Forecast {
        Forecast {
            index: (0..means.len())
                .map(|i| t0() + Duration::hours(i as i64))
                .collect(),
            mean: means.to_vec(),
            lower: means.iter().map(|m| m - 5.0).collect(),
            upper: means.iter().map(|m| m + 5.0).collect(),
        }
    }

    #[test]
    fn test_every_step_above_threshold_is_reported() {
        let report = evaluate_forecast(&forecast_of(&[50.0, 150.0, 99.0, 101.0]), "o3", Some(100.0));

        assert_eq!(report.status, HazardStatus::Violated);
        assert_eq!(
            report.violations,
            vec![
                Exceedance {
                    timestamp: t0() + Duration::hours(1),
                    pollutant: "o3".to_string(),
                    forecast_value: 150.0,
                    threshold: 100.0,
                },
                Exceedance {
                    timestamp: t0() + Duration::hours(3),
                    pollutant: "o3".to_string(),
                    forecast_value: 101.0,
                    threshold: 100.0,
                },
            ]
        );
    }

    #[test]
    fn test_value_equal_to_threshold_is_not_a_violation() {
        let report = evaluate_forecast(&forecast_of(&[100.0, 100.0]), "o3", Some(100.0));
        assert_eq!(report.status, HazardStatus::Ok);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_upper_bound_alone_does_not_trigger() {
        // upper = 99 + 5 crosses the limit, the mean does not
        let report = evaluate_forecast(&forecast_of(&[99.0]), "pm10", Some(100.0));
        assert_eq!(report.status, HazardStatus::Ok);
    }

    #[test]
    fn test_missing_threshold_is_undefined_regardless_of_values() {
        for means in [vec![0.0], vec![1e9, 1e9], vec![-1.0, 5.0]] {
            let report = evaluate_forecast(&forecast_of(&means), "nh3", None);
            assert_eq!(report.status, HazardStatus::Undefined);
            assert!(report.violations.is_empty());
            assert_eq!(report.threshold, None);
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&HazardStatus::Undefined).unwrap(),
            "\"undefined\""
        );
        assert_eq!(serde_json::to_string(&HazardStatus::Violated).unwrap(), "\"violated\"");
    }

    #[test]
    fn test_current_levels_above_threshold() {
        let levels: BTreeMap<String, f64> = [
            ("co", 230.3),
            ("so2", 21.0),
            ("pm2_5", 25.0),
            ("pm10", 80.5),
            ("nh3", 999.0),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();

        let hits = check_current_levels(&levels, &HazardThresholds::default());
        let codes: Vec<&str> = hits.iter().map(|h| h.pollutant.as_str()).collect();
        assert_eq!(codes, vec!["pm10", "so2"]);
        assert_eq!(hits[1].threshold, 20.0);
    }
}
