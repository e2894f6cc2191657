/// Forecast orchestration: history → hourly series → SARIMA → hazard check.
///
/// One call to `run_forecast` is one user request. Every intermediate value
/// (series, fitted model) is created and dropped inside the call; the only
/// state that outlives it is whatever cache sits inside the provider.

use serde::Serialize;

use crate::alert::thresholds::{HazardReport, HazardStatus, evaluate_forecast};
use crate::analysis::sarima::{Sarima, SarimaOrder, SarimaParams};
use crate::analysis::series::{RegularSeries, prepare_series};
use crate::config::{ForecastSettings, HazardThresholds};
use crate::facilities::{Facility, pollutant_display_name};
use crate::ingest::HistoryProvider;
use crate::logging::{self, DataSource};
use crate::model::{Forecast, ForecastError};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// What the fitted model looked like, for display and JSON output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub order: String,
    pub params: SarimaParams,
    pub sigma2: f64,
    pub aic: f64,
    pub converged: bool,
    /// False when the history was too short for the seasonal terms to be fitted.
    pub seasonal_estimated: bool,
    pub evaluations: usize,
    pub training_points: usize,
}

/// Everything the presentation layer needs for one forecast request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub facility: String,
    pub pollutant: String,
    pub observed: RegularSeries,
    pub forecast: Forecast,
    pub hazard: HazardReport,
    pub model: ModelSummary,
}

/// Run the full forecast for one facility and pollutant.
///
/// Fails with `DataUnavailable` before any series is built when the provider
/// returns nothing for `pollutant`.
pub fn run_forecast<P: HistoryProvider + ?Sized>(
    provider: &P,
    settings: &ForecastSettings,
    thresholds: &HazardThresholds,
    facility: &Facility,
    pollutant: &str,
) -> Result<ForecastReport, ForecastError> {
    let observations = provider.get_history(facility, &[pollutant], settings.model_history_hours)?;

    if !observations.iter().any(|o| o.pollutant == pollutant) {
        logging::warn(
            DataSource::System,
            Some(facility.name),
            &format!(
                "no {} observations in the last {}h",
                pollutant, settings.model_history_hours
            ),
        );
        return Err(ForecastError::DataUnavailable(pollutant.to_string()));
    }

    let series = prepare_series(&observations, pollutant)?;
    logging::info(
        DataSource::Model,
        Some(facility.name),
        &format!(
            "training on {} hourly {} points ({} to {} UTC)",
            series.len(),
            pollutant,
            series.start().format(TIME_FORMAT),
            series.last_timestamp().format(TIME_FORMAT)
        ),
    );

    let fitted = Sarima::new(SarimaOrder::default()).fit(&series)?;
    if !fitted.converged() {
        logging::warn(
            DataSource::Model,
            Some(facility.name),
            &format!(
                "{} optimizer stopped before convergence after {} evaluations",
                fitted.order(),
                fitted.evaluations()
            ),
        );
    }

    let forecast = fitted.forecast(settings.forecast_hours, settings.confidence_level)?;
    let hazard = evaluate_forecast(&forecast, pollutant, thresholds.get(pollutant));

    if hazard.status == HazardStatus::Violated {
        logging::warn(
            DataSource::Model,
            Some(facility.name),
            &format!(
                "{} forecast exceeds threshold at {} step(s)",
                pollutant,
                hazard.violations.len()
            ),
        );
    }

    Ok(ForecastReport {
        facility: facility.name.to_string(),
        pollutant: pollutant.to_string(),
        model: ModelSummary {
            order: fitted.order().to_string(),
            params: fitted.params().clone(),
            sigma2: fitted.sigma2(),
            aic: fitted.aic(),
            converged: fitted.converged(),
            seasonal_estimated: fitted.seasonal_estimated(),
            evaluations: fitted.evaluations(),
            training_points: series.len(),
        },
        observed: series,
        forecast,
        hazard,
    })
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// The banner shown under a forecast.
pub fn format_hazard_message(hazard: &HazardReport) -> String {
    let name = pollutant_display_name(&hazard.pollutant);
    match (hazard.status, hazard.threshold) {
        (HazardStatus::Violated, Some(limit)) => {
            let times: Vec<String> = hazard
                .violations
                .iter()
                .map(|v| v.timestamp.format(TIME_FORMAT).to_string())
                .collect();
            format!(
                "Forecasted {} exceeds {} µg/m³ at: {} UTC",
                name,
                limit,
                times.join(", ")
            )
        }
        (HazardStatus::Ok, Some(limit)) => format!(
            "No forecasted {} exceed the threshold of {} µg/m³.",
            name, limit
        ),
        _ => "No hazardous threshold defined for this pollutant.".to_string(),
    }
}

/// Plain-text table of the forecast, one row per hour.
pub fn format_forecast_table(report: &ForecastReport) -> String {
    let fc = &report.forecast;
    let mut out = format!(
        "{} forecast for {} ({})\n{:<18} {:>10} {:>10} {:>10}\n",
        pollutant_display_name(&report.pollutant),
        report.facility,
        report.model.order,
        "Time (UTC)",
        "Forecast",
        "Lower",
        "Upper"
    );
    for i in 0..fc.len() {
        out.push_str(&format!(
            "{:<18} {:>10.2} {:>10.2} {:>10.2}\n",
            fc.index[i].format(TIME_FORMAT).to_string(),
            fc.mean[i],
            fc.lower[i],
            fc.upper[i]
        ));
    }
    out
}
