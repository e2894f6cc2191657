//! Seasonal ARIMA(p,d,q)(P,D,Q)s estimation and forecasting.
//!
//! The series is differenced with `(1-B)^d (1-B^s)^D`, an ARMA model with
//! multiplicative seasonal polynomials is fitted to the differenced values
//! by conditional sum of squares (Levenberg-Marquardt), and forecasts are
//! re-integrated back to the original scale. Interval widths come from the
//! MA(∞) weights of the full model, so they widen with the horizon the way
//! an integrated process should.
//!
//! Stationarity and invertibility are not enforced on the estimates.

use chrono::Duration;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{DMatrix, DVector, Dyn, Owned};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt;

use crate::analysis::series::RegularSeries;
use crate::logging::{self, DataSource};
use crate::model::{Forecast, ForecastError};

/// Differenced variance below this fraction of the series' mean square is
/// treated as a perfect fit.
const DEGENERATE_RELATIVE_VARIANCE: f64 = 1e-16;

/// Residual magnitudes are capped here so that divergent trial steps stay
/// finite and are simply rejected by the optimizer.
const RESIDUAL_CAP: f64 = 1e100;

/// Forward-difference step for the numerical Jacobian, relative to |param|.
const JACOBIAN_STEP: f64 = 1e-7;

/// Evaluation budget factor passed to Levenberg-Marquardt.
const FIT_PATIENCE: usize = 200;

/// Starting AR values are clamped inside the unit interval.
const MAX_INITIAL_AR: f64 = 0.9;

// ---------------------------------------------------------------------------
// Model order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SarimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub period: usize,
}

impl SarimaOrder {
    /// (1,1,1)(1,1,1) with a 24-hour season, used for hourly pollutant data.
    pub const HOURLY_DAILY: SarimaOrder = SarimaOrder {
        p: 1,
        d: 1,
        q: 1,
        seasonal_p: 1,
        seasonal_d: 1,
        seasonal_q: 1,
        period: 24,
    };

    pub fn n_params(&self) -> usize {
        self.p + self.q + self.seasonal_p + self.seasonal_q
    }

    /// Number of leading values consumed by differencing.
    pub fn differencing_lag(&self) -> usize {
        self.d + self.seasonal_d * self.period
    }

    /// Shortest series that can be fitted: two full seasons, and enough
    /// differenced points to leave more residuals than parameters.
    pub fn min_series_len(&self) -> usize {
        (2 * self.period).max(self.differencing_lag() + self.n_params() + 1)
    }
}

impl Default for SarimaOrder {
    fn default() -> Self {
        Self::HOURLY_DAILY
    }
}

impl fmt::Display for SarimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SARIMA({},{},{})({},{},{})[{}]",
            self.p, self.d, self.q, self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period
        )
    }
}

// ---------------------------------------------------------------------------
// Parameters and lag polynomials
// ---------------------------------------------------------------------------

/// Estimated coefficients. AR terms follow `y_t = φ y_{t-1} + ...`, MA terms
/// follow `... + ε_t + θ ε_{t-1}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SarimaParams {
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub seasonal_ar: Vec<f64>,
    pub seasonal_ma: Vec<f64>,
}

impl SarimaParams {
    /// Split a flat `[ar.., ma.., sar.., sma..]` vector.
    fn from_flat(order: &SarimaOrder, flat: &[f64]) -> Self {
        let (ar, rest) = flat.split_at(order.p);
        let (ma, rest) = rest.split_at(order.q);
        let (seasonal_ar, seasonal_ma) = rest.split_at(order.seasonal_p);
        Self {
            ar: ar.to_vec(),
            ma: ma.to_vec(),
            seasonal_ar: seasonal_ar.to_vec(),
            seasonal_ma: seasonal_ma[..order.seasonal_q].to_vec(),
        }
    }

    /// `φ(B)Φ(B^s)` as coefficients of `B^0, B^1, ...`.
    fn ar_polynomial(&self, period: usize) -> Vec<f64> {
        poly_mul(
            &lag_polynomial(&self.ar, 1, -1.0),
            &lag_polynomial(&self.seasonal_ar, period, -1.0),
        )
    }

    /// `θ(B)Θ(B^s)` as coefficients of `B^0, B^1, ...`.
    fn ma_polynomial(&self, period: usize) -> Vec<f64> {
        poly_mul(
            &lag_polynomial(&self.ma, 1, 1.0),
            &lag_polynomial(&self.seasonal_ma, period, 1.0),
        )
    }
}

/// `1 + sign * Σ c_k B^(k*spacing)`.
fn lag_polynomial(coeffs: &[f64], spacing: usize, sign: f64) -> Vec<f64> {
    let mut poly = vec![0.0; coeffs.len() * spacing + 1];
    poly[0] = 1.0;
    for (k, c) in coeffs.iter().enumerate() {
        poly[(k + 1) * spacing] = sign * c;
    }
    poly
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Non-zero `(lag, coefficient)` pairs of a polynomial, excluding `B^0`.
fn lag_terms(poly: &[f64]) -> Vec<(usize, f64)> {
    poly.iter()
        .enumerate()
        .skip(1)
        .filter(|(_, c)| **c != 0.0)
        .map(|(lag, c)| (lag, *c))
        .collect()
}

/// `(1-B)^d (1-B^s)^D`.
pub fn differencing_polynomial(order: &SarimaOrder) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..order.d {
        poly = poly_mul(&poly, &[1.0, -1.0]);
    }
    let seasonal = lag_polynomial(&[1.0], order.period, -1.0);
    for _ in 0..order.seasonal_d {
        poly = poly_mul(&poly, &seasonal);
    }
    poly
}

/// Apply a differencing polynomial; the result is `len - degree` long.
fn difference(values: &[f64], poly: &[f64]) -> Vec<f64> {
    let lag = poly.len() - 1;
    (lag..values.len())
        .map(|t| {
            poly.iter()
                .enumerate()
                .map(|(i, c)| c * values[t - i])
                .sum()
        })
        .collect()
}

/// One-step residuals of `ar(B) w_t = ma(B) e_t`, with zero pre-sample values.
fn css_residuals(w: &[f64], ar_poly: &[f64], ma_poly: &[f64]) -> Vec<f64> {
    let ar_terms = lag_terms(ar_poly);
    let ma_terms = lag_terms(ma_poly);
    let mut e = vec![0.0; w.len()];
    for t in 0..w.len() {
        let mut value = w[t];
        for &(lag, c) in ar_terms.iter().filter(|(lag, _)| *lag <= t) {
            value += c * w[t - lag];
        }
        for &(lag, c) in ma_terms.iter().filter(|(lag, _)| *lag <= t) {
            value -= c * e[t - lag];
        }
        e[t] = if value.is_finite() {
            value.clamp(-RESIDUAL_CAP, RESIDUAL_CAP)
        } else {
            RESIDUAL_CAP
        };
    }
    e
}

/// MA(∞) weights ψ_0..ψ_{count-1} of `full_ar(B) y_t = ma(B) e_t`.
pub fn psi_weights(full_ar: &[f64], ma_poly: &[f64], count: usize) -> Vec<f64> {
    let mut psi: Vec<f64> = Vec::with_capacity(count);
    for j in 0..count {
        let mut value = if j == 0 {
            1.0
        } else {
            ma_poly.get(j).copied().unwrap_or(0.0)
        };
        for i in 1..=j.min(full_ar.len() - 1) {
            value -= full_ar[i] * psi[j - i];
        }
        psi.push(value);
    }
    psi
}

fn autocorrelation(w: &[f64], lag: usize) -> f64 {
    let n = w.len();
    if lag >= n {
        return 0.0;
    }
    let mean = w.iter().sum::<f64>() / n as f64;
    let denom: f64 = w.iter().map(|v| (v - mean).powi(2)).sum();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    let num: f64 = (lag..n).map(|t| (w[t] - mean) * (w[t - lag] - mean)).sum();
    num / denom
}

// ---------------------------------------------------------------------------
// Least-squares problem
// ---------------------------------------------------------------------------

struct CssProblem {
    order: SarimaOrder,
    w: Vec<f64>,
    params: DVector<f64>,
}

impl CssProblem {
    fn residuals_for(&self, flat: &[f64]) -> Vec<f64> {
        let params = SarimaParams::from_flat(&self.order, flat);
        css_residuals(
            &self.w,
            &params.ar_polynomial(self.order.period),
            &params.ma_polynomial(self.order.period),
        )
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for CssProblem {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, p: &DVector<f64>) {
        self.params.copy_from(p);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(DVector::from_vec(self.residuals_for(self.params.as_slice())))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let base = self.residuals_for(self.params.as_slice());
        let mut jac = DMatrix::<f64>::zeros(base.len(), self.params.len());
        for col in 0..self.params.len() {
            let mut shifted = self.params.clone();
            let step = JACOBIAN_STEP * (1.0 + shifted[col].abs());
            shifted[col] += step;
            let moved = self.residuals_for(shifted.as_slice());
            for row in 0..base.len() {
                jac[(row, col)] = (moved[row] - base[row]) / step;
            }
        }
        Some(jac)
    }
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

/// Whether the optimizer converged, or the fit error when it broke down.
/// Exhausting the evaluation budget is a usable, non-converged fit.
fn termination_outcome(reason: &TerminationReason) -> Result<bool, ForecastError> {
    match reason {
        TerminationReason::LostPatience | TerminationReason::NoImprovementPossible(_) => Ok(false),
        reason if reason.was_successful() => Ok(true),
        reason => Err(ForecastError::ModelFit(format!(
            "optimizer stopped: {:?}",
            reason
        ))),
    }
}

/// Unfitted model specification.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sarima {
    order: SarimaOrder,
}

impl Sarima {
    pub fn new(order: SarimaOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> SarimaOrder {
        self.order
    }

    /// Starting point: lag-1 and lag-s autocorrelations for the leading AR
    /// terms, zero elsewhere.
    fn initial_params(&self, w: &[f64]) -> Vec<f64> {
        let order = &self.order;
        let mut flat = vec![0.0; order.n_params()];
        if order.p > 0 {
            flat[0] = autocorrelation(w, 1).clamp(-MAX_INITIAL_AR, MAX_INITIAL_AR);
        }
        if order.seasonal_p > 0 {
            flat[order.p + order.q] =
                autocorrelation(w, order.period).clamp(-MAX_INITIAL_AR, MAX_INITIAL_AR);
        }
        flat
    }

    /// Estimate the model on the full series.
    ///
    /// Fails with `InsufficientHistory` below `order.min_series_len()` and
    /// with `ModelFit` when the optimizer breaks down numerically. Running
    /// out of iterations is not a failure; check `FittedSarima::converged`.
    ///
    /// Seasonal AR/MA terms only enter the residuals once the differenced
    /// series is longer than one period. Near the minimum length (48 or 49
    /// points for the default order) they stay at zero; check
    /// `FittedSarima::seasonal_estimated`.
    pub fn fit(&self, series: &RegularSeries) -> Result<FittedSarima, ForecastError> {
        let order = self.order;
        let y = series.values();
        let required = order.min_series_len();
        if y.len() < required {
            return Err(ForecastError::InsufficientHistory {
                required,
                actual: y.len(),
            });
        }

        let w = difference(y, &differencing_polynomial(&order));
        let m = w.len() as f64;
        let seasonal_estimated =
            order.seasonal_p + order.seasonal_q == 0 || w.len() > order.period;
        if !seasonal_estimated {
            logging::debug(
                DataSource::Model,
                None,
                &format!(
                    "{} differenced points do not reach lag {}; seasonal terms left at zero",
                    w.len(),
                    order.period
                ),
            );
        }
        let w_mean_square = w.iter().map(|v| v * v).sum::<f64>() / m;
        let y_mean_square = y.iter().map(|v| v * v).sum::<f64>() / y.len() as f64;
        let degenerate = w_mean_square <= DEGENERATE_RELATIVE_VARIANCE * y_mean_square.max(1.0);

        let (flat, converged, evaluations) = if degenerate || order.n_params() == 0 {
            (vec![0.0; order.n_params()], true, 0)
        } else {
            let initial = self.initial_params(&w);
            let problem = CssProblem {
                order,
                w: w.clone(),
                params: DVector::from_vec(initial),
            };
            let (problem, report) = LevenbergMarquardt::new()
                .with_patience(FIT_PATIENCE)
                .minimize(problem);

            let converged = termination_outcome(&report.termination)?;
            (
                problem.params.as_slice().to_vec(),
                converged,
                report.number_of_evaluations,
            )
        };

        if flat.iter().any(|p| !p.is_finite()) {
            return Err(ForecastError::ModelFit(
                "non-finite parameter estimate".to_string(),
            ));
        }

        let params = SarimaParams::from_flat(&order, &flat);
        let residuals = css_residuals(
            &w,
            &params.ar_polynomial(order.period),
            &params.ma_polynomial(order.period),
        );
        let sigma2 = residuals.iter().map(|e| e * e).sum::<f64>() / m;
        if !sigma2.is_finite() || residuals.iter().any(|e| e.abs() >= RESIDUAL_CAP) {
            return Err(ForecastError::ModelFit(
                "residuals diverged for the estimated parameters".to_string(),
            ));
        }

        logging::debug(
            DataSource::Model,
            None,
            &format!(
                "{} fit: ar={:?} ma={:?} sar={:?} sma={:?} sigma2={:.6} evals={}",
                order,
                params.ar,
                params.ma,
                params.seasonal_ar,
                params.seasonal_ma,
                sigma2,
                evaluations
            ),
        );

        Ok(FittedSarima {
            order,
            params,
            sigma2,
            converged,
            seasonal_estimated,
            evaluations,
            history: y.to_vec(),
            differenced: w,
            residuals,
            last_timestamp: series.last_timestamp(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fitted model
// ---------------------------------------------------------------------------

/// A model estimated on one series. Holds what forecasting needs: the
/// original values, the differenced values, and the in-sample residuals.
#[derive(Debug, Clone)]
pub struct FittedSarima {
    order: SarimaOrder,
    params: SarimaParams,
    sigma2: f64,
    converged: bool,
    seasonal_estimated: bool,
    evaluations: usize,
    history: Vec<f64>,
    differenced: Vec<f64>,
    residuals: Vec<f64>,
    last_timestamp: chrono::DateTime<chrono::Utc>,
}

impl FittedSarima {
    pub fn order(&self) -> SarimaOrder {
        self.order
    }

    pub fn params(&self) -> &SarimaParams {
        &self.params
    }

    /// Innovation variance (residual sum of squares / residual count).
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// False when the series was too short for the seasonal lag to affect
    /// the fit, so the seasonal coefficients are placeholders.
    pub fn seasonal_estimated(&self) -> bool {
        self.seasonal_estimated
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Conditional Gaussian log-likelihood. Infinite for an exact fit.
    pub fn log_likelihood(&self) -> f64 {
        let m = self.differenced.len() as f64;
        -0.5 * m * ((2.0 * std::f64::consts::PI * self.sigma2).ln() + 1.0)
    }

    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood() + 2.0 * (self.order.n_params() + 1) as f64
    }

    /// Forecast `horizon` hours past the last observation with a two-sided
    /// interval at `confidence_level` (e.g. 0.95).
    pub fn forecast(
        &self,
        horizon: usize,
        confidence_level: f64,
    ) -> Result<Forecast, ForecastError> {
        if horizon == 0 {
            return Err(ForecastError::InvalidHorizon(horizon));
        }
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(ForecastError::InvalidConfidenceLevel(confidence_level));
        }

        let period = self.order.period;
        let ar_poly = self.params.ar_polynomial(period);
        let ma_poly = self.params.ma_polynomial(period);

        // ARMA recursion on the differenced scale; future shocks are zero.
        let ar_terms = lag_terms(&ar_poly);
        let ma_terms = lag_terms(&ma_poly);
        let mut w = self.differenced.clone();
        let mut e = self.residuals.clone();
        for _ in 0..horizon {
            let t = w.len();
            let mut next = 0.0;
            for &(lag, c) in ar_terms.iter().filter(|(lag, _)| *lag <= t) {
                next -= c * w[t - lag];
            }
            for &(lag, c) in ma_terms.iter().filter(|(lag, _)| *lag <= t) {
                next += c * e[t - lag];
            }
            w.push(next);
            e.push(0.0);
        }

        // Undo differencing: y_t = w_{t-L} - Σ δ_i y_{t-i}.
        let diff_poly = differencing_polynomial(&self.order);
        let diff_terms = lag_terms(&diff_poly);
        let lag = diff_poly.len() - 1;
        let n = self.history.len();
        let mut y = self.history.clone();
        for t in n..n + horizon {
            let mut next = w[t - lag];
            for &(i, c) in &diff_terms {
                next -= c * y[t - i];
            }
            y.push(next);
        }
        let mean = y.split_off(n);

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::ModelFit(format!("normal quantile: {}", e)))?;
        let z = normal.inverse_cdf(0.5 + confidence_level / 2.0);

        let psi = psi_weights(&poly_mul(&ar_poly, &diff_poly), &ma_poly, horizon);
        let mut cumulative = 0.0;
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for (h, point) in mean.iter().enumerate() {
            cumulative += psi[h] * psi[h];
            let half_width = z * (self.sigma2 * cumulative).sqrt();
            lower.push(point - half_width);
            upper.push(point + half_width);
        }

        let index = (1..=horizon)
            .map(|h| self.last_timestamp + Duration::hours(h as i64))
            .collect();

        Ok(Forecast {
            index,
            mean,
            lower,
            upper,
        })
    }
}
