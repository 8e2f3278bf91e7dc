//! Additive trend + yearly seasonality forecasting model.
//!
//! The series is modelled as
//!
//! ```text
//! y(t) = g(t) + s(t)            (additive)
//! y(t) = g(t) * (1 + s(t))      (multiplicative)
//! ```
//!
//! where `g` is a piecewise-linear trend with changepoints placed over the
//! first `changepoint_range` share of the history and `s` is a Fourier series
//! with period 365.25 days. Priors on changepoint deltas and seasonality
//! coefficients are applied as ridge penalties scaled by the respective prior
//! scale. The prediction band combines residual noise with the trend
//! uncertainty implied by future changepoints at the historical rate.

use std::f64::consts::PI;

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::history::DailyObservation;

use super::params::{Hyperparameters, SeasonalityMode};

/// Assumed observation noise variance on the scaled series. Converts prior
/// scales into ridge penalties.
const NOISE_VARIANCE: f64 = 0.01;

/// Prior variance of the base slope and offset.
const TREND_PRIOR_VARIANCE: f64 = 25.0;

const MAX_CHANGEPOINTS: usize = 25;

const YEAR_DAYS: f64 = 365.25;

/// Alternating trend/seasonality passes for the multiplicative fit.
const MULTIPLICATIVE_ROUNDS: usize = 5;

/// Minimum non-empty observations needed to fit.
const MIN_OBSERVATIONS: usize = 2;

/// Model output for a single day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub trend: f64,
    pub seasonal: f64,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

impl ForecastPoint {
    /// Width of the upper prediction band above the point estimate.
    pub fn upper_bound(&self) -> f64 {
        (self.yhat_upper - self.yhat).max(0.0)
    }
}

/// A fitted model. Cheap to query for any date.
#[derive(Debug, Clone)]
pub struct ForecastModel {
    mode: SeasonalityMode,
    order: usize,
    start: NaiveDate,
    span_days: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    offset: f64,
    slope: f64,
    deltas: Vec<f64>,
    seasonal_coefficients: Vec<f64>,
    sigma: f64,
    delta_scale: f64,
    z: f64,
}

impl ForecastModel {
    /// Fits the model to a daily series. Empty days are skipped.
    pub fn fit(
        history: &[DailyObservation],
        params: &Hyperparameters,
        interval_width: f64,
    ) -> Result<Self> {
        validate(params, interval_width)?;

        let observations: Vec<(NaiveDate, f64)> = history
            .iter()
            .filter_map(|d| d.value.filter(|v| v.is_finite()).map(|v| (d.date, v)))
            .collect();

        if observations.len() < MIN_OBSERVATIONS {
            bail!(
                "Need at least {} observations to fit, got {}",
                MIN_OBSERVATIONS,
                observations.len()
            );
        }

        let start = observations[0].0;
        let end = observations[observations.len() - 1].0;
        let span_days = (end - start).num_days() as f64;
        if span_days <= 0.0 {
            bail!("Observations must cover at least two distinct days");
        }

        let y_scale = observations
            .iter()
            .map(|(_, v)| v.abs())
            .fold(0.0, f64::max);
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };

        let t: Vec<f64> = observations
            .iter()
            .map(|(date, _)| (*date - start).num_days() as f64 / span_days)
            .collect();
        let y: Vec<f64> = observations.iter().map(|(_, v)| v / y_scale).collect();

        let changepoints = place_changepoints(&t, params.changepoint_range);
        let order = params.yearly_seasonality as usize;

        let trend_rows: Vec<Vec<f64>> = t.iter().map(|&ti| trend_row(ti, &changepoints)).collect();
        let seasonal_rows: Vec<Vec<f64>> = observations
            .iter()
            .map(|(date, _)| fourier_row(*date, order))
            .collect();

        let mut trend_penalties = vec![NOISE_VARIANCE / TREND_PRIOR_VARIANCE; 2];
        // Laplace(0, b) has variance 2b²
        let delta_variance = 2.0 * params.changepoint_prior_scale.powi(2);
        trend_penalties.extend(std::iter::repeat(NOISE_VARIANCE / delta_variance).take(changepoints.len()));
        let seasonal_penalties =
            vec![NOISE_VARIANCE / params.seasonality_prior_scale.powi(2); 2 * order];

        let (trend_coefficients, seasonal_coefficients) = match params.seasonality_mode {
            SeasonalityMode::Additive => {
                let rows: Vec<Vec<f64>> = trend_rows
                    .iter()
                    .zip(&seasonal_rows)
                    .map(|(tr, sr)| tr.iter().chain(sr).copied().collect())
                    .collect();
                let penalties: Vec<f64> = trend_penalties
                    .iter()
                    .chain(&seasonal_penalties)
                    .copied()
                    .collect();

                let mut beta = solve_ridge(&rows, &y, None, &penalties)?;
                let seasonal = beta.split_off(trend_penalties.len());
                (beta, seasonal)
            },
            SeasonalityMode::Multiplicative => fit_multiplicative(
                &trend_rows,
                &seasonal_rows,
                &y,
                &trend_penalties,
                &seasonal_penalties,
            )?,
        };

        let mut model = Self {
            mode: params.seasonality_mode,
            order,
            start,
            span_days,
            y_scale,
            changepoints,
            offset: trend_coefficients[0],
            slope: trend_coefficients[1],
            deltas: trend_coefficients[2..].to_vec(),
            seasonal_coefficients,
            sigma: 0.0,
            delta_scale: 0.0,
            z: band_quantile(interval_width)?,
        };

        let residual_ss: f64 = observations
            .iter()
            .zip(&y)
            .map(|((date, _), yi)| {
                let (trend, seasonal) = model.components_scaled(*date);
                (yi - model.combine(trend, seasonal)).powi(2)
            })
            .sum();
        model.sigma = (residual_ss / (observations.len() - 1) as f64).sqrt();
        model.delta_scale = if model.deltas.is_empty() {
            0.0
        } else {
            model.deltas.iter().map(|d| d.abs()).sum::<f64>() / model.deltas.len() as f64 + 1e-8
        };

        Ok(model)
    }

    /// Forecast for a single day, inside or beyond the fitted history.
    pub fn predict(&self, date: NaiveDate) -> ForecastPoint {
        let (trend, seasonal) = self.components_scaled(date);
        let yhat = self.combine(trend, seasonal);

        // Future changepoints arrive at the historical rate with Laplace
        // deltas; the slope drift variance accumulates as h³/3.
        let horizon = (self.t(date) - 1.0).max(0.0);
        let changepoint_rate = self.changepoints.len() as f64;
        let trend_variance =
            changepoint_rate * 2.0 * self.delta_scale.powi(2) * horizon.powi(3) / 3.0;
        let half_width = self.z * (self.sigma.powi(2) + trend_variance).sqrt() * self.y_scale;

        let yhat = yhat * self.y_scale;
        ForecastPoint {
            date,
            trend: trend * self.y_scale,
            seasonal: yhat - trend * self.y_scale,
            yhat,
            yhat_lower: yhat - half_width,
            yhat_upper: yhat + half_width,
        }
    }

    fn t(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64 / self.span_days
    }

    fn components_scaled(&self, date: NaiveDate) -> (f64, f64) {
        let t = self.t(date);
        let trend = self.offset
            + self.slope * t
            + self
                .changepoints
                .iter()
                .zip(&self.deltas)
                .map(|(s, delta)| delta * (t - s).max(0.0))
                .sum::<f64>();
        let seasonal = dot(&fourier_row(date, self.order), &self.seasonal_coefficients);
        (trend, seasonal)
    }

    fn combine(&self, trend: f64, seasonal: f64) -> f64 {
        match self.mode {
            SeasonalityMode::Additive => trend + seasonal,
            SeasonalityMode::Multiplicative => trend * (1.0 + seasonal),
        }
    }
}

fn validate(params: &Hyperparameters, interval_width: f64) -> Result<()> {
    if !(params.changepoint_range > 0.0 && params.changepoint_range <= 1.0) {
        bail!(
            "changepoint_range must be in (0, 1], got {}",
            params.changepoint_range
        );
    }
    if !(params.changepoint_prior_scale > 0.0 && params.changepoint_prior_scale.is_finite()) {
        bail!(
            "changepoint_prior_scale must be positive, got {}",
            params.changepoint_prior_scale
        );
    }
    if !(params.seasonality_prior_scale > 0.0 && params.seasonality_prior_scale.is_finite()) {
        bail!(
            "seasonality_prior_scale must be positive, got {}",
            params.seasonality_prior_scale
        );
    }
    if !(interval_width > 0.0 && interval_width < 1.0) {
        bail!("interval_width must be in (0, 1), got {}", interval_width);
    }
    Ok(())
}

/// Two-sided normal quantile for the requested band coverage.
fn band_quantile(interval_width: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| anyhow!("{:?}", e))?;
    Ok(normal.inverse_cdf(0.5 + interval_width / 2.0))
}

/// Evenly spaced changepoints over the first `range` share of observations,
/// excluding the first observation.
fn place_changepoints(t: &[f64], range: f64) -> Vec<f64> {
    let history_size = (t.len() as f64 * range).floor() as usize;
    let count = MAX_CHANGEPOINTS.min(history_size.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }

    let last = (history_size - 1) as f64;
    (1..=count)
        .map(|i| {
            let idx = (i as f64 * last / count as f64).round() as usize;
            t[idx]
        })
        .collect()
}

fn trend_row(t: f64, changepoints: &[f64]) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + changepoints.len());
    row.push(1.0);
    row.push(t);
    row.extend(changepoints.iter().map(|s| (t - s).max(0.0)));
    row
}

fn fourier_row(date: NaiveDate, order: usize) -> Vec<f64> {
    let days = (date - NaiveDate::default()).num_days() as f64;
    let mut row = Vec::with_capacity(2 * order);
    for n in 1..=order {
        let x = 2.0 * PI * n as f64 * days / YEAR_DAYS;
        row.push(x.sin());
        row.push(x.cos());
    }
    row
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Solves `min Σ wᵢ (yᵢ - xᵢ·β)² + Σ λⱼ βⱼ²` through the Cholesky factor of
/// the penalized normal equations. Penalties must be positive.
fn solve_ridge(
    rows: &[Vec<f64>],
    targets: &[f64],
    weights: Option<&[f64]>,
    penalties: &[f64],
) -> Result<Vec<f64>> {
    let dim = penalties.len();
    if rows.len() != targets.len() {
        bail!(
            "Design matrix has {} rows but {} targets",
            rows.len(),
            targets.len()
        );
    }
    if let Some(row) = rows.iter().find(|row| row.len() != dim) {
        bail!("Design row has {} columns, expected {}", row.len(), dim);
    }
    if penalties.iter().any(|p| !(*p > 0.0) || !p.is_finite()) {
        bail!("Ridge penalties must be positive and finite");
    }

    let scale = |i: usize| weights.map_or(1.0, |w| w[i].max(0.0).sqrt());
    let x = DMatrix::from_fn(rows.len(), dim, |i, j| scale(i) * rows[i][j]);
    let y = DVector::from_fn(targets.len(), |i, _| scale(i) * targets[i]);

    let xt = x.transpose();
    let normal = &xt * &x + DMatrix::from_diagonal(&DVector::from_column_slice(penalties));
    let beta = normal
        .cholesky()
        .ok_or_else(|| anyhow!("Normal equations are not positive definite"))?
        .solve(&(&xt * &y));

    if beta.iter().any(|v| !v.is_finite()) {
        bail!("Ridge solution is not finite");
    }

    Ok(beta.iter().copied().collect())
}

/// Block coordinate descent on `Σ (y - g(1 + s))²`: fit the trend with the
/// seasonal factor fixed, then the seasonal factor with the trend fixed.
fn fit_multiplicative(
    trend_rows: &[Vec<f64>],
    seasonal_rows: &[Vec<f64>],
    y: &[f64],
    trend_penalties: &[f64],
    seasonal_penalties: &[f64],
) -> Result<(Vec<f64>, Vec<f64>)> {
    let n = y.len();
    let mut seasonal = vec![0.0_f64; n];
    let mut trend_coefficients = vec![0.0; trend_penalties.len()];
    let mut seasonal_coefficients = vec![0.0; seasonal_penalties.len()];

    for _ in 0..MULTIPLICATIVE_ROUNDS {
        let mut targets = vec![0.0; n];
        let mut weights = vec![0.0; n];
        for i in 0..n {
            let factor = 1.0 + seasonal[i];
            if factor.abs() > 1e-6 {
                targets[i] = y[i] / factor;
                weights[i] = factor * factor;
            }
        }
        trend_coefficients = solve_ridge(trend_rows, &targets, Some(&weights), trend_penalties)?;

        if seasonal_penalties.is_empty() {
            break;
        }

        for i in 0..n {
            let trend = dot(&trend_rows[i], &trend_coefficients);
            if trend.abs() > 1e-6 {
                targets[i] = y[i] / trend - 1.0;
                weights[i] = trend * trend;
            } else {
                targets[i] = 0.0;
                weights[i] = 0.0;
            }
        }
        seasonal_coefficients =
            solve_ridge(seasonal_rows, &targets, Some(&weights), seasonal_penalties)?;

        for i in 0..n {
            seasonal[i] = dot(&seasonal_rows[i], &seasonal_coefficients);
        }
    }

    Ok((trend_coefficients, seasonal_coefficients))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(days: usize, f: impl Fn(usize) -> f64) -> Vec<DailyObservation> {
        let start = NaiveDate::from_ymd_opt(2021, 5, 5).unwrap();
        start
            .iter_days()
            .take(days)
            .enumerate()
            .map(|(i, date)| DailyObservation {
                date,
                value: Some(f(i)),
            })
            .collect()
    }

    fn yearly(i: usize) -> f64 {
        let days = (NaiveDate::from_ymd_opt(2021, 5, 5).unwrap() - NaiveDate::default())
            .num_days() as f64
            + i as f64;
        (2.0 * PI * days / YEAR_DAYS).sin()
    }

    fn in_sample_mae(model: &ForecastModel, history: &[DailyObservation]) -> f64 {
        let errors: Vec<f64> = history
            .iter()
            .filter_map(|d| d.value.map(|v| (model.predict(d.date).yhat - v).abs()))
            .collect();
        errors.iter().sum::<f64>() / errors.len() as f64
    }

    #[test]
    fn test_linear_series_tracks_trend() {
        let history = series(200, |i| 100.0 + 0.5 * i as f64);
        let model = ForecastModel::fit(&history, &Hyperparameters::default(), 0.95).unwrap();

        let last = model.predict(history[199].date);
        assert!((last.yhat - 199.5).abs() < 2.0, "yhat = {}", last.yhat);
        assert!(in_sample_mae(&model, &history) < 1.0);
        assert_eq!(model.changepoints.len(), 25);
    }

    #[test]
    fn test_upper_bound_is_non_negative_and_widens_with_horizon() {
        let history = series(300, |i| 20.0 + (i % 7) as f64 * 0.3 + 0.01 * i as f64);
        let model = ForecastModel::fit(&history, &Hyperparameters::default(), 0.95).unwrap();

        let in_sample = model.predict(history[150].date);
        let far = model.predict(history[299].date + chrono::Duration::days(120));

        assert!(in_sample.upper_bound() >= 0.0);
        assert!(far.upper_bound() >= in_sample.upper_bound());
        assert!(far.yhat_lower <= far.yhat && far.yhat <= far.yhat_upper);
    }

    #[test]
    fn test_additive_seasonality_is_captured() {
        let history = series(3 * 365, |i| 50.0 + 10.0 * yearly(i));
        let params = Hyperparameters {
            yearly_seasonality: 3,
            ..Hyperparameters::default()
        };

        let model = ForecastModel::fit(&history, &params, 0.95).unwrap();

        assert!(in_sample_mae(&model, &history) < 1.0);
    }

    #[test]
    fn test_multiplicative_seasonality_is_captured() {
        let history = series(3 * 365, |i| (100.0 + 0.1 * i as f64) * (1.0 + 0.1 * yearly(i)));
        let params = Hyperparameters {
            seasonality_mode: SeasonalityMode::Multiplicative,
            yearly_seasonality: 3,
            ..Hyperparameters::default()
        };

        let model = ForecastModel::fit(&history, &params, 0.95).unwrap();

        assert!(in_sample_mae(&model, &history) < 5.0);
        let point = model.predict(history[500].date);
        assert!(point.trend > 0.0);
    }

    #[test]
    fn test_empty_days_are_skipped() {
        let mut history = series(120, |i| 10.0 + 0.1 * i as f64);
        for day in history.iter_mut().skip(30).step_by(4) {
            day.value = None;
        }

        let model = ForecastModel::fit(&history, &Hyperparameters::default(), 0.95).unwrap();

        let gap = model.predict(history[30].date);
        assert!((gap.yhat - 13.0).abs() < 1.0);
    }

    #[test]
    fn test_ridge_recovers_exact_line_with_tiny_penalty() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![1.0, i as f64]).collect();
        let targets: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();

        let beta = solve_ridge(&rows, &targets, None, &[1e-9, 1e-9]).unwrap();

        assert!((beta[0] - 3.0).abs() < 1e-6);
        assert!((beta[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_ridge_zero_weights_ignore_rows() {
        let rows = vec![vec![1.0], vec![1.0], vec![1.0]];
        let weights = vec![1.0, 1.0, 0.0];

        let beta = solve_ridge(&rows, &[1.0, 1.0, 100.0], Some(&weights), &[1e-9]).unwrap();

        assert!((beta[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ridge_large_penalty_shrinks_towards_zero() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..10).map(|i| 2.0 * i as f64).collect();

        let loose = solve_ridge(&rows, &targets, None, &[1e-6]).unwrap();
        let tight = solve_ridge(&rows, &targets, None, &[1e6]).unwrap();

        assert!((loose[0] - 2.0).abs() < 1e-4);
        assert!(tight[0].abs() < loose[0].abs());
        assert!(solve_ridge(&rows, &targets, None, &[0.0]).is_err());
    }

    #[test]
    fn test_rejects_degenerate_inputs() {
        let params = Hyperparameters::default();

        assert!(ForecastModel::fit(&series(1, |_| 1.0), &params, 0.95).is_err());
        assert!(ForecastModel::fit(&series(30, |_| 1.0), &params, 1.5).is_err());

        let bad_range = Hyperparameters {
            changepoint_range: 0.0,
            ..params
        };
        assert!(ForecastModel::fit(&series(30, |_| 1.0), &bad_range, 0.95).is_err());
    }
}
