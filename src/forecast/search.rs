//! Hyperparameter search with Tree-structured Parzen Estimators.
//!
//! Each dimension gets its own TPE optimizer; a trial asks every optimizer
//! for a value, fits the model on the training frame and reports the
//! validation MAE back to all of them.

use anyhow::{anyhow, bail, Result};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::history::DailyObservation;

use super::model::ForecastModel;
use super::params::{Hyperparameters, SeasonalityMode};
use super::split::TrainValidationSplit;

pub const CHANGEPOINT_PRIOR_SCALE: (f64, f64) = (0.005, 5.0);
pub const CHANGEPOINT_RANGE: (f64, f64) = (0.1, 0.9);
pub const SEASONALITY_PRIOR_SCALE: (f64, f64) = (0.1, 10.0);
pub const YEARLY_SEASONALITY: (f64, f64) = (1.0, 50.0);
pub const HOLIDAYS_PRIOR_SCALE: (f64, f64) = (0.1, 10.0);
pub const SEASONALITY_MODES: [SeasonalityMode; 2] =
    [SeasonalityMode::Multiplicative, SeasonalityMode::Additive];

/// Result of a completed search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub best: Hyperparameters,
    pub best_mae: f64,
    pub completed_trials: usize,
    pub failed_trials: usize,
}

/// Bounded-trial search minimizing validation mean absolute error.
#[derive(Debug, Clone)]
pub struct ParamSearch {
    trials: usize,
    seed: Option<u64>,
    interval_width: f64,
}

impl ParamSearch {
    pub fn new(trials: usize, seed: Option<u64>, interval_width: f64) -> Self {
        Self {
            trials,
            seed,
            interval_width,
        }
    }

    pub fn run(&self, split: &TrainValidationSplit) -> Result<SearchOutcome> {
        if self.trials == 0 {
            bail!("Search needs at least one trial");
        }
        if !split.validation.iter().any(|d| d.value.is_some()) {
            bail!("Validation window has no observations");
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut changepoint_prior_scale = continuous(CHANGEPOINT_PRIOR_SCALE)?;
        let mut changepoint_range = continuous(CHANGEPOINT_RANGE)?;
        let mut seasonality_prior_scale = continuous(SEASONALITY_PRIOR_SCALE)?;
        let mut yearly_seasonality = continuous(discrete_axis(YEARLY_SEASONALITY))?;
        let mut holidays_prior_scale = continuous(HOLIDAYS_PRIOR_SCALE)?;
        let mode_bounds = (0.0, (SEASONALITY_MODES.len() - 1) as f64);
        let mut seasonality_mode = continuous(discrete_axis(mode_bounds))?;

        let mut best: Option<(Hyperparameters, f64)> = None;
        let mut failed_trials = 0;

        for trial in 0..self.trials {
            let raw = [
                changepoint_prior_scale.ask(&mut rng).map_err(tpe_error)?,
                changepoint_range.ask(&mut rng).map_err(tpe_error)?,
                seasonality_mode.ask(&mut rng).map_err(tpe_error)?,
                seasonality_prior_scale.ask(&mut rng).map_err(tpe_error)?,
                yearly_seasonality.ask(&mut rng).map_err(tpe_error)?,
                holidays_prior_scale.ask(&mut rng).map_err(tpe_error)?,
            ];

            let mode_index = decode_discrete(raw[2], mode_bounds) as usize;
            let params = Hyperparameters {
                changepoint_prior_scale: clamp(raw[0], CHANGEPOINT_PRIOR_SCALE),
                changepoint_range: clamp(raw[1], CHANGEPOINT_RANGE),
                seasonality_mode: SEASONALITY_MODES[mode_index],
                seasonality_prior_scale: clamp(raw[3], SEASONALITY_PRIOR_SCALE),
                yearly_seasonality: decode_discrete(raw[4], YEARLY_SEASONALITY),
                holidays_prior_scale: clamp(raw[5], HOLIDAYS_PRIOR_SCALE),
            };

            let mae = match self.evaluate(split, &params) {
                Ok(mae) => mae,
                Err(e) => {
                    debug!("Trial {} failed: {:#}", trial, e);
                    failed_trials += 1;
                    continue;
                },
            };

            changepoint_prior_scale.tell(raw[0], mae).map_err(tpe_error)?;
            changepoint_range.tell(raw[1], mae).map_err(tpe_error)?;
            seasonality_mode.tell(raw[2], mae).map_err(tpe_error)?;
            seasonality_prior_scale.tell(raw[3], mae).map_err(tpe_error)?;
            yearly_seasonality.tell(raw[4], mae).map_err(tpe_error)?;
            holidays_prior_scale.tell(raw[5], mae).map_err(tpe_error)?;

            if best.as_ref().map_or(true, |(_, best_mae)| mae < *best_mae) {
                best = Some((params, mae));
            }
        }

        let Some((best, best_mae)) = best else {
            bail!("All {} trials failed", self.trials);
        };

        info!(
            "Search finished: best MAE {:.6} over {} trials ({} failed)",
            best_mae,
            self.trials - failed_trials,
            failed_trials
        );

        Ok(SearchOutcome {
            best,
            best_mae,
            completed_trials: self.trials - failed_trials,
            failed_trials,
        })
    }

    /// Validation MAE of a model fitted with `params` on the training frame.
    pub fn evaluate(&self, split: &TrainValidationSplit, params: &Hyperparameters) -> Result<f64> {
        let model = ForecastModel::fit(&split.train, params, self.interval_width)?;
        let mae = mean_absolute_error(&model, &split.validation)
            .ok_or_else(|| anyhow!("Validation window has no observations"))?;
        if !mae.is_finite() {
            bail!("Validation error is not finite");
        }
        Ok(mae)
    }
}

/// Mean absolute error of the model's point forecast over observed rows.
pub fn mean_absolute_error(model: &ForecastModel, rows: &[DailyObservation]) -> Option<f64> {
    let errors: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.value.map(|v| (v - model.predict(row.date).yhat).abs()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(errors.iter().sum::<f64>() / errors.len() as f64)
    }
}

fn continuous(bounds: (f64, f64)) -> Result<tpe::TpeOptimizer> {
    Ok(tpe::TpeOptimizer::new(
        tpe::parzen_estimator(),
        tpe::range(bounds.0, bounds.1).map_err(tpe_error)?,
    ))
}

/// Sampling range for an integer axis: every value, the end points included,
/// owns a unit-wide slice.
fn discrete_axis(bounds: (f64, f64)) -> (f64, f64) {
    (bounds.0 - 0.5, bounds.1 + 0.5)
}

fn decode_discrete(raw: f64, bounds: (f64, f64)) -> u32 {
    clamp(raw.round(), bounds) as u32
}

fn clamp(value: f64, bounds: (f64, f64)) -> f64 {
    value.clamp(bounds.0, bounds.1)
}

fn tpe_error(e: impl std::fmt::Debug) -> anyhow::Error {
    anyhow!("TPE optimizer error: {:?}", e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noisy_series(days: usize) -> Vec<DailyObservation> {
        NaiveDate::from_ymd_opt(2021, 5, 5)
            .unwrap()
            .iter_days()
            .take(days)
            .enumerate()
            .map(|(i, date)| DailyObservation {
                date,
                value: Some(1800.0 + 2.0 * i as f64 + ((i * 37) % 11) as f64),
            })
            .collect()
    }

    #[test]
    fn test_search_respects_bounds() {
        let series = noisy_series(240);
        let split = TrainValidationSplit::new(&series).unwrap();

        let outcome = ParamSearch::new(12, Some(7), 0.95).run(&split).unwrap();
        let best = outcome.best;

        assert_eq!(outcome.completed_trials + outcome.failed_trials, 12);
        assert!(outcome.best_mae.is_finite() && outcome.best_mae >= 0.0);
        assert!((0.005..=5.0).contains(&best.changepoint_prior_scale));
        assert!((0.1..=0.9).contains(&best.changepoint_range));
        assert!((0.1..=10.0).contains(&best.seasonality_prior_scale));
        assert!((1..=50).contains(&best.yearly_seasonality));
        assert!((0.1..=10.0).contains(&best.holidays_prior_scale));
    }

    #[test]
    fn test_best_trial_matches_its_reported_error() {
        let series = noisy_series(200);
        let split = TrainValidationSplit::new(&series).unwrap();
        let search = ParamSearch::new(6, Some(11), 0.95);

        let outcome = search.run(&split).unwrap();

        let rescored = search.evaluate(&split, &outcome.best).unwrap();
        assert!((rescored - outcome.best_mae).abs() < 1e-9);
    }

    #[test]
    fn test_validation_without_observations_fails() {
        let mut series = noisy_series(100);
        for row in series.iter_mut().skip(90) {
            row.value = None;
        }
        let split = TrainValidationSplit::new(&series).unwrap();

        assert!(ParamSearch::new(3, Some(1), 0.95).run(&split).is_err());
    }

    #[test]
    fn test_integer_axis_end_points_get_a_full_slice() {
        assert_eq!(discrete_axis(YEARLY_SEASONALITY), (0.5, 50.5));

        assert_eq!(decode_discrete(0.5, YEARLY_SEASONALITY), 1);
        assert_eq!(decode_discrete(1.49, YEARLY_SEASONALITY), 1);
        assert_eq!(decode_discrete(1.5, YEARLY_SEASONALITY), 2);
        assert_eq!(decode_discrete(49.5, YEARLY_SEASONALITY), 50);
        assert_eq!(decode_discrete(50.5, YEARLY_SEASONALITY), 50);

        let modes = (0.0, 1.0);
        assert_eq!(discrete_axis(modes), (-0.5, 1.5));
        assert_eq!(decode_discrete(-0.5, modes), 0);
        assert_eq!(decode_discrete(1.49, modes), 1);
    }

    #[test]
    fn test_zero_trials_is_an_error() {
        let split = TrainValidationSplit::new(&noisy_series(100)).unwrap();
        assert!(ParamSearch::new(0, None, 0.95).run(&split).is_err());
    }
}
