use anyhow::{bail, Result};

use crate::history::DailyObservation;

/// Minimum rows for a usable split (a validation window of two rows).
pub const MIN_SPLIT_ROWS: usize = 20;

/// Train/validation partition of a daily series.
///
/// With `t = rows / 10`, the validation window is rows `[n - t, n - t/2)`
/// and the training frame is everything before `n - t/2`, i.e. the training
/// rows followed by the validation window. The last `t/2` rows are held out.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainValidationSplit {
    pub train: Vec<DailyObservation>,
    pub validation: Vec<DailyObservation>,
}

impl TrainValidationSplit {
    pub fn new(series: &[DailyObservation]) -> Result<Self> {
        let n = series.len();
        if n < MIN_SPLIT_ROWS {
            bail!(
                "Need at least {} daily rows to split, got {}",
                MIN_SPLIT_ROWS,
                n
            );
        }

        let test_len = n / 10;
        let validation_start = n - test_len;
        let validation_end = n - test_len / 2;

        Ok(Self {
            train: series[..validation_end].to_vec(),
            validation: series[validation_start..validation_end].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rows(n: usize) -> Vec<DailyObservation> {
        NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .iter_days()
            .take(n)
            .enumerate()
            .map(|(i, date)| DailyObservation {
                date,
                value: Some(i as f64),
            })
            .collect()
    }

    #[test]
    fn test_hundred_rows() {
        let series = rows(100);
        let split = TrainValidationSplit::new(&series).unwrap();

        assert_eq!(split.train.len(), 95);
        assert_eq!(split.validation.len(), 5);
        assert_eq!(split.validation[0].value, Some(90.0));
        assert_eq!(split.validation[4].value, Some(94.0));
        assert_eq!(split.train.last(), split.validation.last());
        assert_eq!(series.len() - split.train.len(), 5);
    }

    #[test]
    fn test_odd_validation_length_rounds_holdout_down() {
        // t = 23, validation [214, 226), holdout 11
        let series = rows(237);
        let split = TrainValidationSplit::new(&series).unwrap();

        assert_eq!(split.validation.len(), 12);
        assert_eq!(split.validation[0].value, Some(214.0));
        assert_eq!(series.len() - split.train.len(), 11);
    }

    #[test]
    fn test_too_short_series() {
        assert!(TrainValidationSplit::new(&rows(19)).is_err());
        assert!(TrainValidationSplit::new(&rows(20)).is_ok());
    }
}
