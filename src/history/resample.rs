use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::PricePoint;

/// One calendar day of a resampled series. `value` is `None` for days
/// without any observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyObservation {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Resamples observations to exactly one row per calendar day between the
/// first and last observed day.
///
/// Multiple observations on the same day are averaged. Days with no
/// observation are kept as empty rows so row counts stay calendar-aligned.
pub fn resample_daily(points: &[PricePoint]) -> Vec<DailyObservation> {
    let mut buckets: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for point in points.iter().filter(|p| p.price.is_finite()) {
        let bucket = buckets.entry(point.date.date_naive()).or_insert((0.0, 0));
        bucket.0 += point.price;
        bucket.1 += 1;
    }

    let (Some(first), Some(last)) = (
        buckets.keys().next().copied(),
        buckets.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|date| DailyObservation {
            date,
            value: buckets.get(&date).map(|(sum, count)| sum / *count as f64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn point(day: u32, hour: u32, price: f64) -> PricePoint {
        PricePoint::new(Utc.with_ymd_and_hms(2021, 6, day, hour, 0, 0).unwrap(), price)
    }

    #[test]
    fn test_same_day_observations_are_averaged() {
        let daily = resample_daily(&[point(1, 0, 10.0), point(1, 12, 20.0), point(2, 0, 5.0)]);

        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].value, Some(15.0));
        assert_eq!(daily[1].value, Some(5.0));
    }

    #[test]
    fn test_gaps_become_empty_rows() {
        let daily = resample_daily(&[point(1, 0, 1.0), point(4, 0, 4.0)]);

        let values: Vec<_> = daily.iter().map(|d| d.value).collect();
        assert_eq!(values, vec![Some(1.0), None, None, Some(4.0)]);
        assert_eq!(daily[3].date, NaiveDate::from_ymd_opt(2021, 6, 4).unwrap());
    }

    #[test]
    fn test_unordered_input_is_sorted_by_day() {
        let daily = resample_daily(&[point(3, 0, 3.0), point(1, 0, 1.0), point(2, 0, 2.0)]);
        let values: Vec<_> = daily.iter().filter_map(|d| d.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty_input() {
        assert!(resample_daily(&[]).is_empty());
        assert!(resample_daily(&[point(1, 0, f64::NAN)]).is_empty());
    }
}
