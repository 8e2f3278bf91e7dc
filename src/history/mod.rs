//! Pool price history: CSV persistence and daily resampling.

mod resample;
mod store;

pub use resample::{resample_daily, DailyObservation};
pub use store::{parse_date, HistoryStore, PricePoint};
