//! Core data structures for time series forecasting.

mod forecast;
mod interval;
mod time_series;

pub use forecast::Forecast;
pub use interval::Interval;
pub use time_series::{GroupKey, Regressor, RegressorKind, TimeSeries};
