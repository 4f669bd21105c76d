//! Exponential smoothing models.

mod smoothing;

pub use smoothing::{EsmMethod, ExponentialSmoothing};

use crate::core::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::models::Forecaster;
use crate::utils::metrics::mse;
use tracing::debug;

/// Fit each of `methods` and keep the one with the lowest in-sample RMSE.
///
/// Methods that cannot be fitted are skipped; ties keep the earlier method.
/// Fails with the last fit error when no method could be fitted.
pub fn fit_best(series: &TimeSeries, methods: &[EsmMethod]) -> Result<ExponentialSmoothing> {
    let mut best: Option<(f64, ExponentialSmoothing)> = None;
    let mut last_error = ForecastError::InvalidParameter("no smoothing method allowed".into());

    for &method in methods {
        let mut model = ExponentialSmoothing::new(method);
        if let Err(err) = model.fit(series) {
            debug!(method = method.label(), error = %err, "smoothing method skipped");
            last_error = err;
            continue;
        }
        let rmse = model
            .fitted_values()
            .map(|f| mse(series.values(), f).sqrt())
            .unwrap_or(f64::NAN);
        if !rmse.is_finite() {
            continue;
        }
        if best.as_ref().is_none_or(|(score, _)| rmse < *score) {
            best = Some((rmse, model));
        }
    }

    best.map(|(_, model)| model).ok_or(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GroupKey, Interval};
    use chrono::{TimeZone, Utc};

    #[test]
    fn best_method_prefers_trend_for_trending_data() {
        let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let values: Vec<f64> = (0..30).map(|i| 100.0 + 3.0 * i as f64).collect();
        let ts = TimeSeries::from_start(GroupKey::empty(), Interval::Year, start, values).unwrap();

        let model = fit_best(&ts, &[EsmMethod::Simple, EsmMethod::Linear]).unwrap();
        assert_eq!(model.method(), EsmMethod::Linear);
    }

    #[test]
    fn fails_when_no_method_fits() {
        let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let ts =
            TimeSeries::from_start(GroupKey::empty(), Interval::Year, start, vec![1.0]).unwrap();
        assert!(fit_best(&ts, &[EsmMethod::Simple, EsmMethod::Seasonal]).is_err());
        assert!(fit_best(&ts, &[]).is_err());
    }
}
