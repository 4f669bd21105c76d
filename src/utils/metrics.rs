//! Statistics of fit for forecast evaluation.

use crate::error::{ForecastError, Result};
use serde::Serialize;

/// Statistics of fit over one evaluation region.
///
/// Pairs where either the actual or the prediction is missing are skipped.
/// Percentage and scaled errors are `None` when undefined (zero actuals or a
/// zero naive scale).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct FitStatistics {
    pub nobs: usize,
    pub nparms: usize,
    pub sse: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mape: Option<f64>,
    pub smape: f64,
    pub mase: Option<f64>,
    pub rsquare: f64,
    pub aic: f64,
    pub sbc: f64,
}

impl FitStatistics {
    /// Compute statistics of fit.
    ///
    /// # Arguments
    /// * `actual` - Observed values
    /// * `predicted` - Predictions aligned with `actual`
    /// * `num_params` - Number of estimated parameters, for AIC/SBC
    /// * `mase_scale` - In-sample naive MAE used to scale MASE
    pub fn compute(
        actual: &[f64],
        predicted: &[f64],
        num_params: usize,
        mase_scale: Option<f64>,
    ) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: actual.len(),
                got: predicted.len(),
            });
        }

        let pairs: Vec<(f64, f64)> = actual
            .iter()
            .zip(predicted)
            .filter(|(a, p)| a.is_finite() && p.is_finite())
            .map(|(a, p)| (*a, *p))
            .collect();

        if pairs.is_empty() {
            return Err(ForecastError::EmptyData);
        }

        let n = pairs.len() as f64;
        let sse: f64 = pairs.iter().map(|(a, p)| (a - p).powi(2)).sum();
        let mse = sse / n;
        let mae = pairs.iter().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;

        let mape = if pairs.iter().any(|(a, _)| *a == 0.0) {
            None
        } else {
            Some(100.0 * pairs.iter().map(|(a, p)| ((a - p) / a).abs()).sum::<f64>() / n)
        };

        let smape = 100.0
            * pairs
                .iter()
                .map(|(a, p)| {
                    let denom = a.abs() + p.abs();
                    if denom == 0.0 {
                        0.0
                    } else {
                        2.0 * (a - p).abs() / denom
                    }
                })
                .sum::<f64>()
            / n;

        let mase = mase_scale
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| mae / s);

        let mean_actual = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
        let ss_tot: f64 = pairs.iter().map(|(a, _)| (a - mean_actual).powi(2)).sum();
        let rsquare = if ss_tot == 0.0 { 1.0 } else { 1.0 - sse / ss_tot };

        // Floor the error variance so a perfect fit still has a finite criterion.
        let log_mse = mse.max(1e-12).ln();
        let k = num_params as f64;

        Ok(Self {
            nobs: pairs.len(),
            nparms: num_params,
            sse,
            mse,
            rmse: mse.sqrt(),
            mae,
            mape,
            smape,
            mase,
            rsquare,
            aic: n * log_mse + 2.0 * k,
            sbc: n * log_mse + k * n.ln(),
        })
    }
}

/// In-sample MAE of the (seasonal) naive forecast, the MASE denominator.
pub fn naive_scale(values: &[f64], period: usize) -> Option<f64> {
    let period = period.max(1);
    let diffs: Vec<f64> = values
        .iter()
        .skip(period)
        .zip(values)
        .map(|(curr, prev)| (curr - prev).abs())
        .filter(|d| d.is_finite())
        .collect();
    if diffs.is_empty() {
        return None;
    }
    let scale = diffs.iter().sum::<f64>() / diffs.len() as f64;
    (scale > 0.0).then_some(scale)
}

/// Mean squared error over finite pairs, `NaN` when none exist.
pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    let (sum, count) = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| a.is_finite() && p.is_finite())
        .fold((0.0, 0usize), |(s, c), (a, p)| (s + (a - p).powi(2), c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perfect_fit_has_zero_error() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let stats = FitStatistics::compute(&actual, &actual, 1, naive_scale(&actual, 1)).unwrap();
        assert_relative_eq!(stats.mae, 0.0, epsilon = 1e-12);
        assert_relative_eq!(stats.rmse, 0.0, epsilon = 1e-12);
        assert_relative_eq!(stats.mape.unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(stats.mase.unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(stats.rsquare, 1.0, epsilon = 1e-12);
        assert!(stats.aic.is_finite());
    }

    #[test]
    fn known_errors() {
        let actual = vec![10.0, 20.0, 30.0, 40.0];
        let predicted = vec![12.0, 18.0, 33.0, 37.0];
        let stats = FitStatistics::compute(&actual, &predicted, 2, Some(10.0)).unwrap();

        assert_eq!(stats.nobs, 4);
        assert_relative_eq!(stats.sse, 26.0, epsilon = 1e-12);
        assert_relative_eq!(stats.mae, 2.5, epsilon = 1e-12);
        assert_relative_eq!(stats.mase.unwrap(), 0.25, epsilon = 1e-12);
        let mape = 100.0 * (0.2 + 0.1 + 0.1 + 0.075) / 4.0;
        assert_relative_eq!(stats.mape.unwrap(), mape, epsilon = 1e-9);
        assert_relative_eq!(stats.aic - stats.sbc, 4.0 - 2.0 * 4f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn missing_pairs_are_skipped_and_zero_actuals_disable_mape() {
        let actual = vec![0.0, f64::NAN, 2.0];
        let predicted = vec![1.0, 5.0, 2.0];
        let stats = FitStatistics::compute(&actual, &predicted, 0, None).unwrap();
        assert_eq!(stats.nobs, 2);
        assert!(stats.mape.is_none());
        assert!(stats.mase.is_none());
    }

    #[test]
    fn rejects_mismatched_or_empty_input() {
        assert!(FitStatistics::compute(&[1.0], &[1.0, 2.0], 0, None).is_err());
        assert!(matches!(
            FitStatistics::compute(&[f64::NAN], &[1.0], 0, None),
            Err(ForecastError::EmptyData)
        ));
    }

    #[test]
    fn naive_scale_uses_seasonal_lag() {
        let values = vec![1.0, 3.0, 1.0, 3.0, 1.0, 3.0];
        assert_relative_eq!(naive_scale(&values, 1).unwrap(), 2.0, epsilon = 1e-12);
        assert!(naive_scale(&values, 2).is_none());
        assert!(naive_scale(&[1.0], 1).is_none());
    }
}
