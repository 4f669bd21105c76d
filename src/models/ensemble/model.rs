//! Forecast combination over several fitted models.
//!
//! Combines multiple forecasting models to produce a single forecast,
//! often with improved accuracy and robustness.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::{BoxedForecaster, Forecaster};
use crate::utils::metrics::mse;
use crate::utils::ParameterEstimate;
use tracing::debug;

/// Method for combining forecasts from multiple models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CombinationMethod {
    /// Simple average of all forecasts.
    Mean,
    /// Weighted by inverse MSE on fitted values.
    #[default]
    WeightedMse,
}

/// Ensemble forecaster that combines multiple models.
///
/// Members that fail to fit are dropped; the ensemble fails only when no
/// member fits. The combined standard error is the weighted sum of member
/// standard errors, which treats member errors as perfectly correlated.
pub struct Ensemble {
    models: Vec<BoxedForecaster>,
    method: CombinationMethod,
    weights: Vec<f64>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
}

impl Ensemble {
    /// Create a new ensemble with the given unfitted models.
    pub fn new(models: Vec<BoxedForecaster>) -> Self {
        Self {
            models,
            method: CombinationMethod::default(),
            weights: Vec::new(),
            fitted: None,
            residuals: None,
        }
    }

    /// Set the combination method.
    pub fn with_method(mut self, method: CombinationMethod) -> Self {
        self.method = method;
        self
    }

    /// Weights of the fitted members, summing to one.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Get the number of fitted members.
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    fn compute_weights(&self, actual: &[f64]) -> Vec<f64> {
        let n = self.models.len();
        let equal = vec![1.0 / n as f64; n];
        if self.method == CombinationMethod::Mean {
            return equal;
        }

        let inverse: Vec<f64> = self
            .models
            .iter()
            .map(|m| {
                let error = m.fitted_values().map_or(f64::NAN, |f| mse(actual, f));
                if error.is_finite() {
                    1.0 / error.max(1e-10)
                } else {
                    0.0
                }
            })
            .collect();
        let total: f64 = inverse.iter().sum();
        if total > 0.0 {
            inverse.iter().map(|w| w / total).collect()
        } else {
            equal
        }
    }

    /// Weighted combination per index, missing where any weighted member is.
    fn combine(&self, values: &[&[f64]]) -> Vec<f64> {
        let len = values.first().map_or(0, |v| v.len());
        (0..len)
            .map(|t| {
                values
                    .iter()
                    .zip(&self.weights)
                    .filter(|(_, w)| **w > 0.0)
                    .map(|(v, w)| v.get(t).copied().unwrap_or(f64::NAN) * w)
                    .sum()
            })
            .collect()
    }
}

impl Forecaster for Ensemble {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        if self.models.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "ensemble has no models".to_string(),
            ));
        }

        let mut fitted_models = Vec::with_capacity(self.models.len());
        let mut last_error = None;
        for mut model in self.models.drain(..) {
            match model.fit(series) {
                Ok(()) => fitted_models.push(model),
                Err(err) => {
                    debug!(member = model.name(), error = %err, "ensemble member dropped");
                    last_error = Some(err);
                }
            }
        }
        if fitted_models.is_empty() {
            return Err(last_error.unwrap_or(ForecastError::FitRequired));
        }
        self.models = fitted_models;

        let values = series.values();
        self.weights = self.compute_weights(values);

        let all_fitted: Vec<&[f64]> = self
            .models
            .iter()
            .map(|m| m.fitted_values().unwrap_or_default())
            .collect();
        let combined = self.combine(&all_fitted);
        self.residuals = Some(crate::models::traits::residuals_of(values, &combined));
        self.fitted = Some(combined);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        if self.fitted.is_none() {
            return Err(ForecastError::FitRequired);
        }

        let forecasts = self
            .models
            .iter()
            .map(|m| m.predict(horizon))
            .collect::<Result<Vec<_>>>()?;
        let points: Vec<&[f64]> = forecasts.iter().map(|f| f.point()).collect();
        let point = self.combine(&points);

        let zeros = vec![0.0; horizon];
        let stds: Vec<&[f64]> = forecasts
            .iter()
            .map(|f| f.std().unwrap_or(&zeros))
            .collect();
        let std = self.combine(&stds);

        Forecast::from_values_with_std(point, std)
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        "COMBINED"
    }

    fn num_params(&self) -> usize {
        self.models.iter().map(|m| m.num_params()).sum()
    }

    /// Combination weights, one per member.
    fn parameters(&self) -> Vec<ParameterEstimate> {
        self.models
            .iter()
            .zip(&self.weights)
            .map(|(m, w)| ParameterEstimate::point(format!("WEIGHT {}", m.name()), *w))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GroupKey, Interval};
    use crate::models::exponential::{EsmMethod, ExponentialSmoothing};
    use crate::models::MeanModel;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn series(values: Vec<f64>) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        TimeSeries::from_start(GroupKey::empty(), Interval::Month, start, values).unwrap()
    }

    #[test]
    fn better_member_gets_more_weight() {
        let values: Vec<f64> = (0..24).map(|i| 10.0 + i as f64).collect();
        let mut ensemble = Ensemble::new(vec![
            Box::new(MeanModel::new()),
            Box::new(ExponentialSmoothing::new(EsmMethod::Linear)),
        ]);
        ensemble.fit(&series(values)).unwrap();

        let weights = ensemble.weights();
        assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(weights[1] > weights[0]);
        assert_eq!(ensemble.predict(3).unwrap().horizon(), 3);
        assert_eq!(ensemble.parameters().len(), 2);
    }

    #[test]
    fn mean_combination_averages_members() {
        let values = vec![2.0, 4.0, 6.0, 4.0, 2.0, 4.0];
        let mut ensemble = Ensemble::new(vec![
            Box::new(MeanModel::new()),
            Box::new(
                ExponentialSmoothing::new(EsmMethod::Simple)
                    .with_weights(vec![0.999])
                    .unwrap(),
            ),
        ])
        .with_method(CombinationMethod::Mean);
        ensemble.fit(&series(values)).unwrap();

        // mean 11/3, last level about 4
        let point = ensemble.predict(1).unwrap().point()[0];
        assert_relative_eq!(point, (11.0 / 3.0 + 4.0) / 2.0, epsilon = 1e-2);
    }

    #[test]
    fn failing_members_are_dropped() {
        let mut ensemble = Ensemble::new(vec![
            Box::new(MeanModel::new()),
            Box::new(ExponentialSmoothing::new(EsmMethod::Winters)),
        ]);
        ensemble.fit(&series(vec![1.0, 2.0, 3.0, 2.0])).unwrap();
        assert_eq!(ensemble.model_count(), 1);
        assert_relative_eq!(ensemble.weights()[0], 1.0);

        let mut empty = Ensemble::new(Vec::new());
        assert!(empty.fit(&series(vec![1.0])).is_err());
    }
}
