//! Forecaster trait defining the common interface for all models.

use crate::core::{Forecast, TimeSeries};
use crate::error::Result;
use crate::utils::ParameterEstimate;

/// A named unobserved component of a fitted model over the history.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub values: Vec<f64>,
}

impl Component {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Common interface for all forecasting models.
///
/// This trait is object-safe and can be used with `Box<dyn Forecaster>`.
/// Every family plugs into diagnosis, selection and forecasting through it,
/// so a family can be replaced without touching the pipeline.
pub trait Forecaster {
    /// Fit the model to the time series data.
    fn fit(&mut self, series: &TimeSeries) -> Result<()>;

    /// Point predictions and h-step standard errors for the horizon.
    ///
    /// Models with regressors read their future values from the series
    /// given to [`Forecaster::fit`].
    fn predict(&self, horizon: usize) -> Result<Forecast>;

    /// Predictions with symmetric bounds at the given confidence level.
    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<Forecast> {
        self.predict(horizon)?.with_intervals(level)
    }

    /// Get the fitted values (in-sample one-step predictions).
    fn fitted_values(&self) -> Option<&[f64]>;

    /// Get the residuals (actual - fitted).
    fn residuals(&self) -> Option<&[f64]>;

    /// Get the model name.
    fn name(&self) -> &str;

    /// Number of estimated parameters, used by AIC and SBC.
    fn num_params(&self) -> usize;

    /// Estimated parameters with standard errors, when available.
    fn parameters(&self) -> Vec<ParameterEstimate> {
        Vec::new()
    }

    /// Unobserved components over the fitted span.
    fn components(&self) -> Vec<Component> {
        Vec::new()
    }

    /// Check if the model has been fitted.
    fn is_fitted(&self) -> bool {
        self.fitted_values().is_some()
    }
}

/// Type alias for boxed forecaster trait objects.
pub type BoxedForecaster = Box<dyn Forecaster>;

/// Residuals `actual - fitted`, missing where either side is missing.
pub(crate) fn residuals_of(actual: &[f64], fitted: &[f64]) -> Vec<f64> {
    actual
        .iter()
        .zip(fitted)
        .map(|(a, f)| {
            if a.is_finite() && f.is_finite() {
                a - f
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Mean squared residual over the finite residuals.
pub(crate) fn residual_variance(residuals: &[f64], num_params: usize) -> f64 {
    let finite: Vec<f64> = residuals.iter().copied().filter(|r| r.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = finite.iter().map(|r| r * r).sum();
    let df = finite.len().saturating_sub(num_params).max(1);
    sse / df as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn residuals_skip_missing_values() {
        let r = residuals_of(&[1.0, f64::NAN, 3.0], &[0.5, 2.0, f64::NAN]);
        assert_relative_eq!(r[0], 0.5);
        assert!(r[1].is_nan());
        assert!(r[2].is_nan());
    }

    #[test]
    fn residual_variance_uses_degrees_of_freedom() {
        let v = residual_variance(&[1.0, -1.0, 1.0, f64::NAN], 1);
        assert_relative_eq!(v, 1.5);
        assert!(residual_variance(&[f64::NAN], 0).is_nan());
    }
}
