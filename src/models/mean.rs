//! Mean model, the fallback when no family can be fitted.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::{residual_variance, residuals_of};
use crate::models::Forecaster;
use crate::utils::ParameterEstimate;

/// Forecasts every step with the mean of the observed values.
///
/// The h-step standard error is `σ·sqrt(1 + 1/n)`.
#[derive(Debug, Clone, Default)]
pub struct MeanModel {
    mean: Option<f64>,
    sigma2: f64,
    nobs: usize,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
}

impl MeanModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mean(&self) -> Option<f64> {
        self.mean
    }
}

impl Forecaster for MeanModel {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let observed: Vec<f64> = series
            .values()
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        if observed.is_empty() {
            return Err(ForecastError::EmptyData);
        }

        let mean = observed.iter().sum::<f64>() / observed.len() as f64;
        let fitted = vec![mean; series.len()];
        let residuals = residuals_of(series.values(), &fitted);
        // A single observation carries no spread information.
        self.sigma2 = if observed.len() > 1 {
            residual_variance(&residuals, 1)
        } else {
            0.0
        };
        self.nobs = observed.len();
        self.mean = Some(mean);
        self.fitted = Some(fitted);
        self.residuals = Some(residuals);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let mean = self.mean.ok_or(ForecastError::FitRequired)?;
        let std = (self.sigma2 * (1.0 + 1.0 / self.nobs as f64)).sqrt();
        Forecast::from_values_with_std(vec![mean; horizon], vec![std; horizon])
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        "Mean"
    }

    fn num_params(&self) -> usize {
        1
    }

    fn parameters(&self) -> Vec<ParameterEstimate> {
        match self.mean {
            Some(mean) => vec![ParameterEstimate::with_std_err(
                "MU",
                mean,
                (self.sigma2 / self.nobs as f64).sqrt(),
                self.nobs.saturating_sub(1),
            )],
            None => Vec::new(),
        }
    }
}
