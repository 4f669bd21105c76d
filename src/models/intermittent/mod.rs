//! Intermittent demand forecasting models.
//!
//! All methods produce flat forecasts. Missing observations are treated as
//! periods without demand. Standard errors are the residual standard
//! deviation at every step.

mod adida;
mod croston;
mod tsb;

pub use adida::Adida;
pub use croston::{Croston, CrostonVariant};
pub use tsb::Tsb;

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::{residual_variance, residuals_of};
use crate::models::{BoxedForecaster, Component, Forecaster};
use crate::utils::estimates::least_squares_estimates;
use crate::utils::metrics::mse;
use crate::utils::optimization::{nelder_mead, NelderMeadConfig};
use crate::utils::ParameterEstimate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Intermittent demand method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdmMethod {
    Croston,
    /// Syntetos-Boylan approximation.
    Sba,
    /// Teunter-Syntetos-Babai.
    Tsb,
    /// Aggregate-disaggregate intermittent demand approach.
    Adida,
    /// Fit every method and keep the best by in-sample MSE.
    #[default]
    Best,
}

impl IdmMethod {
    /// Concrete methods tried by [`IdmMethod::Best`], in tie-break order.
    pub const CONCRETE: [IdmMethod; 4] = [
        IdmMethod::Croston,
        IdmMethod::Sba,
        IdmMethod::Tsb,
        IdmMethod::Adida,
    ];

    pub fn label(self) -> &'static str {
        match self {
            IdmMethod::Croston => "CROSTON",
            IdmMethod::Sba => "SBA",
            IdmMethod::Tsb => "TSB",
            IdmMethod::Adida => "ADIDA",
            IdmMethod::Best => "BEST",
        }
    }

    /// Unfitted model of a concrete method.
    pub fn build(self) -> Result<BoxedForecaster> {
        Ok(match self {
            IdmMethod::Croston => Box::new(Croston::new(CrostonVariant::Classic)),
            IdmMethod::Sba => Box::new(Croston::new(CrostonVariant::Sba)),
            IdmMethod::Tsb => Box::new(Tsb::new()),
            IdmMethod::Adida => Box::new(Adida::new()),
            IdmMethod::Best => {
                return Err(ForecastError::InvalidParameter(
                    "BEST is resolved by fitting, not built directly".to_string(),
                ))
            }
        })
    }
}

/// Fit `method`, resolving [`IdmMethod::Best`] to the concrete method with
/// the lowest in-sample MSE.
pub fn fit_idm(series: &TimeSeries, method: IdmMethod) -> Result<(IdmMethod, BoxedForecaster)> {
    if method != IdmMethod::Best {
        let mut model = method.build()?;
        model.fit(series)?;
        return Ok((method, model));
    }

    let mut best: Option<(f64, IdmMethod, BoxedForecaster)> = None;
    let mut last_error = ForecastError::EmptyData;
    for candidate in IdmMethod::CONCRETE {
        let mut model = candidate.build()?;
        if let Err(err) = model.fit(series) {
            debug!(method = candidate.label(), error = %err, "intermittent method skipped");
            last_error = err;
            continue;
        }
        let score = model
            .fitted_values()
            .map(|f| mse(series.values(), f))
            .unwrap_or(f64::NAN);
        if score.is_finite() && best.as_ref().is_none_or(|(s, _, _)| score < *s) {
            best = Some((score, candidate, model));
        }
    }
    best.map(|(_, m, model)| (m, model)).ok_or(last_error)
}

/// Demand series with missing periods read as zero demand.
fn demand_values(series: &TimeSeries) -> Result<Vec<f64>> {
    if series.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    let values: Vec<f64> = series
        .values()
        .iter()
        .map(|v| if v.is_finite() { *v } else { 0.0 })
        .collect();
    if values.iter().any(|v| *v < 0.0) {
        return Err(ForecastError::InvalidParameter(
            "intermittent demand must be non-negative".to_string(),
        ));
    }
    Ok(values)
}

/// One pass of a demand recursion.
struct DemandPass {
    fitted: Vec<f64>,
    forecast: f64,
    components: Vec<Component>,
}

/// Shared fitted state of the intermittent models.
#[derive(Debug, Clone)]
struct DemandFit {
    params: Vec<f64>,
    forecast: f64,
    sigma2: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    components: Vec<Component>,
    estimates: Vec<ParameterEstimate>,
}

impl DemandFit {
    /// Estimate `params` (unless fixed) by minimising the one-step MSE,
    /// then run the final pass.
    fn estimate<P>(
        series: &TimeSeries,
        values: &[f64],
        names: &[&str],
        fixed: Option<&[f64]>,
        pass: P,
    ) -> Result<Self>
    where
        P: Fn(&[f64]) -> DemandPass,
    {
        let params = match fixed {
            Some(p) => p.to_vec(),
            None => {
                let bounds = vec![(0.01, 0.99); names.len()];
                nelder_mead(
                    |p| mse(values, &pass(p).fitted),
                    &vec![0.1; names.len()],
                    Some(&bounds),
                    NelderMeadConfig {
                        max_iter: 300,
                        tolerance: 1e-6,
                        ..Default::default()
                    },
                )
                .optimal_point
            }
        };

        let result = pass(&params);
        if !result.forecast.is_finite() {
            return Err(ForecastError::ComputationError(
                "demand recursion produced a non-finite forecast".to_string(),
            ));
        }
        let residuals = residuals_of(series.values(), &result.fitted);
        let sigma2 = residual_variance(&residuals, params.len());
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let estimates = least_squares_estimates(&names, &params, sigma2, |p| {
            residuals_of(series.values(), &pass(p).fitted)
        });

        Ok(Self {
            params,
            forecast: result.forecast,
            sigma2,
            fitted: result.fitted,
            residuals,
            components: result.components,
            estimates,
        })
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let std = if self.sigma2.is_finite() {
            self.sigma2.sqrt()
        } else {
            0.0
        };
        Forecast::from_values_with_std(vec![self.forecast; horizon], vec![std; horizon])
    }
}

/// Forwards the accessor half of [`Forecaster`] to an `Option<DemandFit>`
/// field named `fit`.
macro_rules! demand_accessors {
    () => {
        fn predict(&self, horizon: usize) -> Result<Forecast> {
            self.fit
                .as_ref()
                .ok_or(ForecastError::FitRequired)?
                .predict(horizon)
        }

        fn fitted_values(&self) -> Option<&[f64]> {
            self.fit.as_ref().map(|f| f.fitted.as_slice())
        }

        fn residuals(&self) -> Option<&[f64]> {
            self.fit.as_ref().map(|f| f.residuals.as_slice())
        }

        fn parameters(&self) -> Vec<ParameterEstimate> {
            self.fit
                .as_ref()
                .map(|f| f.estimates.clone())
                .unwrap_or_default()
        }

        fn components(&self) -> Vec<Component> {
            self.fit
                .as_ref()
                .map(|f| f.components.clone())
                .unwrap_or_default()
        }
    };
}
pub(crate) use demand_accessors;
