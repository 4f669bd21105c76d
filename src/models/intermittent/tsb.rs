//! TSB (Teunter-Syntetos-Babai) method for intermittent demand forecasting.
//!
//! TSB smooths the demand probability every period and the demand size on
//! demand periods only; the forecast is their product. Unlike Croston the
//! forecast decays towards zero when demand stops.

use super::{demand_accessors, demand_values, DemandFit, DemandPass};
use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::{Component, Forecaster};
use crate::utils::ParameterEstimate;

/// TSB method for intermittent demand forecasting.
#[derive(Debug, Clone, Default)]
pub struct Tsb {
    weights: Option<(f64, f64)>,
    fit: Option<DemandFit>,
}

impl Tsb {
    /// TSB model with both smoothing weights estimated from the data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use fixed weights for demand size and probability.
    pub fn with_params(mut self, alpha_size: f64, alpha_probability: f64) -> Self {
        self.weights = Some((
            alpha_size.clamp(0.01, 0.99),
            alpha_probability.clamp(0.01, 0.99),
        ));
        self
    }

    /// Demand probability after the last observation.
    pub fn probability(&self) -> Option<f64> {
        self.fit.as_ref().and_then(|f| {
            f.components
                .iter()
                .find(|c| c.name == "DEMAND_PROBABILITY")
                .and_then(|c| c.values.last().copied())
        })
    }

    fn pass(values: &[f64], alpha_size: f64, alpha_prob: f64) -> DemandPass {
        let n = values.len();
        let mut fitted = vec![f64::NAN; n];
        let mut sizes = vec![f64::NAN; n];
        let mut probabilities = vec![f64::NAN; n];
        let mut state: Option<(f64, f64)> = None;

        for t in 0..n {
            let demand = values[t] > 0.0;
            state = match state {
                None if demand => Some((values[t], 1.0 / (t + 1) as f64)),
                None => None,
                Some((z, p)) => {
                    fitted[t] = z * p;
                    if demand {
                        Some((z + alpha_size * (values[t] - z), p + alpha_prob * (1.0 - p)))
                    } else {
                        Some((z, p - alpha_prob * p))
                    }
                }
            };
            if let Some((z, p)) = state {
                sizes[t] = z;
                probabilities[t] = p;
            }
        }

        DemandPass {
            fitted,
            forecast: state.map_or(0.0, |(z, p)| z * p),
            components: vec![
                Component::new("DEMAND_SIZE", sizes),
                Component::new("DEMAND_PROBABILITY", probabilities),
            ],
        }
    }
}

impl Forecaster for Tsb {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let values = demand_values(series)?;
        let fixed = self.weights.map(|(a, b)| vec![a, b]);
        self.fit = Some(DemandFit::estimate(
            series,
            &values,
            &["ALPHA_SIZE", "ALPHA_PROBABILITY"],
            fixed.as_deref(),
            |p| Self::pass(&values, p[0], p[1]),
        )?);
        Ok(())
    }

    demand_accessors!();

    fn name(&self) -> &str {
        "IDM(TSB)"
    }

    fn num_params(&self) -> usize {
        2
    }
}
