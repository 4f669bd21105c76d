//! Croston's method for intermittent demand forecasting.
//!
//! Croston's method separately forecasts demand sizes and inter-arrival times
//! using exponential smoothing, then combines them for the final forecast.

use super::{demand_accessors, demand_values, DemandFit, DemandPass};
use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::{Component, Forecaster};
use crate::utils::ParameterEstimate;

/// Croston's method variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrostonVariant {
    /// Classic Croston method.
    Classic,
    /// Syntetos-Boylan Approximation, bias corrected by `1 - α/2`.
    Sba,
}

/// Croston's method for intermittent demand forecasting.
#[derive(Debug, Clone)]
pub struct Croston {
    variant: CrostonVariant,
    alpha: Option<f64>,
    fit: Option<DemandFit>,
}

impl Croston {
    /// Croston model with the smoothing weight estimated from the data.
    pub fn new(variant: CrostonVariant) -> Self {
        Self {
            variant,
            alpha: None,
            fit: None,
        }
    }

    /// Use a fixed smoothing weight.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha.clamp(0.01, 0.99));
        self
    }

    pub fn variant(&self) -> CrostonVariant {
        self.variant
    }

    /// Smoothing weight after fitting.
    pub fn alpha(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.params[0]).or(self.alpha)
    }

    fn pass(values: &[f64], alpha: f64, variant: CrostonVariant) -> DemandPass {
        let n = values.len();
        let factor = match variant {
            CrostonVariant::Classic => 1.0,
            CrostonVariant::Sba => 1.0 - alpha / 2.0,
        };

        let mut fitted = vec![f64::NAN; n];
        let mut sizes = vec![f64::NAN; n];
        let mut intervals = vec![f64::NAN; n];
        let mut size: Option<f64> = None;
        let mut interval = 1.0;
        let mut since_demand = 0.0;

        for t in 0..n {
            since_demand += 1.0;
            if let Some(z) = size {
                fitted[t] = factor * z / interval;
            }
            if values[t] > 0.0 {
                match size {
                    None => {
                        size = Some(values[t]);
                        interval = since_demand;
                    }
                    Some(z) => {
                        size = Some(z + alpha * (values[t] - z));
                        interval += alpha * (since_demand - interval);
                    }
                }
                since_demand = 0.0;
            }
            if let Some(z) = size {
                sizes[t] = z;
                intervals[t] = interval;
            }
        }

        DemandPass {
            fitted,
            forecast: size.map_or(0.0, |z| factor * z / interval),
            components: vec![
                Component::new("DEMAND_SIZE", sizes),
                Component::new("DEMAND_INTERVAL", intervals),
            ],
        }
    }
}

impl Forecaster for Croston {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let values = demand_values(series)?;
        let variant = self.variant;
        let fixed = self.alpha.map(|a| vec![a]);
        self.fit = Some(DemandFit::estimate(
            series,
            &values,
            &["ALPHA"],
            fixed.as_deref(),
            |p| Self::pass(&values, p[0], variant),
        )?);
        Ok(())
    }

    demand_accessors!();

    fn name(&self) -> &str {
        match self.variant {
            CrostonVariant::Classic => "IDM(CROSTON)",
            CrostonVariant::Sba => "IDM(SBA)",
        }
    }

    fn num_params(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fixed_alpha_matches_hand_computation() {
        // demands 4 at t=1 and 6 at t=3: size 4 -> 5, interval 2 -> 2
        let ts = weekly(vec![0.0, 4.0, 0.0, 6.0]);
        let mut model = Croston::new(CrostonVariant::Classic).with_alpha(0.5);
        model.fit(&ts).unwrap();

        let fitted = model.fitted_values().unwrap();
        assert!(fitted[0].is_nan() && fitted[1].is_nan());
        assert_relative_eq!(fitted[2], 2.0);
        assert_relative_eq!(fitted[3], 2.0);
        assert_relative_eq!(model.predict(2).unwrap().point()[0], 2.5);
    }

    #[test]
    fn sba_is_lower_than_classic() {
        let ts = weekly(sparse_demand());
        let mut classic = Croston::new(CrostonVariant::Classic).with_alpha(0.2);
        let mut sba = Croston::new(CrostonVariant::Sba).with_alpha(0.2);
        classic.fit(&ts).unwrap();
        sba.fit(&ts).unwrap();
        let c = classic.predict(1).unwrap().point()[0];
        let s = sba.predict(1).unwrap().point()[0];
        assert_relative_eq!(s, c * 0.9, epsilon = 1e-12);
    }

    #[test]
    fn no_demand_forecasts_zero() {
        let mut model = Croston::new(CrostonVariant::Classic);
        model.fit(&weekly(vec![0.0; 8])).unwrap();
        assert_eq!(model.predict(3).unwrap().point(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn estimated_alpha_is_reported() {
        let mut model = Croston::new(CrostonVariant::Sba);
        model.fit(&weekly(sparse_demand())).unwrap();
        let alpha = model.alpha().unwrap();
        assert!((0.01..=0.99).contains(&alpha));
        assert_eq!(model.parameters()[0].name, "ALPHA");
        assert_eq!(model.components().len(), 2);
    }
}
