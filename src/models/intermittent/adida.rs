//! ADIDA (Aggregate-Disaggregate Intermittent Demand Approach).
//!
//! Demand is summed over non-overlapping buckets of the average demand
//! interval, smoothed with simple exponential smoothing at the bucket level
//! and spread evenly back over the bucket's periods. Buckets are aligned to
//! the end of the series so the last bucket is complete.

use super::{demand_accessors, demand_values, DemandFit, DemandPass};
use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::{Component, Forecaster};
use crate::utils::stats::average_demand_interval;
use crate::utils::ParameterEstimate;

/// ADIDA forecaster.
#[derive(Debug, Clone, Default)]
pub struct Adida {
    alpha: Option<f64>,
    bucket: Option<usize>,
    fit: Option<DemandFit>,
}

impl Adida {
    /// ADIDA with bucket size and smoothing weight derived from the data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed bucket size.
    pub fn with_bucket(mut self, bucket: usize) -> Self {
        self.bucket = Some(bucket.max(1));
        self
    }

    /// Use a fixed smoothing weight.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha.clamp(0.01, 0.99));
        self
    }

    pub fn bucket(&self) -> Option<usize> {
        self.bucket
    }

    fn pass(values: &[f64], bucket: usize, alpha: f64) -> DemandPass {
        let n = values.len();
        let offset = n % bucket;
        let mut fitted = vec![f64::NAN; n];
        let mut levels = vec![f64::NAN; n];
        let mut level: Option<f64> = None;

        for start in (offset..n).step_by(bucket) {
            let end = start + bucket;
            let total: f64 = values[start..end].iter().sum();
            if let Some(l) = level {
                fitted[start..end].iter_mut().for_each(|f| *f = l / bucket as f64);
            }
            let updated = match level {
                None => total,
                Some(l) => l + alpha * (total - l),
            };
            levels[start..end]
                .iter_mut()
                .for_each(|v| *v = updated / bucket as f64);
            level = Some(updated);
        }

        DemandPass {
            fitted,
            forecast: level.map_or(0.0, |l| l / bucket as f64),
            components: vec![Component::new("AGGREGATE_LEVEL", levels)],
        }
    }
}

impl Forecaster for Adida {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let values = demand_values(series)?;
        let interval = average_demand_interval(&values);
        let bucket = self.bucket.unwrap_or(if interval.is_finite() {
            interval.round().max(1.0) as usize
        } else {
            1
        });
        let buckets = values.len() / bucket;
        if buckets < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2 * bucket,
                got: values.len(),
            });
        }
        self.bucket = Some(bucket);

        let fixed = self.alpha.map(|a| vec![a]);
        self.fit = Some(DemandFit::estimate(
            series,
            &values,
            &["ALPHA"],
            fixed.as_deref(),
            |p| Self::pass(&values, bucket, p[0]),
        )?);
        Ok(())
    }

    demand_accessors!();

    fn name(&self) -> &str {
        "IDM(ADIDA)"
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
    fn buckets_align_to_the_end() {
        // bucket 2 over 5 values: [_, (1,3), (0,4)]
        let ts = weekly(vec![9.0, 1.0, 3.0, 0.0, 4.0]);
        let mut model = Adida::new().with_bucket(2).with_alpha(0.5);
        model.fit(&ts).unwrap();

        let fitted = model.fitted_values().unwrap();
        assert!(fitted[0].is_nan() && fitted[1].is_nan());
        assert_relative_eq!(fitted[3], 2.0);
        // level 4 -> 4 + 0.5 * (4 - 4) = 4, spread over 2 periods
        assert_relative_eq!(model.predict(1).unwrap().point()[0], 2.0);
    }

    #[test]
    fn bucket_follows_the_average_demand_interval() {
        let mut model = Adida::new();
        model.fit(&weekly(sparse_demand())).unwrap();
        assert_eq!(model.bucket(), Some(3));
        assert!(model.predict(2).unwrap().point()[0] > 0.0);
    }

    #[test]
    fn too_short_for_two_buckets() {
        let mut model = Adida::new().with_bucket(4);
        assert!(matches!(
            model.fit(&weekly(vec![0.0, 1.0, 0.0, 2.0, 0.0])),
            Err(ForecastError::InsufficientData { .. })
        ));
    }
}
