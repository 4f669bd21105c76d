//! Forecast result structure for holding predictions.

use crate::error::{ForecastError, Result};
use crate::utils::stats::quantile_normal;

/// Point predictions with optional standard errors and interval bounds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    point: Vec<f64>,
    std: Option<Vec<f64>>,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
}

impl Forecast {
    /// Create an empty forecast.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a forecast from point predictions.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            point: values,
            ..Self::default()
        }
    }

    /// Create a forecast with per-step standard errors.
    pub fn from_values_with_std(values: Vec<f64>, std: Vec<f64>) -> Result<Self> {
        if values.len() != std.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: values.len(),
                got: std.len(),
            });
        }
        Ok(Self {
            point: values,
            std: Some(std),
            ..Self::default()
        })
    }

    /// Add symmetric bounds `point ± z·std` for the given confidence level.
    ///
    /// Forecasts without standard errors get no bounds.
    pub fn with_intervals(mut self, level: f64) -> Result<Self> {
        if !(0.0 < level && level < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "confidence level must be in (0, 1), got {level}"
            )));
        }
        if let Some(std) = &self.std {
            let z = quantile_normal(0.5 + level / 2.0);
            let lower = self.point.iter().zip(std).map(|(p, s)| p - z * s).collect();
            let upper = self.point.iter().zip(std).map(|(p, s)| p + z * s).collect();
            self.lower = Some(lower);
            self.upper = Some(upper);
        }
        Ok(self)
    }

    /// Get the forecast horizon (number of steps).
    pub fn horizon(&self) -> usize {
        self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point.is_empty()
    }

    pub fn point(&self) -> &[f64] {
        &self.point
    }

    pub fn std(&self) -> Option<&[f64]> {
        self.std.as_deref()
    }

    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }

    pub fn has_intervals(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn forecast_from_values_has_no_intervals() {
        let forecast = Forecast::from_values(vec![1.0, 2.0, 3.0])
            .with_intervals(0.95)
            .unwrap();
        assert_eq!(forecast.horizon(), 3);
        assert!(forecast.std().is_none());
        assert!(!forecast.has_intervals());
    }

    #[test]
    fn intervals_are_symmetric_around_point() {
        let forecast = Forecast::from_values_with_std(vec![10.0, 12.0], vec![1.0, 2.0])
            .unwrap()
            .with_intervals(0.95)
            .unwrap();

        let lower = forecast.lower().unwrap();
        let upper = forecast.upper().unwrap();
        assert_relative_eq!(upper[0] - 10.0, 10.0 - lower[0], epsilon = 1e-12);
        assert_relative_eq!(upper[0] - 10.0, 1.959964, epsilon = 1e-4);
        assert_relative_eq!(upper[1] - 12.0, 2.0 * 1.959964, epsilon = 1e-4);
    }

    #[test]
    fn rejects_bad_level_and_mismatched_std() {
        assert!(Forecast::from_values_with_std(vec![1.0], vec![]).is_err());
        assert!(Forecast::from_values(vec![1.0]).with_intervals(1.0).is_err());
    }

    #[test]
    fn empty_forecast_reports_zero_horizon() {
        let forecast = Forecast::new();
        assert!(forecast.is_empty());
        assert_eq!(forecast.horizon(), 0);
    }
}
