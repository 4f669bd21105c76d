//! Selection settings and criteria.

use crate::error::{ForecastError, Result};
use crate::utils::metrics::FitStatistics;
use serde::{Deserialize, Serialize};

/// Statistic of fit used to rank candidates. Lower is better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SelectionCriterion {
    Mape,
    #[default]
    Mase,
    Smape,
    Mae,
    Mse,
    Rmse,
    /// Ranked by its negation.
    Rsquare,
    /// Always evaluated in-sample.
    Aic,
    /// Always evaluated in-sample.
    Sbc,
}

impl SelectionCriterion {
    pub fn name(self) -> &'static str {
        match self {
            SelectionCriterion::Mape => "MAPE",
            SelectionCriterion::Mase => "MASE",
            SelectionCriterion::Smape => "SMAPE",
            SelectionCriterion::Mae => "MAE",
            SelectionCriterion::Mse => "MSE",
            SelectionCriterion::Rmse => "RMSE",
            SelectionCriterion::Rsquare => "RSQUARE",
            SelectionCriterion::Aic => "AIC",
            SelectionCriterion::Sbc => "SBC",
        }
    }

    /// Whether the criterion ignores the holdout region.
    pub fn is_in_sample_only(self) -> bool {
        matches!(self, SelectionCriterion::Aic | SelectionCriterion::Sbc)
    }

    /// Ranking value, `None` when undefined.
    pub fn value(self, stats: &FitStatistics) -> Option<f64> {
        let value = match self {
            SelectionCriterion::Mape => stats.mape?,
            SelectionCriterion::Mase => stats.mase?,
            SelectionCriterion::Smape => stats.smape,
            SelectionCriterion::Mae => stats.mae,
            SelectionCriterion::Mse => stats.mse,
            SelectionCriterion::Rmse => stats.rmse,
            SelectionCriterion::Rsquare => -stats.rsquare,
            SelectionCriterion::Aic => stats.aic,
            SelectionCriterion::Sbc => stats.sbc,
        };
        value.is_finite().then_some(value)
    }
}

/// Seasonality test applied before ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonTest {
    /// Keep the diagnosis decision.
    #[default]
    None,
    /// Drop seasonal candidates unless the seasonal-lag autocorrelation is
    /// significant at this level.
    Significance(f64),
}

/// Selection settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectSpec {
    #[serde(default)]
    pub criterion: SelectionCriterion,
    /// Trailing observations held out for evaluation.
    #[serde(default)]
    pub holdout_size: Option<usize>,
    /// Held-out share of the series in percent.
    #[serde(default)]
    pub holdout_percent: Option<f64>,
    #[serde(default)]
    pub season_test: SeasonTest,
    /// Add an ensemble of all candidates before ranking.
    #[serde(default)]
    pub combine: bool,
}

impl SelectSpec {
    pub fn with_criterion(mut self, criterion: SelectionCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_holdout(mut self, size: usize) -> Self {
        self.holdout_size = Some(size);
        self
    }

    pub fn with_holdout_percent(mut self, percent: f64) -> Self {
        self.holdout_percent = Some(percent);
        self
    }

    pub fn with_combine(mut self, combine: bool) -> Self {
        self.combine = combine;
        self
    }

    pub fn with_season_test(mut self, test: SeasonTest) -> Self {
        self.season_test = test;
        self
    }

    /// Held-out observations for a series of `n` observations. The smaller
    /// of both settings applies when both are given.
    pub fn holdout_for(&self, n: usize) -> usize {
        let by_percent = self
            .holdout_percent
            .map(|p| (n as f64 * p / 100.0).floor() as usize);
        match (self.holdout_size, by_percent) {
            (Some(size), Some(percent)) => size.min(percent),
            (Some(size), None) => size,
            (None, Some(percent)) => percent,
            (None, None) => 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(p) = self.holdout_percent {
            if !(p > 0.0 && p <= 100.0) {
                return Err(ForecastError::Configuration(format!(
                    "holdout percent must be in (0, 100], got {p}"
                )));
            }
        }
        if let SeasonTest::Significance(alpha) = self.season_test {
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err(ForecastError::Configuration(format!(
                    "season test significance must be in (0, 1), got {alpha}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> FitStatistics {
        FitStatistics::compute(&[1.0, 2.0, 4.0], &[1.5, 2.0, 3.0], 1, Some(1.5)).unwrap()
    }

    #[test]
    fn criterion_values() {
        let s = stats();
        assert_eq!(SelectionCriterion::Mae.value(&s), Some(0.5));
        assert_eq!(SelectionCriterion::Mase.value(&s), Some(0.5 / 1.5));
        assert_eq!(SelectionCriterion::Rsquare.value(&s), Some(-s.rsquare));

        let zero = FitStatistics::compute(&[0.0, 2.0], &[1.0, 2.0], 1, None).unwrap();
        assert_eq!(SelectionCriterion::Mape.value(&zero), None);
        assert_eq!(SelectionCriterion::Mase.value(&zero), None);
    }

    #[test]
    fn default_criterion_is_mase() {
        let spec: SelectSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.criterion, SelectionCriterion::Mase);
        assert_eq!(spec.season_test, SeasonTest::None);
        assert!(!spec.combine);
        assert_eq!(spec.holdout_for(100), 0);
    }

    #[test]
    fn holdout_takes_the_smaller_setting() {
        let spec = SelectSpec::default().with_holdout(6).with_holdout_percent(10.0);
        assert_eq!(spec.holdout_for(100), 6);
        assert_eq!(spec.holdout_for(40), 4);
        assert_eq!(SelectSpec::default().with_holdout_percent(25.0).holdout_for(10), 2);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(SelectSpec::default().with_holdout_percent(0.0).validate().is_err());
        assert!(SelectSpec::default()
            .with_season_test(SeasonTest::Significance(1.5))
            .validate()
            .is_err());
        let parsed: SelectSpec =
            serde_json::from_str(r#"{"criterion": "RMSE", "season_test": {"significance": 0.05}}"#)
                .unwrap();
        assert_eq!(parsed.criterion, SelectionCriterion::Rmse);
        assert_eq!(parsed.season_test, SeasonTest::Significance(0.05));
        assert!(parsed.validate().is_ok());
    }
}
