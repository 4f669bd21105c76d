//! Forecast generation for the selected model of one series.

use crate::collect::Note;
use crate::core::{Forecast, GroupKey, TimeSeries};
use crate::diagnose::CandidateModel;
use crate::error::{ForecastError, Result};
use crate::models::{Component, ModelFamily};
use crate::utils::metrics::{naive_scale, FitStatistics};
use crate::utils::{quantile_normal, ParameterEstimate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

fn default_horizon() -> usize {
    12
}

fn default_confidence_level() -> f64 {
    0.95
}

/// Forecast settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSpec {
    /// Number of future intervals (LEAD).
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

impl Default for EngineSpec {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            confidence_level: default_confidence_level(),
        }
    }
}

impl EngineSpec {
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            ..Self::default()
        }
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ForecastError::Configuration(format!(
                "confidence level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        Ok(())
    }
}

/// One row of the forecast table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    #[serde(flatten)]
    pub key: GroupKey,
    #[serde(rename = "TIME")]
    pub time: DateTime<Utc>,
    /// Steps after the last observation, zero for the history.
    #[serde(rename = "_LEAD_")]
    pub lead: usize,
    #[serde(rename = "ACTUAL")]
    pub actual: Option<f64>,
    #[serde(rename = "PREDICT")]
    pub predict: Option<f64>,
    #[serde(rename = "STD")]
    pub std: Option<f64>,
    #[serde(rename = "LOWER")]
    pub lower: Option<f64>,
    #[serde(rename = "UPPER")]
    pub upper: Option<f64>,
    #[serde(rename = "RESIDUAL")]
    pub residual: Option<f64>,
    #[serde(rename = "ERROR")]
    pub error: bool,
}

impl ForecastRecord {
    fn empty(key: &GroupKey, time: DateTime<Utc>, lead: usize) -> Self {
        Self {
            key: key.clone(),
            time,
            lead,
            actual: None,
            predict: None,
            std: None,
            lower: None,
            upper: None,
            residual: None,
            error: false,
        }
    }

    pub fn is_future(&self) -> bool {
        self.lead > 0
    }
}

/// Output of the forecast stage for one series.
#[derive(Debug, Clone)]
pub struct GroupForecast {
    pub key: GroupKey,
    pub model: String,
    pub family: ModelFamily,
    pub records: Vec<ForecastRecord>,
    pub parameters: Vec<ParameterEstimate>,
    pub components: Vec<Component>,
    /// In-sample statistics of the refitted model.
    pub statistics: Option<FitStatistics>,
    /// The refit failed and every future record is flagged.
    pub failed: bool,
    /// Future steps flagged because their prediction was not finite.
    pub failed_steps: usize,
}

impl GroupForecast {
    pub fn future(&self) -> impl Iterator<Item = &ForecastRecord> {
        self.records.iter().filter(|r| r.is_future())
    }

    /// Log entry for future steps flagged after a successful refit.
    pub fn step_note(&self) -> Option<Note> {
        if self.failed || self.failed_steps == 0 {
            return None;
        }
        let reason = ForecastError::ComputationError(format!(
            "{} of {} forecast steps are not finite",
            self.failed_steps,
            self.future().count()
        ));
        Some(Note::error(&ForecastError::model_fit(&self.model, &reason)))
    }
}

/// Future records from a forecast, flagging steps whose prediction or
/// standard error is not finite. Returns the records and the flagged count.
fn future_records(
    key: &GroupKey,
    timestamps: Vec<DateTime<Utc>>,
    forecast: &Forecast,
) -> (Vec<ForecastRecord>, usize) {
    let mut failed_steps = 0;
    let records = timestamps
        .into_iter()
        .enumerate()
        .map(|(i, time)| {
            let mut record = ForecastRecord::empty(key, time, i + 1);
            let predict = forecast.point().get(i).copied().and_then(finite);
            let std = forecast.std().and_then(|s| s.get(i).copied()).and_then(finite);
            match (predict, std) {
                (Some(p), Some(s)) => {
                    record.predict = Some(p);
                    record.std = Some(s);
                    record.lower = forecast.lower().and_then(|l| l.get(i).copied());
                    record.upper = forecast.upper().and_then(|u| u.get(i).copied());
                }
                _ => {
                    record.error = true;
                    failed_steps += 1;
                }
            }
            record
        })
        .collect();
    (records, failed_steps)
}

/// Refits selected models and produces forecast records.
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    spec: EngineSpec,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl ForecastEngine {
    pub fn new(spec: EngineSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &EngineSpec {
        &self.spec
    }

    /// Refit `candidate` on the full series and forecast the horizon.
    ///
    /// Fails with [`ForecastError::ModelFit`] when the refit or the
    /// prediction fails; [`ForecastEngine::failed`] then supplies the
    /// flagged records.
    pub fn forecast(&self, series: &TimeSeries, candidate: &CandidateModel) -> Result<GroupForecast> {
        let label = candidate.label();
        let key = series.key();
        let horizon = self.spec.horizon;
        let level = self.spec.confidence_level;

        let mut model = candidate
            .structure
            .build()
            .map_err(|e| ForecastError::model_fit(&label, &e))?;
        model
            .fit(series)
            .map_err(|e| ForecastError::model_fit(&label, &e))?;
        let forecast = model
            .predict_with_intervals(horizon, level)
            .map_err(|e| ForecastError::model_fit(&label, &e))?;
        let fitted = model.fitted_values().ok_or(ForecastError::FitRequired)?;

        let values = series.values();
        let statistics = FitStatistics::compute(
            values,
            fitted,
            model.num_params(),
            naive_scale(values, series.season_length()),
        )
        .ok();
        let sigma = statistics
            .as_ref()
            .map(|s| (s.sse / s.nobs.saturating_sub(s.nparms).max(1) as f64).sqrt())
            .and_then(finite);
        let z = quantile_normal(0.5 + level / 2.0);

        let mut records = Vec::with_capacity(series.len() + horizon);
        for (t, time) in series.timestamps().iter().enumerate() {
            let mut record = ForecastRecord::empty(key, *time, 0);
            record.actual = finite(values[t]);
            record.predict = fitted.get(t).copied().and_then(finite);
            if let Some(p) = record.predict {
                record.std = sigma;
                record.lower = sigma.map(|s| p - z * s);
                record.upper = sigma.map(|s| p + z * s);
                record.residual = record.actual.map(|a| a - p);
            }
            records.push(record);
        }

        let (future, failed_steps) = future_records(key, series.future_timestamps(horizon)?, &forecast);
        records.extend(future);
        if failed_steps > 0 {
            warn!(group = %key, model = %label, steps = failed_steps, "non-finite forecasts flagged");
        }
        debug!(group = %key, model = %label, horizon, "forecast complete");

        Ok(GroupForecast {
            key: key.clone(),
            model: label,
            family: candidate.family,
            records,
            parameters: model.parameters(),
            components: model.components(),
            statistics,
            failed: false,
            failed_steps,
        })
    }

    /// Records of a group whose model could not be refitted: the history
    /// with actuals only and every future step flagged.
    pub fn failed(&self, series: &TimeSeries, model: String, family: ModelFamily) -> Result<GroupForecast> {
        let key = series.key();
        let mut records: Vec<ForecastRecord> = series
            .timestamps()
            .iter()
            .zip(series.values())
            .map(|(time, value)| {
                let mut record = ForecastRecord::empty(key, *time, 0);
                record.actual = finite(*value);
                record
            })
            .collect();
        for (i, time) in series.future_timestamps(self.spec.horizon)?.into_iter().enumerate() {
            let mut record = ForecastRecord::empty(key, time, i + 1);
            record.error = true;
            records.push(record);
        }
        let failed_steps = self.spec.horizon;

        Ok(GroupForecast {
            key: key.clone(),
            model,
            family,
            records,
            parameters: Vec::new(),
            components: Vec::new(),
            statistics: None,
            failed: true,
            failed_steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Interval;
    use crate::diagnose::{DiagnoseSpec, ModelDiagnoser};
    use crate::models::arima::ArimaOrder;
    use crate::models::ModelStructure;
    use chrono::{Datelike, TimeZone};

    fn revenues() -> TimeSeries {
        let start = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();
        TimeSeries::from_start(
            GroupKey::empty(),
            Interval::Year,
            start,
            vec![4.0, 5.0, 7.0, 6.0, 8.0, 9.0, 5.0, 2.0, 3.5, 5.5, 6.5],
        )
        .unwrap()
    }

    fn arima_candidate(series: &TimeSeries) -> CandidateModel {
        let spec = DiagnoseSpec::with_families(&[ModelFamily::Arimax])
            .with_arima_order(ArimaOrder::new(1, 1, 1));
        ModelDiagnoser::new(spec)
            .unwrap()
            .diagnose(series)
            .unwrap()
            .candidates
            .remove(0)
    }

    #[test]
    fn revenue_forecast_covers_2001_to_2012() {
        let series = revenues();
        let engine = ForecastEngine::new(EngineSpec::new(12)).unwrap();
        let result = engine.forecast(&series, &arima_candidate(&series)).unwrap();

        assert_eq!(result.records.len(), 11 + 12);
        let future: Vec<&ForecastRecord> = result.future().collect();
        assert_eq!(future.len(), 12);
        assert_eq!(future[0].time.year(), 2001);
        assert_eq!(future[11].time.year(), 2012);
        for record in future {
            assert!(!record.error);
            assert!(record.actual.is_none());
            let (p, s) = (record.predict.unwrap(), record.std.unwrap());
            let (lo, hi) = (record.lower.unwrap(), record.upper.unwrap());
            assert!(s > 0.0);
            assert!(lo < p && p < hi);
            assert!(((hi - p) - (p - lo)).abs() < 1e-9);
        }
        assert_eq!(result.parameters.len(), 2);
        assert!(result.statistics.is_some());
    }

    #[test]
    fn history_records_carry_residuals() {
        let series = revenues();
        let engine = ForecastEngine::new(EngineSpec::new(3)).unwrap();
        let result = engine.forecast(&series, &arima_candidate(&series)).unwrap();

        let history: Vec<&ForecastRecord> = result.records.iter().filter(|r| !r.is_future()).collect();
        assert_eq!(history.len(), 11);
        for r in history {
            assert!(r.actual.is_some());
            if let (Some(a), Some(p), Some(e)) = (r.actual, r.predict, r.residual) {
                assert!((a - p - e).abs() < 1e-12);
            }
            assert!(!r.error);
        }
    }

    #[test]
    fn failed_group_flags_every_future_record() {
        let series = revenues();
        let engine = ForecastEngine::new(EngineSpec::new(4)).unwrap();
        let result = engine
            .failed(&series, "ARIMA(1,1,1)".to_string(), ModelFamily::Arimax)
            .unwrap();
        assert!(result.failed);
        assert_eq!(result.future().count(), 4);
        assert!(result.future().all(|r| r.error && r.predict.is_none()));
    }

    #[test]
    fn refit_failure_is_a_model_fit_error() {
        let series = revenues();
        let mut candidate = arima_candidate(&series);
        candidate.structure = ModelStructure::Arimax(ArimaOrder::new(1, 1, 1).with_seasonal(1, 1, 0, 12));
        let engine = ForecastEngine::new(EngineSpec::new(2)).unwrap();
        let err = engine.forecast(&series, &candidate).unwrap_err();
        assert!(matches!(err, ForecastError::ModelFit { .. }));
    }

    #[test]
    fn invalid_confidence_is_rejected() {
        assert!(ForecastEngine::new(EngineSpec::new(1).with_confidence_level(1.0)).is_err());
    }

    #[test]
    fn records_serialize_with_table_columns() {
        let series = revenues();
        let engine = ForecastEngine::new(EngineSpec::new(1)).unwrap();
        let result = engine.failed(&series, "MEAN".into(), ModelFamily::Esm).unwrap();
        let json = serde_json::to_value(&result.records[11]).unwrap();
        assert_eq!(json["_LEAD_"], 1);
        assert_eq!(json["ERROR"], true);
        assert!(json["PREDICT"].is_null());
    }

    #[test]
    fn non_finite_steps_are_flagged_and_noted() {
        let series = revenues();
        let timestamps = series.future_timestamps(3).unwrap();
        let forecast = Forecast::from_values_with_std(vec![7.0, f64::NAN, 8.0], vec![1.0, 1.5, f64::INFINITY])
            .unwrap()
            .with_intervals(0.95)
            .unwrap();
        let (records, failed_steps) = future_records(series.key(), timestamps, &forecast);

        assert_eq!(failed_steps, 2);
        assert!(!records[0].error);
        assert_eq!(records[0].predict, Some(7.0));
        for record in &records[1..] {
            assert!(record.error);
            assert!(record.predict.is_none() && record.std.is_none());
            assert!(record.lower.is_none() && record.upper.is_none());
        }

        let engine = ForecastEngine::new(EngineSpec::new(3)).unwrap();
        let mut result = engine.forecast(&series, &arima_candidate(&series)).unwrap();
        assert_eq!(result.failed_steps, 0);
        assert!(result.step_note().is_none());

        result.records.truncate(series.len());
        result.records.extend(records);
        result.failed_steps = failed_steps;
        let note = result.step_note().unwrap();
        assert!(note.is_error());
        assert_eq!(note.code, 300);
        assert!(note.message.contains("2 of 3 forecast steps"));
    }

    #[test]
    fn refit_failures_carry_no_step_note() {
        let series = revenues();
        let engine = ForecastEngine::new(EngineSpec::new(2)).unwrap();
        let result = engine.failed(&series, "MEAN".into(), ModelFamily::Esm).unwrap();
        assert_eq!(result.failed_steps, 2);
        assert!(result.step_note().is_none());
    }
}
