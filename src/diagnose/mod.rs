//! Model diagnosis: proposes fitted candidate models for one series.
//!
//! Each enabled family contributes at most its best variant (ARIMAX may
//! contribute a non-seasonal and a seasonal specification). Classes the
//! series is too short for are skipped with a note, failing classes with an
//! error note, and a mean model guarantees at least one candidate.

mod spec;

pub use spec::{
    ArimaxSpec, Constraints, DiagnoseSpec, EsmSpec, IdmSpec, INTERMITTENCY_DISABLED,
};

use crate::collect::Note;
use crate::core::{RegressorKind, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::arima::{ArimaIdentifier, Arimax};
use crate::models::exponential::{fit_best, EsmMethod};
use crate::models::intermittent::fit_idm;
use crate::models::ucm::{Ucm, UcmSpec};
use crate::models::{Forecaster, MeanModel, ModelFamily, ModelStructure};
use crate::utils::metrics::{naive_scale, FitStatistics};
use crate::utils::stats::average_demand_interval;
use crate::utils::ParameterEstimate;
use tracing::{debug, info};

/// A fitted candidate model.
#[derive(Debug, Clone)]
pub struct CandidateModel {
    pub family: ModelFamily,
    pub structure: ModelStructure,
    pub parameters: Vec<ParameterEstimate>,
    /// In-sample one-step predictions.
    pub fitted: Vec<f64>,
    pub fit: FitStatistics,
    pub seasonal: bool,
    pub trend: bool,
    /// Number of independent variables used as regressors.
    pub inputs: usize,
    /// Number of event dummies used as regressors.
    pub events: usize,
}

impl CandidateModel {
    /// Describe a fitted model.
    pub fn from_model(
        family: ModelFamily,
        structure: ModelStructure,
        model: &dyn Forecaster,
        series: &TimeSeries,
    ) -> Result<Self> {
        let fitted = model
            .fitted_values()
            .ok_or(ForecastError::FitRequired)?
            .to_vec();
        let values = series.values();
        let fit = FitStatistics::compute(
            values,
            &fitted,
            model.num_params(),
            naive_scale(values, series.season_length()),
        )?;

        let count = |kind: RegressorKind| {
            if structure.uses_regressors() {
                series.regressors().iter().filter(|r| r.kind == kind).count()
            } else {
                0
            }
        };

        Ok(Self {
            family,
            seasonal: structure.is_seasonal(),
            trend: structure.has_trend(),
            inputs: count(RegressorKind::Input),
            events: count(RegressorKind::Event),
            parameters: model.parameters(),
            fitted,
            fit,
            structure,
        })
    }

    pub fn label(&self) -> String {
        self.structure.label()
    }
}

/// Candidates of one series and the notes raised while finding them.
#[derive(Debug, Clone, Default)]
pub struct Diagnosis {
    pub candidates: Vec<CandidateModel>,
    pub notes: Vec<Note>,
    pub intermittent: bool,
}

/// Diagnoses series against a [`DiagnoseSpec`].
#[derive(Debug, Clone)]
pub struct ModelDiagnoser {
    spec: DiagnoseSpec,
}

impl ModelDiagnoser {
    /// Fails with [`ForecastError::Configuration`] when no family is enabled.
    pub fn new(spec: DiagnoseSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &DiagnoseSpec {
        &self.spec
    }

    /// Propose candidates for `series`.
    ///
    /// # Example
    /// ```
    /// use anofox_autoforecast::core::{GroupKey, Interval, TimeSeries};
    /// use anofox_autoforecast::diagnose::{DiagnoseSpec, ModelDiagnoser};
    /// use anofox_autoforecast::models::ModelFamily;
    /// use chrono::{TimeZone, Utc};
    ///
    /// let start = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();
    /// let series = TimeSeries::from_start(
    ///     GroupKey::empty(),
    ///     Interval::Year,
    ///     start,
    ///     vec![4.0, 5.0, 7.0, 6.0, 8.0, 9.0, 5.0, 2.0, 3.5, 5.5, 6.5],
    /// )
    /// .unwrap();
    ///
    /// let diagnoser = ModelDiagnoser::new(DiagnoseSpec::with_families(&[ModelFamily::Esm])).unwrap();
    /// let diagnosis = diagnoser.diagnose(&series).unwrap();
    /// assert_eq!(diagnosis.candidates.len(), 1);
    /// ```
    pub fn diagnose(&self, series: &TimeSeries) -> Result<Diagnosis> {
        let nobs = series.values().iter().filter(|v| v.is_finite()).count();
        if nobs == 0 {
            return Err(ForecastError::EmptyData);
        }

        let constraints = &self.spec.constraints;
        let period = series.season_length();
        let mut diagnosis = Diagnosis::default();

        if nobs < constraints.min_obs_non_mean {
            diagnosis.notes.push(Note::note(format!(
                "{nobs} observations are fewer than the {} required for non-mean models",
                constraints.min_obs_non_mean
            )));
        } else {
            let adi = average_demand_interval(series.values());
            diagnosis.intermittent = adi > self.spec.intermittency_threshold();
            let shape = SeriesShape {
                nobs,
                period,
                trend: nobs >= constraints.min_obs_trend,
                seasonal: period > 1 && nobs >= constraints.min_season_cycles * period,
            };
            if !shape.trend {
                diagnosis.notes.push(Note::note(format!(
                    "{nobs} observations are fewer than the {} required for trend models",
                    constraints.min_obs_trend
                )));
            }
            if period > 1 && !shape.seasonal {
                diagnosis.notes.push(Note::note(format!(
                    "fewer than {} seasonal cycles of length {period}, seasonal models skipped",
                    constraints.min_season_cycles
                )));
            }

            if diagnosis.intermittent {
                diagnosis.notes.push(Note::note(format!(
                    "series is intermittent (average demand interval {adi:.2}), using IDM"
                )));
                self.try_family(ModelFamily::Idm, series, &shape, &mut diagnosis);
            } else {
                for family in [ModelFamily::Esm, ModelFamily::Ucm, ModelFamily::Arimax] {
                    self.try_family(family, series, &shape, &mut diagnosis);
                }
            }
        }

        if diagnosis.candidates.is_empty() {
            let family = self.spec.first_family().unwrap_or(ModelFamily::Esm);
            let mut model = MeanModel::new();
            model.fit(&series.without_regressors())?;
            diagnosis.notes.push(Note::note(format!(
                "no {family} model could be fitted, using MEAN"
            )));
            diagnosis.candidates.push(CandidateModel::from_model(
                family,
                ModelStructure::Mean,
                &model,
                series,
            )?);
        }

        info!(
            group = %series.key(),
            candidates = diagnosis.candidates.len(),
            intermittent = diagnosis.intermittent,
            "diagnosis complete"
        );
        Ok(diagnosis)
    }

    fn try_family(
        &self,
        family: ModelFamily,
        series: &TimeSeries,
        shape: &SeriesShape,
        diagnosis: &mut Diagnosis,
    ) {
        if !self.spec.is_enabled(family) {
            return;
        }
        let result = match family {
            ModelFamily::Esm => self.esm(series, shape),
            ModelFamily::Idm => self.idm(series),
            ModelFamily::Ucm => self.ucm(series, shape),
            ModelFamily::Arimax => self.arimax(series, shape),
            ModelFamily::Combined => Ok(Vec::new()),
        };

        match result {
            Ok(candidates) => {
                for c in &candidates {
                    debug!(model = %c.label(), rmse = c.fit.rmse, "candidate fitted");
                }
                diagnosis.candidates.extend(candidates);
            }
            Err(Skip::Note(message)) => diagnosis.notes.push(Note::note(message)),
            Err(Skip::Failed(err)) => {
                let err = ForecastError::model_fit(family.label(), &err);
                debug!(error = %err, "model class skipped");
                diagnosis.notes.push(Note::error(&err));
            }
        }
    }

    fn esm(&self, series: &TimeSeries, shape: &SeriesShape) -> FamilyResult {
        let positive = series
            .values()
            .iter()
            .filter(|v| v.is_finite())
            .all(|v| *v > 0.0);
        let methods: Vec<EsmMethod> = self
            .spec
            .esm
            .methods
            .iter()
            .copied()
            .filter(|m| !m.is_seasonal() || shape.seasonal)
            .filter(|m| !m.has_trend() || shape.trend)
            .filter(|m| !m.is_multiplicative() || positive)
            .filter(|m| m.min_observations(shape.period) <= shape.nobs)
            .collect();
        if methods.is_empty() {
            return Err(Skip::Note("no smoothing method fits the series, ESM skipped".into()));
        }

        let series = series.without_regressors();
        let model = fit_best(&series, &methods)?;
        let structure = ModelStructure::Esm(model.method());
        Ok(vec![CandidateModel::from_model(
            ModelFamily::Esm,
            structure,
            &model,
            &series,
        )?])
    }

    fn idm(&self, series: &TimeSeries) -> FamilyResult {
        let series = series.without_regressors();
        let (method, model) = fit_idm(&series, self.spec.idm.method)?;
        Ok(vec![CandidateModel::from_model(
            ModelFamily::Idm,
            ModelStructure::Idm(method),
            model.as_ref(),
            &series,
        )?])
    }

    fn ucm(&self, series: &TimeSeries, shape: &SeriesShape) -> FamilyResult {
        let mut spec = UcmSpec::level();
        if shape.trend {
            spec = spec.with_trend();
        }
        if shape.seasonal {
            spec = spec.with_season(shape.period);
        }

        let series = series.without_regressors();
        let mut model = Ucm::new(spec);
        model.fit(&series)?;
        Ok(vec![CandidateModel::from_model(
            ModelFamily::Ucm,
            ModelStructure::Ucm(spec),
            &model,
            &series,
        )?])
    }

    fn arimax(&self, series: &TimeSeries, shape: &SeriesShape) -> FamilyResult {
        if let Some(order) = self.spec.arimax.order {
            let mut model = Arimax::new(order);
            model.fit(series)?;
            return Ok(vec![CandidateModel::from_model(
                ModelFamily::Arimax,
                ModelStructure::Arimax(order),
                &model,
                series,
            )?]);
        }

        let found = ArimaIdentifier::new(self.spec.arimax.identify).identify(series, shape.seasonal)?;
        let identified: Vec<_> = found.non_seasonal.into_iter().chain(found.seasonal).collect();
        if identified.is_empty() {
            return Err(Skip::Failed(ForecastError::ComputationError(
                "no ARIMA order could be estimated".to_string(),
            )));
        }
        identified
            .into_iter()
            .map(|m| {
                CandidateModel::from_model(
                    ModelFamily::Arimax,
                    ModelStructure::Arimax(m.order),
                    &m.model,
                    series,
                )
                .map_err(Skip::from)
            })
            .collect()
    }
}

struct SeriesShape {
    nobs: usize,
    period: usize,
    trend: bool,
    seasonal: bool,
}

/// Why a family produced no candidate.
enum Skip {
    Note(String),
    Failed(ForecastError),
}

impl From<ForecastError> for Skip {
    fn from(err: ForecastError) -> Self {
        Skip::Failed(err)
    }
}

type FamilyResult = std::result::Result<Vec<CandidateModel>, Skip>;
