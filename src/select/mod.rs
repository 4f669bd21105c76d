//! Model selection: ranks the diagnosed candidates of one series.

mod spec;

pub use spec::{SeasonTest, SelectSpec, SelectionCriterion};

use crate::collect::Note;
use crate::core::TimeSeries;
use crate::diagnose::CandidateModel;
use crate::error::{ForecastError, Result};
use crate::models::{ModelFamily, ModelStructure};
use crate::utils::metrics::{naive_scale, FitStatistics};
use crate::utils::stats::is_seasonal;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Evaluation of one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    /// Index into the candidate list; the combined candidate follows the
    /// diagnosed ones.
    #[serde(skip)]
    pub index: usize,
    #[serde(rename = "_MODEL_")]
    pub label: String,
    #[serde(rename = "_MODELTYPE_")]
    pub family: ModelFamily,
    #[serde(rename = "_CRITERION_")]
    pub criterion: SelectionCriterion,
    /// `None` when undefined; such candidates rank last.
    #[serde(rename = "_VALUE_")]
    pub value: Option<f64>,
    /// In-sample statistics.
    #[serde(skip)]
    pub fit: FitStatistics,
    /// Holdout statistics, when a holdout was evaluated.
    #[serde(skip)]
    pub forecast: Option<FitStatistics>,
    /// Excluded by the season test.
    #[serde(rename = "_EXCLUDED_")]
    pub excluded: bool,
}

/// Ranked candidates of one series.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    /// Scores in rank order, excluded candidates last.
    pub scores: Vec<CandidateScore>,
    /// Index of the chosen candidate.
    pub selected: usize,
    /// Ensemble candidate, addressed by index `candidates.len()`.
    pub combined: Option<CandidateModel>,
    /// Held-out observations, zero when evaluated in-sample.
    pub holdout: usize,
    pub notes: Vec<Note>,
}

impl SelectionResult {
    /// Candidate at `index`, counting the combined candidate last.
    pub fn candidate<'a>(
        &'a self,
        candidates: &'a [CandidateModel],
        index: usize,
    ) -> Option<&'a CandidateModel> {
        candidates.get(index).or_else(|| {
            (index == candidates.len())
                .then_some(self.combined.as_ref())
                .flatten()
        })
    }

    /// The chosen candidate.
    pub fn selected_candidate<'a>(
        &'a self,
        candidates: &'a [CandidateModel],
    ) -> Option<&'a CandidateModel> {
        self.candidate(candidates, self.selected)
    }

    pub fn selected_score(&self) -> Option<&CandidateScore> {
        self.scores.iter().find(|s| s.index == self.selected)
    }
}

/// Ranks candidates by a [`SelectionCriterion`].
#[derive(Debug, Clone)]
pub struct ModelSelector {
    spec: SelectSpec,
    min_observations: usize,
}

impl ModelSelector {
    pub fn new(spec: SelectSpec) -> Self {
        Self {
            spec,
            min_observations: 5,
        }
    }

    /// Smallest estimation sample that still allows a holdout.
    pub fn with_min_observations(mut self, min_observations: usize) -> Self {
        self.min_observations = min_observations;
        self
    }

    pub fn spec(&self) -> &SelectSpec {
        &self.spec
    }

    /// Rank `candidates` and choose the best.
    ///
    /// Fails only when `candidates` is empty.
    pub fn select(&self, series: &TimeSeries, candidates: &[CandidateModel]) -> Result<SelectionResult> {
        if candidates.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "no candidate to select from".to_string(),
            ));
        }
        let mut notes = Vec::new();

        let excluded = self.season_exclusions(series, candidates, &mut notes);

        let combined = if self.spec.combine {
            self.combine(series, candidates, &excluded, &mut notes)
        } else {
            None
        };

        let n = series.len();
        let mut holdout = self.spec.holdout_for(n).min(n);
        if holdout > 0 && n - holdout < self.min_observations {
            notes.push(Note::note(format!(
                "holdout of {holdout} leaves fewer than {} observations, evaluating in-sample",
                self.min_observations
            )));
            holdout = 0;
        }

        let all: Vec<&CandidateModel> = candidates.iter().chain(combined.as_ref()).collect();
        let mut scores: Vec<CandidateScore> = all
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let excluded = excluded.get(index).copied().unwrap_or(false);
                self.score(series, index, candidate, holdout, excluded, &mut notes)
            })
            .collect();

        scores.sort_by(|a, b| {
            a.excluded
                .cmp(&b.excluded)
                .then_with(|| compare_values(a.value, b.value))
                .then_with(|| a.family.cmp(&b.family))
                .then_with(|| a.index.cmp(&b.index))
        });
        let selected = scores.first().map_or(0, |s| s.index);

        if let Some(best) = scores.first() {
            info!(
                group = %series.key(),
                model = %best.label,
                criterion = self.spec.criterion.name(),
                value = best.value,
                "model selected"
            );
        }

        Ok(SelectionResult {
            scores,
            selected,
            combined,
            holdout,
            notes,
        })
    }

    /// Per candidate, whether the season test removes it.
    fn season_exclusions(
        &self,
        series: &TimeSeries,
        candidates: &[CandidateModel],
        notes: &mut Vec<Note>,
    ) -> Vec<bool> {
        let SeasonTest::Significance(alpha) = self.spec.season_test else {
            return vec![false; candidates.len()];
        };
        if is_seasonal(series.values(), series.season_length(), alpha) {
            return vec![false; candidates.len()];
        }

        let excluded: Vec<bool> = candidates.iter().map(|c| c.seasonal).collect();
        if excluded.iter().all(|&e| e) {
            notes.push(Note::note(
                "seasonality is not significant but only seasonal models exist, keeping them",
            ));
            return vec![false; candidates.len()];
        }
        if excluded.iter().any(|&e| e) {
            notes.push(Note::note(
                "seasonality is not significant, seasonal models excluded",
            ));
        }
        excluded
    }

    fn combine(
        &self,
        series: &TimeSeries,
        candidates: &[CandidateModel],
        excluded: &[bool],
        notes: &mut Vec<Note>,
    ) -> Option<CandidateModel> {
        let members: Vec<ModelStructure> = candidates
            .iter()
            .zip(excluded)
            .filter(|(_, e)| !**e)
            .map(|(c, _)| c.structure.clone())
            .collect();
        if members.len() < 2 {
            return None;
        }

        let structure = ModelStructure::Combined(members);
        let fitted = structure.build().and_then(|mut model| {
            model.fit(series)?;
            CandidateModel::from_model(ModelFamily::Combined, structure.clone(), model.as_ref(), series)
        });
        match fitted {
            Ok(candidate) => Some(candidate),
            Err(err) => {
                notes.push(Note::error(&ForecastError::model_fit("COMBINED", &err)));
                None
            }
        }
    }

    fn score(
        &self,
        series: &TimeSeries,
        index: usize,
        candidate: &CandidateModel,
        holdout: usize,
        excluded: bool,
        notes: &mut Vec<Note>,
    ) -> CandidateScore {
        let criterion = self.spec.criterion;
        let forecast = if holdout > 0 {
            match holdout_statistics(series, &candidate.structure, holdout) {
                Ok(stats) => Some(stats),
                Err(err) => {
                    debug!(model = %candidate.label(), error = %err, "holdout evaluation failed");
                    notes.push(Note::error(&ForecastError::model_fit(
                        candidate.label(),
                        &err,
                    )));
                    None
                }
            }
        } else {
            None
        };

        let value = if holdout > 0 && !criterion.is_in_sample_only() {
            forecast.as_ref().and_then(|s| criterion.value(s))
        } else {
            criterion.value(&candidate.fit)
        };

        CandidateScore {
            index,
            label: candidate.label(),
            family: candidate.family,
            criterion,
            value,
            fit: candidate.fit.clone(),
            forecast,
            excluded,
        }
    }
}

/// Refit on the leading part and evaluate forecasts of the held-out tail.
fn holdout_statistics(
    series: &TimeSeries,
    structure: &ModelStructure,
    holdout: usize,
) -> Result<FitStatistics> {
    let lead = series.len() - holdout;
    let leading = series.truncate(lead)?;
    let mut model = structure.build()?;
    model.fit(&leading)?;
    let forecast = model.predict(holdout)?;
    FitStatistics::compute(
        &series.values()[lead..],
        forecast.point(),
        model.num_params(),
        naive_scale(leading.values(), series.season_length()),
    )
}

/// Defined values first, ascending.
fn compare_values(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GroupKey, Interval};
    use crate::diagnose::{DiagnoseSpec, ModelDiagnoser};
    use crate::models::exponential::{EsmMethod, ExponentialSmoothing};
    use crate::models::{Forecaster, MeanModel};
    use chrono::{TimeZone, Utc};

    fn yearly(values: Vec<f64>) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).unwrap();
        TimeSeries::from_start(GroupKey::empty(), Interval::Year, start, values).unwrap()
    }

    fn candidate(
        family: ModelFamily,
        structure: ModelStructure,
        model: &mut dyn Forecaster,
        series: &TimeSeries,
    ) -> CandidateModel {
        model.fit(series).unwrap();
        CandidateModel::from_model(family, structure, model, series).unwrap()
    }

    fn trend_candidates(series: &TimeSeries) -> Vec<CandidateModel> {
        vec![
            candidate(
                ModelFamily::Ucm,
                ModelStructure::Mean,
                &mut MeanModel::new(),
                series,
            ),
            candidate(
                ModelFamily::Esm,
                ModelStructure::Esm(EsmMethod::Linear),
                &mut ExponentialSmoothing::new(EsmMethod::Linear),
                series,
            ),
        ]
    }

    #[test]
    fn lowest_criterion_wins() {
        let series = yearly((0..20).map(|i| 5.0 + 2.0 * i as f64).collect());
        let candidates = trend_candidates(&series);
        let result = ModelSelector::new(SelectSpec::default().with_criterion(SelectionCriterion::Rmse))
            .select(&series, &candidates)
            .unwrap();

        assert_eq!(result.selected, 1);
        let best = result.selected_score().unwrap().value.unwrap();
        for score in &result.scores {
            if let Some(v) = score.value {
                assert!(best <= v);
            }
        }
        assert_eq!(result.holdout, 0);
    }

    #[test]
    fn ties_go_to_the_earlier_family() {
        let series = yearly(vec![3.0, 5.0, 4.0, 6.0, 5.0, 4.0]);
        let mean = |family| candidate(family, ModelStructure::Mean, &mut MeanModel::new(), &series);
        let candidates = vec![mean(ModelFamily::Arimax), mean(ModelFamily::Esm), mean(ModelFamily::Esm)];

        let result = ModelSelector::new(SelectSpec::default())
            .select(&series, &candidates)
            .unwrap();
        assert_eq!(result.selected, 1);
        let order: Vec<usize> = result.scores.iter().map(|s| s.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn undefined_values_rank_last() {
        assert_eq!(compare_values(Some(10.0), None), Ordering::Less);
        assert_eq!(compare_values(None, Some(-1.0)), Ordering::Greater);
        assert_eq!(compare_values(Some(1.0), Some(2.0)), Ordering::Less);
    }

    #[test]
    fn holdout_refits_on_leading_part() {
        let series = yearly((0..20).map(|i| 5.0 + 2.0 * i as f64).collect());
        let candidates = trend_candidates(&series);
        let result = ModelSelector::new(SelectSpec::default().with_holdout(4))
            .select(&series, &candidates)
            .unwrap();

        assert_eq!(result.holdout, 4);
        assert_eq!(result.selected, 1);
        for score in &result.scores {
            assert_eq!(score.forecast.as_ref().unwrap().nobs, 4);
        }
    }

    #[test]
    fn short_leading_part_disables_holdout() {
        let series = yearly(vec![3.0, 5.0, 4.0, 6.0, 5.0, 4.0, 5.0]);
        let candidates = trend_candidates(&series);
        let result = ModelSelector::new(SelectSpec::default().with_holdout(4))
            .select(&series, &candidates)
            .unwrap();
        assert_eq!(result.holdout, 0);
        assert!(result.notes.iter().any(|n| n.message.contains("in-sample")));
        assert!(result.scores.iter().all(|s| s.forecast.is_none()));
    }

    #[test]
    fn combined_candidate_is_ranked() {
        let series = yearly((0..20).map(|i| 5.0 + 2.0 * i as f64 + (i % 3) as f64).collect());
        let candidates = trend_candidates(&series);
        let result = ModelSelector::new(SelectSpec::default().with_combine(true))
            .select(&series, &candidates)
            .unwrap();

        let combined = result.combined.as_ref().unwrap();
        assert_eq!(combined.family, ModelFamily::Combined);
        assert_eq!(result.scores.len(), 3);
        let index = result
            .scores
            .iter()
            .find(|s| s.family == ModelFamily::Combined)
            .unwrap()
            .index;
        assert_eq!(index, 2);
        assert_eq!(
            result.candidate(&candidates, index).unwrap().family,
            ModelFamily::Combined
        );
    }

    #[test]
    fn season_test_excludes_seasonal_candidates() {
        let start = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();
        let values: Vec<f64> = (0..48).map(|i| 20.0 + ((i * 37) % 11) as f64).collect();
        let series = TimeSeries::from_start(GroupKey::empty(), Interval::Quarter, start, values).unwrap();
        let diagnosis = ModelDiagnoser::new(DiagnoseSpec::with_families(&[ModelFamily::Ucm]))
            .unwrap()
            .diagnose(&series)
            .unwrap();
        let mut candidates = diagnosis.candidates;
        candidates.push(candidate(
            ModelFamily::Esm,
            ModelStructure::Esm(EsmMethod::Simple),
            &mut ExponentialSmoothing::new(EsmMethod::Simple),
            &series,
        ));

        let result = ModelSelector::new(
            SelectSpec::default().with_season_test(SeasonTest::Significance(0.05)),
        )
        .select(&series, &candidates)
        .unwrap();
        let selected = result.selected_candidate(&candidates).unwrap();
        assert!(!selected.seasonal);
        assert!(result.scores.iter().any(|s| s.excluded));
    }

    #[test]
    fn season_test_tolerates_a_gap() {
        let start = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();
        let mut values: Vec<f64> = (0..60)
            .map(|i| 100.0 + 30.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect();
        values[20] = f64::NAN;
        let series = TimeSeries::from_start(GroupKey::empty(), Interval::Month, start, values).unwrap();

        let plain = candidate(ModelFamily::Esm, ModelStructure::Mean, &mut MeanModel::new(), &series);
        let mut seasonal = plain.clone();
        seasonal.family = ModelFamily::Ucm;
        seasonal.seasonal = true;

        let result = ModelSelector::new(
            SelectSpec::default().with_season_test(SeasonTest::Significance(0.05)),
        )
        .select(&series, &[plain, seasonal])
        .unwrap();
        assert!(result.scores.iter().all(|s| !s.excluded));
    }

    #[test]
    fn empty_candidate_list_fails() {
        let series = yearly(vec![1.0, 2.0]);
        assert!(ModelSelector::new(SelectSpec::default())
            .select(&series, &[])
            .is_err());
    }
}
