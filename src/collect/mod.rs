//! Result collection: assembles the per-group outcomes of a run into the
//! output tables.
//!
//! The forecast, statistics, model info, selection, log and information
//! tables are always produced. The remaining tables are produced only when
//! requested through [`OptionalOutputs`].

mod log;
mod outputs;
mod sink;

pub use log::{LogEntry, Note, Severity};
pub use outputs::{OptionalOutputs, OptionalTable};
pub use sink::{JsonDirSink, MemorySink, TableSink};

use crate::core::{GroupKey, RegressorKind, TimeSeries};
use crate::diagnose::CandidateModel;
use crate::engine::{ForecastRecord, GroupForecast};
use crate::error::{ForecastError, Result};
use crate::models::ModelFamily;
use crate::select::{CandidateScore, SelectionResult};
use crate::store::EventDefinition;
use crate::utils::metrics::FitStatistics;
use crate::utils::ParameterEstimate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::info;

/// How far a group got through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupStatus {
    /// Forecasts were produced.
    Forecast,
    /// The selected model could not be refitted; future records are flagged.
    Failed,
    /// Not processed because the run stopped.
    Skipped,
}

/// Everything one group produced.
#[derive(Debug, Clone)]
pub struct GroupResult {
    pub key: GroupKey,
    pub series: TimeSeries,
    pub candidates: Vec<CandidateModel>,
    pub selection: Option<SelectionResult>,
    pub forecast: Option<GroupForecast>,
    pub log: Vec<LogEntry>,
}

impl GroupResult {
    /// Result of a group before any stage ran; stays skipped until a
    /// forecast is attached.
    pub fn new(series: TimeSeries, log: Vec<LogEntry>) -> Self {
        Self {
            key: series.key().clone(),
            series,
            candidates: Vec::new(),
            selection: None,
            forecast: None,
            log,
        }
    }

    pub fn status(&self) -> GroupStatus {
        match &self.forecast {
            Some(f) if f.failed => GroupStatus::Failed,
            Some(_) => GroupStatus::Forecast,
            None => GroupStatus::Skipped,
        }
    }

    fn selected(&self) -> Option<&CandidateModel> {
        self.selection
            .as_ref()
            .and_then(|s| s.selected_candidate(&self.candidates))
    }
}

/// Outcome of all groups of one run, ordered by group key.
#[derive(Debug, Clone, Default)]
pub struct RunResults {
    pub groups: Vec<GroupResult>,
    /// Run-level log entries.
    pub log: Vec<LogEntry>,
    pub events: Vec<EventDefinition>,
    /// Model selection graph written to OUTFMSG.
    pub graph: Value,
    /// Set when the run stopped on an error.
    pub stopped: bool,
}

/// OUTSTAT row.
#[derive(Debug, Clone, Serialize)]
pub struct StatRow {
    #[serde(flatten)]
    pub key: GroupKey,
    #[serde(rename = "_MODEL_")]
    pub model: String,
    #[serde(rename = "_REGION_")]
    pub region: Region,
    #[serde(flatten)]
    pub statistics: FitStatistics,
}

/// Evaluation region of a statistics row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Fit,
    Forecast,
}

/// OUTMODELINFO row.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfoRow {
    #[serde(flatten)]
    pub key: GroupKey,
    #[serde(rename = "_MODEL_")]
    pub model: Option<String>,
    #[serde(rename = "_MODELTYPE_")]
    pub family: Option<ModelFamily>,
    #[serde(rename = "_STATUS_")]
    pub status: GroupStatus,
    #[serde(rename = "_NOBS_")]
    pub nobs: usize,
    #[serde(rename = "_CANDIDATES_")]
    pub candidates: usize,
    #[serde(rename = "_HOLDOUT_")]
    pub holdout: usize,
    #[serde(rename = "_SEASONAL_")]
    pub seasonal: bool,
    #[serde(rename = "_TREND_")]
    pub trend: bool,
    #[serde(rename = "_INPUTS_")]
    pub inputs: usize,
    #[serde(rename = "_EVENTS_")]
    pub events: usize,
}

/// OUTSELECT row: one candidate over one region.
#[derive(Debug, Clone, Serialize)]
pub struct SelectRow {
    #[serde(flatten)]
    pub key: GroupKey,
    #[serde(rename = "_RANK_")]
    pub rank: usize,
    #[serde(rename = "_SELECTED_")]
    pub selected: bool,
    #[serde(flatten)]
    pub score: CandidateScore,
    #[serde(rename = "_REGION_")]
    pub region: Region,
    #[serde(flatten)]
    pub statistics: FitStatistics,
}

/// OUTINFORMATION row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InformationRow {
    #[serde(rename = "_NAME_")]
    pub name: String,
    #[serde(rename = "_VALUE_")]
    pub value: Value,
}

impl InformationRow {
    fn new(name: &str, value: impl Into<Value>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// OUTEST row.
#[derive(Debug, Clone, Serialize)]
pub struct EstimateRow {
    #[serde(flatten)]
    pub key: GroupKey,
    #[serde(rename = "_MODEL_")]
    pub model: String,
    #[serde(flatten)]
    pub estimate: ParameterEstimate,
}

/// OUTCOMP row.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentRow {
    #[serde(flatten)]
    pub key: GroupKey,
    #[serde(rename = "_MODEL_")]
    pub model: String,
    #[serde(rename = "_COMPONENT_")]
    pub component: String,
    #[serde(rename = "TIME")]
    pub time: DateTime<Utc>,
    #[serde(rename = "VALUE")]
    pub value: Option<f64>,
}

/// OUTEVENTDUMMY and OUTINDEP row.
#[derive(Debug, Clone, Serialize)]
pub struct VariableRow {
    #[serde(flatten)]
    pub key: GroupKey,
    #[serde(rename = "_NAME_")]
    pub name: String,
    #[serde(rename = "TIME")]
    pub time: DateTime<Utc>,
    #[serde(rename = "VALUE")]
    pub value: Option<f64>,
}

/// OUTFMSG row holding the model selection graph as JSON text.
#[derive(Debug, Clone, Serialize)]
pub struct GraphRow {
    #[serde(rename = "_SPEC_")]
    pub spec: String,
}

/// All tables of one run.
#[derive(Debug, Clone, Default)]
pub struct ResultTables {
    pub outfor: Vec<ForecastRecord>,
    pub outstat: Vec<StatRow>,
    pub outmodelinfo: Vec<ModelInfoRow>,
    pub outselect: Vec<SelectRow>,
    pub outlog: Vec<LogEntry>,
    pub outinformation: Vec<InformationRow>,
    pub outest: Option<Vec<EstimateRow>>,
    pub outcomp: Option<Vec<ComponentRow>>,
    pub outevent: Option<Vec<EventDefinition>>,
    pub outeventdummy: Option<Vec<VariableRow>>,
    pub outindep: Option<Vec<VariableRow>>,
    pub outfmsg: Option<Vec<GraphRow>>,
}

fn to_rows<T: Serialize>(rows: &[T]) -> Result<Vec<Value>> {
    rows.iter()
        .map(|row| serde_json::to_value(row).map_err(|e| ForecastError::Output(e.to_string())))
        .collect()
}

impl ResultTables {
    /// Names of the produced tables, mandatory tables first.
    pub fn table_names(&self) -> Vec<&'static str> {
        let mut names = vec!["outfor", "outstat", "outmodelinfo", "outselect", "outlog", "outinformation"];
        let optional = [
            (OptionalTable::OutEst, self.outest.is_some()),
            (OptionalTable::OutComp, self.outcomp.is_some()),
            (OptionalTable::OutEvent, self.outevent.is_some()),
            (OptionalTable::OutEventDummy, self.outeventdummy.is_some()),
            (OptionalTable::OutIndep, self.outindep.is_some()),
            (OptionalTable::OutFmsg, self.outfmsg.is_some()),
        ];
        names.extend(optional.iter().filter(|(_, present)| *present).map(|(t, _)| t.name()));
        names
    }

    /// Log entries with error severity.
    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.outlog.iter().filter(|e| e.severity == Severity::Error)
    }

    /// Hand every produced table to `sink`.
    pub fn write_to(&self, sink: &mut dyn TableSink) -> Result<()> {
        sink.write_table("outfor", to_rows(&self.outfor)?)?;
        sink.write_table("outstat", to_rows(&self.outstat)?)?;
        sink.write_table("outmodelinfo", to_rows(&self.outmodelinfo)?)?;
        sink.write_table("outselect", to_rows(&self.outselect)?)?;
        sink.write_table("outlog", to_rows(&self.outlog)?)?;
        sink.write_table("outinformation", to_rows(&self.outinformation)?)?;
        if let Some(rows) = &self.outest {
            sink.write_table(OptionalTable::OutEst.name(), to_rows(rows)?)?;
        }
        if let Some(rows) = &self.outcomp {
            sink.write_table(OptionalTable::OutComp.name(), to_rows(rows)?)?;
        }
        if let Some(rows) = &self.outevent {
            sink.write_table(OptionalTable::OutEvent.name(), to_rows(rows)?)?;
        }
        if let Some(rows) = &self.outeventdummy {
            sink.write_table(OptionalTable::OutEventDummy.name(), to_rows(rows)?)?;
        }
        if let Some(rows) = &self.outindep {
            sink.write_table(OptionalTable::OutIndep.name(), to_rows(rows)?)?;
        }
        if let Some(rows) = &self.outfmsg {
            sink.write_table(OptionalTable::OutFmsg.name(), to_rows(rows)?)?;
        }
        Ok(())
    }
}

/// Builds [`ResultTables`] from the outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct ResultCollector {
    outputs: OptionalOutputs,
}

impl ResultCollector {
    /// `outputs` should already be validated against the loaded data.
    pub fn new(outputs: OptionalOutputs) -> Self {
        Self { outputs }
    }

    pub fn outputs(&self) -> &OptionalOutputs {
        &self.outputs
    }

    pub fn collect(&self, run: RunResults) -> ResultTables {
        let wants = |table: OptionalTable| self.outputs.contains(table);
        let mut tables = ResultTables {
            outinformation: information(&run),
            outest: wants(OptionalTable::OutEst).then(Vec::new),
            outcomp: wants(OptionalTable::OutComp).then(Vec::new),
            outevent: wants(OptionalTable::OutEvent).then(|| run.events.clone()),
            outeventdummy: wants(OptionalTable::OutEventDummy).then(Vec::new),
            outindep: wants(OptionalTable::OutIndep).then(Vec::new),
            outfmsg: wants(OptionalTable::OutFmsg).then(|| {
                vec![GraphRow {
                    spec: run.graph.to_string(),
                }]
            }),
            ..ResultTables::default()
        };
        tables.outlog = run.log;

        for group in run.groups {
            tables.outmodelinfo.push(model_info(&group));
            tables.outselect.extend(select_rows(&group));

            if let Some(rows) = tables.outeventdummy.as_mut() {
                rows.extend(variable_rows(&group.series, RegressorKind::Event));
            }
            if let Some(rows) = tables.outindep.as_mut() {
                rows.extend(variable_rows(&group.series, RegressorKind::Input));
            }

            if let Some(forecast) = group.forecast {
                if let Some(statistics) = forecast.statistics {
                    tables.outstat.push(StatRow {
                        key: group.key.clone(),
                        model: forecast.model.clone(),
                        region: Region::Fit,
                        statistics,
                    });
                }
                let holdout = group
                    .selection
                    .as_ref()
                    .and_then(|s| s.selected_score())
                    .and_then(|s| s.forecast.clone());
                if let Some(statistics) = holdout {
                    tables.outstat.push(StatRow {
                        key: group.key.clone(),
                        model: forecast.model.clone(),
                        region: Region::Forecast,
                        statistics,
                    });
                }
                if let Some(rows) = tables.outest.as_mut() {
                    rows.extend(forecast.parameters.into_iter().map(|estimate| EstimateRow {
                        key: group.key.clone(),
                        model: forecast.model.clone(),
                        estimate,
                    }));
                }
                if let Some(rows) = tables.outcomp.as_mut() {
                    for component in forecast.components {
                        rows.extend(
                            group
                                .series
                                .timestamps()
                                .iter()
                                .zip(component.values)
                                .map(|(time, value)| ComponentRow {
                                    key: group.key.clone(),
                                    model: forecast.model.clone(),
                                    component: component.name.clone(),
                                    time: *time,
                                    value: value.is_finite().then_some(value),
                                }),
                        );
                    }
                }
                tables.outfor.extend(forecast.records);
            }
            tables.outlog.extend(group.log);
        }

        info!(
            records = tables.outfor.len(),
            groups = tables.outmodelinfo.len(),
            log_entries = tables.outlog.len(),
            "result tables assembled"
        );
        tables
    }
}

fn information(run: &RunResults) -> Vec<InformationRow> {
    let count = |status: GroupStatus| run.groups.iter().filter(|g| g.status() == status).count();
    let entries = || run.log.iter().chain(run.groups.iter().flat_map(|g| g.log.iter()));
    let severity = |severity: Severity| entries().filter(|e| e.severity == severity).count();
    let variables = |kind: RegressorKind| {
        run.groups
            .iter()
            .flat_map(|g| g.series.regressors())
            .filter(|r| r.kind == kind)
            .map(|r| r.name.as_str())
            .collect::<BTreeSet<&str>>()
            .len()
    };
    let (inputs, events) = (variables(RegressorKind::Input), variables(RegressorKind::Event));
    let dependent = usize::from(!run.groups.is_empty());
    let max_time = run
        .groups
        .iter()
        .filter_map(|g| g.series.last_timestamp())
        .max()
        .map(|t| t.to_rfc3339());
    vec![
        InformationRow::new("NUM_GROUPS", run.groups.len()),
        InformationRow::new("MAX_TIME_ID", max_time),
        InformationRow::new("NUM_VARIABLES", dependent + inputs + events),
        InformationRow::new("NUM_INPUTS", inputs),
        InformationRow::new("NUM_EVENTS", events),
        InformationRow::new("GROUPS_FORECAST", count(GroupStatus::Forecast)),
        InformationRow::new("GROUPS_FAILED", count(GroupStatus::Failed)),
        InformationRow::new("GROUPS_SKIPPED", count(GroupStatus::Skipped)),
        InformationRow::new("NUM_NOTES", severity(Severity::Note)),
        InformationRow::new("NUM_WARNINGS", severity(Severity::Warning)),
        InformationRow::new("NUM_ERRORS", severity(Severity::Error)),
        InformationRow::new("STOPPED", run.stopped),
    ]
}

fn model_info(group: &GroupResult) -> ModelInfoRow {
    let selected = group.selected();
    ModelInfoRow {
        key: group.key.clone(),
        model: group.forecast.as_ref().map(|f| f.model.clone()),
        family: group.forecast.as_ref().map(|f| f.family),
        status: group.status(),
        nobs: group.series.values().iter().filter(|v| v.is_finite()).count(),
        candidates: group.candidates.len(),
        holdout: group.selection.as_ref().map_or(0, |s| s.holdout),
        seasonal: selected.is_some_and(|c| c.seasonal),
        trend: selected.is_some_and(|c| c.trend),
        inputs: selected.map_or(0, |c| c.inputs),
        events: selected.map_or(0, |c| c.events),
    }
}

fn select_rows(group: &GroupResult) -> Vec<SelectRow> {
    let Some(selection) = &group.selection else {
        return Vec::new();
    };
    let mut rows = Vec::new();
    for (rank, score) in selection.scores.iter().enumerate() {
        let regions = std::iter::once((Region::Fit, &score.fit))
            .chain(score.forecast.iter().map(|s| (Region::Forecast, s)));
        for (region, statistics) in regions {
            rows.push(SelectRow {
                key: group.key.clone(),
                rank: rank + 1,
                selected: score.index == selection.selected,
                score: score.clone(),
                region,
                statistics: statistics.clone(),
            });
        }
    }
    rows
}

fn variable_rows(series: &TimeSeries, kind: RegressorKind) -> Vec<VariableRow> {
    let mut rows = Vec::new();
    for regressor in series.regressors().iter().filter(|r| r.kind == kind) {
        let extra = regressor.values.len().saturating_sub(series.len());
        let future = series.future_timestamps(extra).unwrap_or_default();
        let times = series.timestamps().iter().chain(future.iter());
        rows.extend(times.zip(&regressor.values).map(|(time, value)| VariableRow {
            key: series.key().clone(),
            name: regressor.name.clone(),
            time: *time,
            value: value.is_finite().then_some(*value),
        }));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Interval, Regressor};
    use crate::diagnose::{DiagnoseSpec, ModelDiagnoser};
    use crate::engine::{EngineSpec, ForecastEngine};
    use crate::select::{ModelSelector, SelectSpec};
    use chrono::TimeZone;

    fn series(region: &str) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let values: Vec<f64> = (0..24)
            .map(|t| 50.0 + t as f64 + ((t * 7) % 5) as f64)
            .collect();
        TimeSeries::from_start(
            GroupKey::new(vec![("region".to_string(), region.to_string())]),
            Interval::Month,
            start,
            values,
        )
        .unwrap()
        .with_season_length(1)
        .with_regressor(Regressor::new("promo", RegressorKind::Input, vec![0.0; 27]))
        .unwrap()
    }

    fn group(series: TimeSeries) -> GroupResult {
        let diagnosis = ModelDiagnoser::new(DiagnoseSpec::with_families(&[ModelFamily::Esm]))
            .unwrap()
            .diagnose(&series)
            .unwrap();
        let selection = ModelSelector::new(SelectSpec::default().with_holdout(6))
            .select(&series, &diagnosis.candidates)
            .unwrap();
        let candidate = selection.selected_candidate(&diagnosis.candidates).unwrap();
        let forecast = ForecastEngine::new(EngineSpec::new(3))
            .unwrap()
            .forecast(&series, candidate)
            .unwrap();
        let log = diagnosis
            .notes
            .iter()
            .cloned()
            .map(|n| LogEntry::group(series.key(), n))
            .collect();
        GroupResult {
            key: series.key().clone(),
            candidates: diagnosis.candidates,
            selection: Some(selection),
            forecast: Some(forecast),
            log,
            series,
        }
    }

    fn run() -> RunResults {
        RunResults {
            groups: vec![group(series("east")), group(series("west"))],
            log: vec![LogEntry::run(Note::note("run started"))],
            graph: serde_json::json!({"families": ["ESM"]}),
            ..RunResults::default()
        }
    }

    #[test]
    fn mandatory_tables_only_by_default() {
        let tables = ResultCollector::default().collect(run());
        assert_eq!(tables.outfor.len(), 2 * (24 + 3));
        assert_eq!(tables.outmodelinfo.len(), 2);
        assert!(tables.outmodelinfo.iter().all(|r| r.status == GroupStatus::Forecast));
        assert_eq!(
            tables.table_names(),
            vec!["outfor", "outstat", "outmodelinfo", "outselect", "outlog", "outinformation"]
        );
        assert!(tables.outest.is_none() && tables.outfmsg.is_none());
        assert_eq!(tables.outlog[0].message, "run started");
    }

    #[test]
    fn statistics_cover_fit_and_holdout_regions() {
        let tables = ResultCollector::default().collect(run());
        let regions: Vec<Region> = tables.outstat.iter().map(|r| r.region).collect();
        assert_eq!(regions, vec![Region::Fit, Region::Forecast, Region::Fit, Region::Forecast]);

        let selected: Vec<&SelectRow> = tables.outselect.iter().filter(|r| r.selected).collect();
        assert!(selected.iter().all(|r| r.rank == 1));
        assert_eq!(selected.len(), 4);
    }

    #[test]
    fn optional_tables_follow_the_request() {
        let outputs = OptionalOutputs::none()
            .with(OptionalTable::OutEst)
            .with(OptionalTable::OutComp)
            .with(OptionalTable::OutIndep)
            .with(OptionalTable::OutFmsg);
        let tables = ResultCollector::new(outputs).collect(run());

        assert!(!tables.outest.as_ref().unwrap().is_empty());
        let components = tables.outcomp.as_ref().unwrap();
        assert!(!components.is_empty());
        assert_eq!(components.len() % 24, 0);
        // 24 observations plus 3 future values per group
        assert_eq!(tables.outindep.as_ref().unwrap().len(), 2 * 27);
        let graph: Value = serde_json::from_str(&tables.outfmsg.as_ref().unwrap()[0].spec).unwrap();
        assert_eq!(graph["families"][0], "ESM");
        assert!(tables.outevent.is_none());
    }

    #[test]
    fn information_counts_groups() {
        let mut results = run();
        let skipped = series("north");
        results.groups.push(GroupResult::new(
            skipped.clone(),
            vec![LogEntry::group(skipped.key(), Note::warning("skipped"))],
        ));
        results.stopped = true;
        let tables = ResultCollector::default().collect(results);
        let value = |name: &str| {
            tables
                .outinformation
                .iter()
                .find(|r| r.name == name)
                .map(|r| r.value.clone())
                .unwrap()
        };
        assert_eq!(value("NUM_GROUPS"), 3);
        assert_eq!(value("GROUPS_FORECAST"), 2);
        assert_eq!(value("GROUPS_SKIPPED"), 1);
        assert_eq!(value("STOPPED"), true);
        assert_eq!(value("MAX_TIME_ID"), "2021-12-01T00:00:00+00:00");
        assert_eq!(value("NUM_INPUTS"), 1);
        assert_eq!(value("NUM_EVENTS"), 0);
        assert_eq!(value("NUM_VARIABLES"), 2);
        assert_eq!(tables.outmodelinfo[2].model, None);
    }

    #[test]
    fn sink_receives_every_table() {
        let outputs = OptionalOutputs::none().with(OptionalTable::OutEst);
        let tables = ResultCollector::new(outputs).collect(run());
        let mut sink = MemorySink::new();
        tables.write_to(&mut sink).unwrap();

        let names: Vec<&str> = sink.names().collect();
        assert_eq!(names.len(), 7);
        let first = &sink.table("outfor").unwrap()[0];
        assert_eq!(first["region"], "east");
        assert_eq!(first["_LEAD_"], 0);
        let select = &sink.table("outselect").unwrap()[0];
        assert_eq!(select["_CRITERION_"], "MASE");
        assert!(select.get("RMSE").is_some());
    }
}
