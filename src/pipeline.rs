//! The automatic forecasting run: load, then per group diagnose, select
//! and forecast on a rayon pool, then collect.

use crate::collect::{GroupResult, LogEntry, Note, ResultCollector, ResultTables, RunResults};
use crate::config::ForecastConfig;
use crate::core::TimeSeries;
use crate::diagnose::ModelDiagnoser;
use crate::engine::{ForecastEngine, GroupForecast};
use crate::error::{ForecastError, Result};
use crate::models::ModelFamily;
use crate::select::ModelSelector;
use crate::store::{SeriesFrame, SeriesStore};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Tables of a run, with the error that stopped it when `error_stop` is
/// set.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub tables: ResultTables,
    /// First unrecoverable group error in group order.
    pub fatal: Option<ForecastError>,
}

impl RunOutcome {
    /// The tables, or the fatal error when the run stopped.
    pub fn into_result(self) -> Result<ResultTables> {
        match self.fatal {
            Some(err) => Err(err),
            None => Ok(self.tables),
        }
    }
}

/// Automatic forecasting over every group of a frame.
///
/// # Example
/// ```
/// use anofox_autoforecast::prelude::*;
/// use chrono::{TimeZone, Utc};
///
/// let dates = (1990..=2000)
///     .map(|y| Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap())
///     .collect();
/// let frame = SeriesFrame::new()
///     .with_time_column("date", dates)
///     .unwrap()
///     .with_column("revenues", vec![4.0, 5.0, 7.0, 6.0, 8.0, 9.0, 5.0, 2.0, 3.5, 5.5, 6.5])
///     .unwrap();
///
/// let config = ForecastConfig::new(
///     TimeAxis::new("date", Interval::Year),
///     VariableSpec::new("revenues"),
/// )
/// .with_horizon(12);
/// let tables = AutoForecast::new(config).unwrap().run(&frame).unwrap().into_result().unwrap();
/// assert_eq!(tables.outfor.iter().filter(|r| r.is_future()).count(), 12);
/// ```
#[derive(Debug, Clone)]
pub struct AutoForecast {
    config: ForecastConfig,
    diagnoser: ModelDiagnoser,
    selector: ModelSelector,
    engine: ForecastEngine,
}

impl AutoForecast {
    /// Validate the configuration and build the stages.
    pub fn new(config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        let diagnoser = ModelDiagnoser::new(config.diagnose.clone())?;
        let selector = ModelSelector::new(config.select)
            .with_min_observations(config.diagnose.constraints.min_obs_non_mean);
        let engine = ForecastEngine::new(config.forecast)?;
        Ok(Self {
            config,
            diagnoser,
            selector,
            engine,
        })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast every group of `frame`.
    ///
    /// Only configuration and load problems fail the call. Group errors are
    /// logged; with `error_stop` the first one also stops the groups not yet
    /// started and is returned in [`RunOutcome::fatal`].
    pub fn run(&self, frame: &SeriesFrame) -> Result<RunOutcome> {
        let config = &self.config;
        let store = SeriesStore::load(
            frame,
            &config.time_axis,
            &config.variables,
            config.forecast.horizon,
        )?;
        info!(
            groups = store.groups().len(),
            horizon = config.forecast.horizon,
            error_stop = config.error_stop,
            "forecast run started"
        );

        let mut log = Vec::new();
        let (outputs, downgrades) = config.outputs.validate(store.has_events(), store.has_inputs());
        for note in downgrades {
            warn!(detail = %note.message, "optional table dropped");
            log.push(LogEntry::run(note));
        }
        log.extend(
            store
                .warnings()
                .iter()
                .filter(|w| store.series_for(&w.key).is_none())
                .map(|w| LogEntry::group(&w.key, Note::warning(w.message.clone()))),
        );

        let abort = AtomicBool::new(false);
        let process = || -> Vec<(GroupResult, Option<ForecastError>)> {
            store
                .groups()
                .par_iter()
                .filter_map(|key| store.series_for(key))
                .map(|series| self.process_group(&store, series, &abort))
                .collect()
        };
        let processed = match config.threads {
            Some(threads) => ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| ForecastError::Configuration(format!("thread pool: {e}")))?
                .install(process),
            None => process(),
        };

        let (groups, fatal) = gather(processed, config.error_stop, &mut log);
        let run = RunResults {
            groups,
            log,
            events: store.events().to_vec(),
            graph: config.selection_graph(),
            stopped: fatal.is_some(),
        };
        let tables = ResultCollector::new(outputs).collect(run);
        info!(
            records = tables.outfor.len(),
            errors = tables.errors().count(),
            stopped = fatal.is_some(),
            "forecast run finished"
        );
        Ok(RunOutcome { tables, fatal })
    }

    /// Diagnose, select and forecast one group. The error is returned when
    /// no forecast could be produced.
    fn process_group(
        &self,
        store: &SeriesStore,
        series: &TimeSeries,
        abort: &AtomicBool,
    ) -> (GroupResult, Option<ForecastError>) {
        let key = series.key();
        let warnings = store
            .warnings()
            .iter()
            .filter(|w| &w.key == key)
            .map(|w| LogEntry::group(key, Note::warning(w.message.clone())))
            .collect();
        let mut result = GroupResult::new(series.clone(), warnings);

        if self.config.error_stop && abort.load(Ordering::SeqCst) {
            debug!(group = %key, "skipped after stop");
            result.log.push(LogEntry::group(
                key,
                Note::warning("group not processed because the run stopped"),
            ));
            return (result, None);
        }

        match self.forecast_group(series, &mut result) {
            Ok(forecast) => {
                accept_forecast(&mut result, forecast);
                (result, None)
            }
            Err(err) => {
                warn!(group = %key, error = %err, "no forecast produced");
                result.log.push(LogEntry::group(key, Note::error(&err)));
                if self.config.error_stop {
                    abort.store(true, Ordering::SeqCst);
                }
                let (model, family) = self.failed_model(&result);
                match self.engine.failed(series, model, family) {
                    Ok(flagged) => result.forecast = Some(flagged),
                    Err(e) => result.log.push(LogEntry::group(key, Note::error(&e))),
                }
                (result, Some(err))
            }
        }
    }

    fn forecast_group(&self, series: &TimeSeries, result: &mut GroupResult) -> Result<GroupForecast> {
        let key = series.key();
        let diagnosis = self.diagnoser.diagnose(series)?;
        result
            .log
            .extend(diagnosis.notes.into_iter().map(|n| LogEntry::group(key, n)));
        result.candidates = diagnosis.candidates;

        let selection = self.selector.select(series, &result.candidates)?;
        result
            .log
            .extend(selection.notes.iter().cloned().map(|n| LogEntry::group(key, n)));
        let selected = selection
            .selected_candidate(&result.candidates)
            .cloned()
            .ok_or_else(|| ForecastError::InvalidParameter("no candidate selected".to_string()));
        result.selection = Some(selection);

        self.engine.forecast(series, &selected?)
    }

    /// Label and family reported for a group whose forecast failed.
    fn failed_model(&self, result: &GroupResult) -> (String, ModelFamily) {
        result
            .selection
            .as_ref()
            .and_then(|s| s.selected_candidate(&result.candidates))
            .map(|c| (c.label(), c.family))
            .unwrap_or_else(|| {
                let family = self
                    .config
                    .diagnose
                    .first_family()
                    .unwrap_or(ModelFamily::Esm);
                ("NONE".to_string(), family)
            })
    }
}

/// Attach a forecast to its group, logging any steps it had to flag.
fn accept_forecast(result: &mut GroupResult, forecast: GroupForecast) {
    if let Some(note) = forecast.step_note() {
        result.log.push(LogEntry::group(&forecast.key, note));
    }
    result.forecast = Some(forecast);
}

/// Split processed groups into results and the error that stops the run:
/// the first failed group in key order when `error_stop` is set.
fn gather(
    processed: Vec<(GroupResult, Option<ForecastError>)>,
    error_stop: bool,
    log: &mut Vec<LogEntry>,
) -> (Vec<GroupResult>, Option<ForecastError>) {
    let mut fatal = None;
    let mut groups = Vec::with_capacity(processed.len());
    for (result, error) in processed {
        if let Some(err) = error {
            if error_stop && fatal.is_none() {
                let stop = ForecastError::FatalRun {
                    group: result.key.to_string(),
                    reason: err.to_string(),
                };
                log.push(LogEntry::run(Note::error(&stop)));
                fatal = Some(stop);
            }
        }
        groups.push(result);
    }
    (groups, fatal)
}
