//! Series store: turns a columnar input frame into one regular
//! [`TimeSeries`] per BY group.

mod axis;
mod events;
mod frame;

pub use axis::{Accumulation, MissingPolicy, TimeAxis, TrimId};
pub use events::{EventDefinition, EventKind};
pub use frame::SeriesFrame;

use crate::core::{GroupKey, Regressor, RegressorKind, TimeSeries};
use crate::error::{ForecastError, Result};
use axis::carry_forward;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Variables taking part in the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Dependent variable.
    pub dependent: String,
    /// BY variables, in key order.
    #[serde(default)]
    pub by: Vec<String>,
    /// Independent variables used as ARIMAX regressors.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Names of the events used as ARIMAX regressors.
    #[serde(default)]
    pub events: Vec<String>,
}

impl VariableSpec {
    pub fn new(dependent: impl Into<String>) -> Self {
        Self {
            dependent: dependent.into(),
            ..Self::default()
        }
    }

    pub fn with_by(mut self, name: impl Into<String>) -> Self {
        self.by.push(name.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn with_event(mut self, name: impl Into<String>) -> Self {
        self.events.push(name.into());
        self
    }
}

/// A data problem found while loading that did not stop the run.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreWarning {
    pub key: GroupKey,
    pub message: String,
}

/// Series of every BY group, with regressors extended over the horizon.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    keys: Vec<GroupKey>,
    series: BTreeMap<GroupKey, TimeSeries>,
    events: Vec<EventDefinition>,
    warnings: Vec<StoreWarning>,
}

impl SeriesStore {
    /// Load the frame.
    ///
    /// Fails with [`ForecastError::Configuration`] when the time id, the
    /// dependent variable, a BY variable, an input or an event is absent.
    /// Groups without any non-missing dependent value are dropped with a
    /// warning.
    ///
    /// # Example
    /// ```
    /// use anofox_autoforecast::core::Interval;
    /// use anofox_autoforecast::store::{SeriesFrame, SeriesStore, TimeAxis, VariableSpec};
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
    /// let axis = TimeAxis::new("date", Interval::Year);
    /// let store = SeriesStore::load(&frame, &axis, &VariableSpec::new("revenues"), 12).unwrap();
    /// assert_eq!(store.groups().len(), 1);
    /// assert_eq!(store.series_for(&store.groups()[0]).unwrap().len(), 11);
    /// ```
    pub fn load(
        frame: &SeriesFrame,
        axis: &TimeAxis,
        variables: &VariableSpec,
        horizon: usize,
    ) -> Result<Self> {
        let missing = |what: &str, name: &str| {
            ForecastError::Configuration(format!("{what} '{name}' is not in the input data"))
        };

        let times = frame
            .time_column(&axis.id)
            .ok_or_else(|| missing("time id", &axis.id))?;
        let dependent = frame
            .column(&variables.dependent)
            .ok_or_else(|| missing("dependent variable", &variables.dependent))?;
        let by_columns = variables
            .by
            .iter()
            .map(|name| {
                frame
                    .by_column(name)
                    .map(|c| (name.as_str(), c))
                    .ok_or_else(|| missing("BY variable", name))
            })
            .collect::<Result<Vec<_>>>()?;
        let inputs = variables
            .inputs
            .iter()
            .map(|name| {
                frame
                    .column(name)
                    .map(|c| (name.as_str(), c))
                    .ok_or_else(|| missing("independent variable", name))
            })
            .collect::<Result<Vec<_>>>()?;
        let events = variables
            .events
            .iter()
            .map(|name| frame.event(name).cloned().ok_or_else(|| missing("event", name)))
            .collect::<Result<Vec<_>>>()?;

        if frame.is_empty() {
            return Err(ForecastError::EmptyData);
        }

        let mut rows: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
        for row in 0..frame.len() {
            let key = GroupKey::new(
                by_columns
                    .iter()
                    .map(|(name, column)| (name.to_string(), column[row].clone()))
                    .collect(),
            );
            rows.entry(key).or_default().push(row);
        }

        let loader = GroupLoader {
            axis,
            times,
            dependent,
            inputs: &inputs,
            events: &events,
            horizon,
        };

        let mut series = BTreeMap::new();
        let mut warnings = Vec::new();
        for (key, group_rows) in rows {
            match loader.load(&key, &group_rows, &mut warnings)? {
                Some(ts) => {
                    debug!(group = %key, observations = ts.len(), "loaded series");
                    series.insert(key, ts);
                }
                None => warnings.push(StoreWarning {
                    message: format!(
                        "variable '{}' has no nonmissing values",
                        variables.dependent
                    ),
                    key,
                }),
            }
        }
        for w in &warnings {
            warn!(group = %w.key, "{}", w.message);
        }

        Ok(Self {
            keys: series.keys().cloned().collect(),
            series,
            events,
            warnings,
        })
    }

    /// Group keys in processing order.
    pub fn groups(&self) -> &[GroupKey] {
        &self.keys
    }

    pub fn series_for(&self, key: &GroupKey) -> Option<&TimeSeries> {
        self.series.get(key)
    }

    /// Event definitions in use.
    pub fn events(&self) -> &[EventDefinition] {
        &self.events
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn has_inputs(&self) -> bool {
        self.series.values().any(|s| {
            s.regressors()
                .iter()
                .any(|r| r.kind == RegressorKind::Input)
        })
    }

    pub fn warnings(&self) -> &[StoreWarning] {
        &self.warnings
    }
}

struct GroupLoader<'a> {
    axis: &'a TimeAxis,
    times: &'a [DateTime<Utc>],
    dependent: &'a [f64],
    inputs: &'a [(&'a str, &'a [f64])],
    events: &'a [EventDefinition],
    horizon: usize,
}

impl GroupLoader<'_> {
    /// Accumulate one column over the aligned timestamps of the group.
    fn accumulate(
        &self,
        slots: &BTreeMap<DateTime<Utc>, Vec<usize>>,
        column: &[f64],
    ) -> Vec<f64> {
        slots
            .values()
            .map(|rows| {
                let values: Vec<f64> = rows.iter().map(|&r| column[r]).collect();
                self.axis.accumulation.apply(&values)
            })
            .collect()
    }

    fn load(
        &self,
        key: &GroupKey,
        rows: &[usize],
        warnings: &mut Vec<StoreWarning>,
    ) -> Result<Option<TimeSeries>> {
        let interval = self.axis.interval;

        let mut slots: BTreeMap<DateTime<Utc>, Vec<usize>> = BTreeMap::new();
        for &row in rows {
            slots
                .entry(interval.align(self.times[row]))
                .or_default()
                .push(row);
        }
        let (Some(&first), Some(&last)) = (slots.keys().next(), slots.keys().next_back()) else {
            return Ok(None);
        };

        // Full regular index over the observed span, gaps become missing.
        let span = interval.steps_between(first, last).ok_or_else(|| {
            ForecastError::TimestampError(format!("{first} and {last} are not {interval} apart"))
        })? as usize
            + 1;
        let position = |ts: &DateTime<Utc>| {
            interval
                .steps_between(first, *ts)
                .map(|s| s as usize)
                .unwrap_or(0)
        };
        let spread = |values: Vec<f64>| {
            let mut full = vec![f64::NAN; span];
            for (ts, v) in slots.keys().zip(values) {
                full[position(ts)] = v;
            }
            full
        };

        let dependent = spread(self.accumulate(&slots, self.dependent));
        let Some(first_obs) = dependent.iter().position(|v| v.is_finite()) else {
            return Ok(None);
        };
        let last_obs = dependent
            .iter()
            .rposition(|v| v.is_finite())
            .unwrap_or(first_obs);

        let start = if self.axis.trim.trims_left() { first_obs } else { 0 };
        let end = if self.axis.trim.trims_right() {
            last_obs + 1
        } else {
            span
        };

        let mut values = dependent[start..end].to_vec();
        self.axis.missing.apply(&mut values);

        let start_ts = interval.advance(first, start as i64)?;
        let mut series = TimeSeries::from_start(key.clone(), interval, start_ts, values)?
            .with_season_length(self.axis.season_length());
        let extended = series.len() + self.horizon;

        for (name, column) in self.inputs {
            let full = spread(self.accumulate(&slots, column));
            let mut values: Vec<f64> = (start..start + extended)
                .map(|i| full.get(i).copied().unwrap_or(f64::NAN))
                .collect();

            let filled = values.iter().filter(|v| !v.is_finite()).count();
            carry_forward(values.iter_mut());
            carry_forward(values.iter_mut().rev());
            if values.iter().any(|v| !v.is_finite()) {
                values.iter_mut().for_each(|v| *v = 0.0);
                warnings.push(StoreWarning {
                    key: key.clone(),
                    message: format!("input '{name}' has no nonmissing values, set to zero"),
                });
            } else if filled > 0 {
                warnings.push(StoreWarning {
                    key: key.clone(),
                    message: format!(
                        "input '{name}' extended by carrying the last known value over {filled} missing values"
                    ),
                });
            }
            series = series.with_regressor(Regressor::new(*name, RegressorKind::Input, values))?;
        }

        for event in self.events {
            let dummy = event.dummy(interval, start_ts, extended)?;
            series = series.with_regressor(Regressor::new(
                event.name.clone(),
                RegressorKind::Event,
                dummy,
            ))?;
        }

        Ok(Some(series))
    }
}
