//! Time axis specification: interval, accumulation, missing values and
//! trimming.

use crate::core::Interval;
use crate::utils::stats::finite_mean;
use serde::{Deserialize, Serialize};

/// How rows falling into the same interval are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accumulation {
    #[default]
    Total,
    Average,
    Minimum,
    Maximum,
    First,
    Last,
}

impl Accumulation {
    /// Combine the values of one interval in row order, ignoring missing
    /// values. Returns `NaN` when every value is missing.
    pub fn apply(self, values: &[f64]) -> f64 {
        let mut finite = values.iter().copied().filter(|v| v.is_finite());
        match self {
            Accumulation::Total => finite
                .fold(None, |acc: Option<f64>, v| Some(acc.unwrap_or(0.0) + v))
                .unwrap_or(f64::NAN),
            Accumulation::Average => finite_mean(values),
            Accumulation::Minimum => finite.reduce(f64::min).unwrap_or(f64::NAN),
            Accumulation::Maximum => finite.reduce(f64::max).unwrap_or(f64::NAN),
            Accumulation::First => finite.next().unwrap_or(f64::NAN),
            Accumulation::Last => finite.last().unwrap_or(f64::NAN),
        }
    }
}

/// Replacement for missing observations inside the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Keep missing values.
    #[default]
    Missing,
    Zero,
    /// Last preceding non-missing value.
    Previous,
    /// First following non-missing value.
    Next,
    /// Mean of the non-missing values.
    Average,
}

impl MissingPolicy {
    /// Replace missing values in place. Values without a neighbour to copy
    /// from stay missing.
    pub fn apply(self, values: &mut [f64]) {
        match self {
            MissingPolicy::Missing => {}
            MissingPolicy::Zero => values
                .iter_mut()
                .filter(|v| !v.is_finite())
                .for_each(|v| *v = 0.0),
            MissingPolicy::Previous => carry_forward(values.iter_mut()),
            MissingPolicy::Next => carry_forward(values.iter_mut().rev()),
            MissingPolicy::Average => {
                let mean = finite_mean(values);
                values
                    .iter_mut()
                    .filter(|v| !v.is_finite())
                    .for_each(|v| *v = mean);
            }
        }
    }
}

pub(crate) fn carry_forward<'a>(values: impl Iterator<Item = &'a mut f64>) {
    let mut last = f64::NAN;
    for v in values {
        if v.is_finite() {
            last = *v;
        } else {
            *v = last;
        }
    }
}

/// Which missing dependent values at the ends of the span are dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimId {
    None,
    Left,
    Right,
    #[default]
    Both,
}

impl TrimId {
    pub fn trims_left(self) -> bool {
        matches!(self, TrimId::Left | TrimId::Both)
    }

    pub fn trims_right(self) -> bool {
        matches!(self, TrimId::Right | TrimId::Both)
    }
}

fn default_id() -> String {
    "date".to_string()
}

fn default_interval() -> Interval {
    Interval::Month
}

/// Time axis of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    /// Name of the time id column.
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "default_interval")]
    pub interval: Interval,
    /// Overrides the season length implied by the interval.
    #[serde(default)]
    pub season_length: Option<usize>,
    #[serde(default)]
    pub accumulation: Accumulation,
    #[serde(default, rename = "setmissing")]
    pub missing: MissingPolicy,
    #[serde(default)]
    pub trim: TrimId,
}

impl Default for TimeAxis {
    fn default() -> Self {
        Self {
            id: default_id(),
            interval: default_interval(),
            season_length: None,
            accumulation: Accumulation::default(),
            missing: MissingPolicy::default(),
            trim: TrimId::default(),
        }
    }
}

impl TimeAxis {
    pub fn new(id: impl Into<String>, interval: Interval) -> Self {
        Self {
            id: id.into(),
            interval,
            ..Self::default()
        }
    }

    pub fn with_accumulation(mut self, accumulation: Accumulation) -> Self {
        self.accumulation = accumulation;
        self
    }

    pub fn with_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_trim(mut self, trim: TrimId) -> Self {
        self.trim = trim;
        self
    }

    pub fn with_season_length(mut self, season_length: usize) -> Self {
        self.season_length = Some(season_length);
        self
    }

    pub fn season_length(&self) -> usize {
        self.season_length
            .unwrap_or_else(|| self.interval.season_length())
    }
}
