//! Event definitions and their dummy variables.

use crate::core::Interval;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shape of the dummy variable generated for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    /// One during the event window, zero elsewhere.
    Pulse,
    /// Zero before the event, one from the event on.
    LevelShift,
    /// Zero before the event, then increasing by one per interval.
    Ramp,
}

/// A named event occurring at one or more timestamps.
///
/// `before` moves the start of every occurrence that many intervals earlier.
/// `after` extends pulses past the occurrence and caps ramps; it has no
/// effect on level shifts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    #[serde(rename = "_NAME_")]
    pub name: String,
    #[serde(rename = "_KIND_")]
    pub kind: EventKind,
    #[serde(rename = "_OCCURRENCES_")]
    pub occurrences: Vec<DateTime<Utc>>,
    #[serde(rename = "_BEFORE_", default)]
    pub before: usize,
    #[serde(rename = "_AFTER_", default)]
    pub after: usize,
}

impl EventDefinition {
    pub fn new(name: impl Into<String>, kind: EventKind, occurrences: Vec<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            kind,
            occurrences,
            before: 0,
            after: 0,
        }
    }

    pub fn pulse(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(name, EventKind::Pulse, vec![at])
    }

    pub fn with_window(mut self, before: usize, after: usize) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    /// Dummy values over `len` intervals starting at the aligned `start`.
    ///
    /// Contributions of several occurrences are added.
    pub fn dummy(&self, interval: Interval, start: DateTime<Utc>, len: usize) -> Result<Vec<f64>> {
        let mut values = vec![0.0; len];
        for occurrence in &self.occurrences {
            let at = interval.align(*occurrence);
            let k = interval.steps_between(start, at).ok_or_else(|| {
                ForecastError::TimestampError(format!(
                    "event '{}' at {occurrence} does not fit a {interval} axis",
                    self.name
                ))
            })?;
            let first = k - self.before as i64;
            let last = k + self.after as i64;

            for (t, value) in values.iter_mut().enumerate() {
                let t = t as i64;
                *value += match self.kind {
                    EventKind::Pulse => f64::from(u8::from(t >= first && t <= last)),
                    EventKind::LevelShift => f64::from(u8::from(t >= first)),
                    EventKind::Ramp if t < first => 0.0,
                    EventKind::Ramp if self.after > 0 => (t.min(last) - first) as f64,
                    EventKind::Ramp => (t - first) as f64,
                };
            }
        }
        Ok(values)
    }
}
