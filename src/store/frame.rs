//! Columnar input table.

use crate::error::{ForecastError, Result};
use crate::store::EventDefinition;
use chrono::{DateTime, Utc};

/// Columnar input data: time id columns, BY columns and numeric columns of
/// equal length, plus event definitions.
///
/// Missing numeric values are `NaN`.
///
/// # Example
/// ```
/// use anofox_autoforecast::store::SeriesFrame;
/// use chrono::{TimeZone, Utc};
///
/// let dates = (1990..1993)
///     .map(|y| Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap())
///     .collect();
/// let frame = SeriesFrame::new()
///     .with_time_column("date", dates)
///     .unwrap()
///     .with_column("revenues", vec![4.0, 5.0, 7.0])
///     .unwrap();
/// assert_eq!(frame.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SeriesFrame {
    rows: Option<usize>,
    time_columns: Vec<(String, Vec<DateTime<Utc>>)>,
    by_columns: Vec<(String, Vec<String>)>,
    columns: Vec<(String, Vec<f64>)>,
    events: Vec<EventDefinition>,
}

impl SeriesFrame {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_rows(&mut self, len: usize) -> Result<()> {
        match self.rows {
            Some(rows) if rows != len => Err(ForecastError::DimensionMismatch {
                expected: rows,
                got: len,
            }),
            _ => {
                self.rows = Some(len);
                Ok(())
            }
        }
    }

    pub fn with_time_column(
        mut self,
        name: impl Into<String>,
        values: Vec<DateTime<Utc>>,
    ) -> Result<Self> {
        self.check_rows(values.len())?;
        self.time_columns.push((name.into(), values));
        Ok(self)
    }

    pub fn with_by_column(mut self, name: impl Into<String>, values: Vec<String>) -> Result<Self> {
        self.check_rows(values.len())?;
        self.by_columns.push((name.into(), values));
        Ok(self)
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.check_rows(values.len())?;
        self.columns.push((name.into(), values));
        Ok(self)
    }

    pub fn with_event(mut self, event: EventDefinition) -> Self {
        self.events.push(event);
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn time_column(&self, name: &str) -> Option<&[DateTime<Utc>]> {
        self.time_columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn by_column(&self, name: &str) -> Option<&[String]> {
        self.by_columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn events(&self) -> &[EventDefinition] {
        &self.events
    }

    pub fn event(&self, name: &str) -> Option<&EventDefinition> {
        self.events.iter().find(|e| e.name == name)
    }
}
