//! TimeSeries data structure for one BY group.

use crate::core::Interval;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Values of the BY variables identifying one series.
///
/// Ordering is lexicographic over the values in BY-variable order, which
/// fixes the processing and output order of groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pairs: Vec<(String, String)>,
}

impl GroupKey {
    /// Key of a run without BY variables.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.pairs.is_empty() {
            return f.write_str("_ALL_");
        }
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Serialized as one column per BY variable, in BY-variable order.
impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.pairs.len()))?;
        for (name, value) in &self.pairs {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Role of a regressor in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressorKind {
    /// Independent variable from the input data.
    Input,
    /// Dummy variable derived from an event definition.
    Event,
}

/// A named regressor aligned to the owning series' time index.
///
/// `values` starts at the first observation and may extend past the last
/// one to supply future values for the forecast horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct Regressor {
    pub name: String,
    pub kind: RegressorKind,
    pub values: Vec<f64>,
}

impl Regressor {
    pub fn new(name: impl Into<String>, kind: RegressorKind, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }
}

/// A regular time series of one group with its regressors.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    key: GroupKey,
    interval: Interval,
    season_length: usize,
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
    regressors: Vec<Regressor>,
}

impl TimeSeries {
    /// Create a series, validating that timestamps are aligned, strictly
    /// increasing and exactly one interval apart.
    pub fn new(
        key: GroupKey,
        interval: Interval,
        timestamps: Vec<DateTime<Utc>>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: timestamps.len(),
                got: values.len(),
            });
        }

        for (i, ts) in timestamps.iter().enumerate() {
            if !interval.is_aligned(*ts) {
                return Err(ForecastError::TimestampError(format!(
                    "timestamp {ts} is not aligned to a {interval} boundary"
                )));
            }
            if i > 0 {
                if *ts <= timestamps[i - 1] {
                    return Err(ForecastError::TimestampError(
                        "timestamps must be strictly increasing".to_string(),
                    ));
                }
                if interval.steps_between(timestamps[i - 1], *ts) != Some(1) {
                    return Err(ForecastError::TimestampError(format!(
                        "gap between {} and {ts} is not one {interval}",
                        timestamps[i - 1]
                    )));
                }
            }
        }

        Ok(Self {
            key,
            interval,
            season_length: interval.season_length(),
            timestamps,
            values,
            regressors: Vec::new(),
        })
    }

    /// Build a series from a start timestamp and consecutive values.
    pub fn from_start(
        key: GroupKey,
        interval: Interval,
        start: DateTime<Utc>,
        values: Vec<f64>,
    ) -> Result<Self> {
        let start = interval.align(start);
        let timestamps = (0..values.len())
            .map(|i| interval.advance(start, i as i64))
            .collect::<Result<Vec<_>>>()?;
        Self::new(key, interval, timestamps, values)
    }

    /// Override the seasonal cycle length implied by the interval.
    pub fn with_season_length(mut self, season_length: usize) -> Self {
        self.season_length = season_length.max(1);
        self
    }

    /// Attach a regressor. Its values must cover at least the observed span.
    pub fn with_regressor(mut self, regressor: Regressor) -> Result<Self> {
        if regressor.values.len() < self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: regressor.values.len(),
            });
        }
        self.regressors.push(regressor);
        Ok(self)
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn season_length(&self) -> usize {
        self.season_length
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    pub fn has_missing_values(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }

    pub fn regressors(&self) -> &[Regressor] {
        &self.regressors
    }

    pub fn has_regressors(&self) -> bool {
        !self.regressors.is_empty()
    }

    pub fn has_events(&self) -> bool {
        self.regressors
            .iter()
            .any(|r| r.kind == RegressorKind::Event)
    }

    pub fn regressor(&self, name: &str) -> Option<&Regressor> {
        self.regressors.iter().find(|r| r.name == name)
    }

    /// Regressor values over the observed span, in attachment order.
    pub fn regressor_history(&self) -> Vec<&[f64]> {
        self.regressors
            .iter()
            .map(|r| &r.values[..self.len()])
            .collect()
    }

    /// Regressor values for the `horizon` steps after the last observation.
    pub fn regressor_future(&self, horizon: usize) -> Result<Vec<&[f64]>> {
        let n = self.len();
        self.regressors
            .iter()
            .map(|r| {
                r.values.get(n..n + horizon).ok_or_else(|| {
                    ForecastError::InvalidParameter(format!(
                        "regressor '{}' has no future values for {horizon} steps",
                        r.name
                    ))
                })
            })
            .collect()
    }

    /// Timestamps of the `horizon` intervals following the last observation.
    pub fn future_timestamps(&self, horizon: usize) -> Result<Vec<DateTime<Utc>>> {
        let last = self.last_timestamp().ok_or(ForecastError::EmptyData)?;
        (1..=horizon)
            .map(|h| self.interval.advance(last, h as i64))
            .collect()
    }

    /// Copy containing the first `len` observations.
    ///
    /// Regressors keep their full length, so the dropped tail becomes
    /// "future" regressor data for holdout evaluation.
    pub fn truncate(&self, len: usize) -> Result<TimeSeries> {
        if len > self.len() {
            return Err(ForecastError::IndexOutOfBounds {
                index: len,
                size: self.len(),
            });
        }
        Ok(TimeSeries {
            key: self.key.clone(),
            interval: self.interval,
            season_length: self.season_length,
            timestamps: self.timestamps[..len].to_vec(),
            values: self.values[..len].to_vec(),
            regressors: self.regressors.clone(),
        })
    }

    /// Copy with the given values replacing the observations.
    pub fn with_values(&self, values: Vec<f64>) -> Result<TimeSeries> {
        if values.len() != self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        Ok(TimeSeries {
            values,
            ..self.clone()
        })
    }

    /// Copy without regressors, for families that ignore inputs.
    pub fn without_regressors(&self) -> TimeSeries {
        TimeSeries {
            regressors: Vec::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn revenues() -> TimeSeries {
        TimeSeries::from_start(
            GroupKey::empty(),
            Interval::Year,
            ymd(1990, 1, 1),
            vec![4.0, 5.0, 7.0, 6.0, 8.0, 9.0, 5.0, 2.0, 3.5, 5.5, 6.5],
        )
        .unwrap()
    }

    #[test]
    fn from_start_builds_consecutive_intervals() {
        let ts = revenues();
        assert_eq!(ts.len(), 11);
        assert_eq!(ts.timestamps()[0], ymd(1990, 1, 1));
        assert_eq!(ts.last_timestamp(), Some(ymd(2000, 1, 1)));
        assert_eq!(ts.season_length(), 1);
    }

    #[test]
    fn rejects_non_increasing_or_gapped_timestamps() {
        let err = TimeSeries::new(
            GroupKey::empty(),
            Interval::Year,
            vec![ymd(1991, 1, 1), ymd(1990, 1, 1)],
            vec![1.0, 2.0],
        )
        .unwrap_err();
        assert!(matches!(err, ForecastError::TimestampError(_)));

        let err = TimeSeries::new(
            GroupKey::empty(),
            Interval::Year,
            vec![ymd(1990, 1, 1), ymd(1992, 1, 1)],
            vec![1.0, 2.0],
        )
        .unwrap_err();
        assert!(matches!(err, ForecastError::TimestampError(_)));

        let err = TimeSeries::new(
            GroupKey::empty(),
            Interval::Month,
            vec![ymd(1990, 1, 15)],
            vec![1.0],
        )
        .unwrap_err();
        assert!(matches!(err, ForecastError::TimestampError(_)));
    }

    #[test]
    fn future_timestamps_continue_the_interval() {
        let ts = revenues();
        let future = ts.future_timestamps(12).unwrap();
        assert_eq!(future.len(), 12);
        assert_eq!(future[0], ymd(2001, 1, 1));
        assert_eq!(future[11], ymd(2012, 1, 1));
    }

    #[test]
    fn truncate_keeps_regressor_tail_as_future() {
        let x: Vec<f64> = (0..14).map(|i| i as f64).collect();
        let ts = revenues()
            .with_regressor(Regressor::new("price", RegressorKind::Input, x))
            .unwrap();

        let head = ts.truncate(8).unwrap();
        assert_eq!(head.len(), 8);
        assert_eq!(head.regressor_history()[0].len(), 8);
        assert_eq!(head.regressor_future(3).unwrap()[0], &[8.0, 9.0, 10.0]);
        assert_eq!(ts.regressor_future(3).unwrap()[0], &[11.0, 12.0, 13.0]);
        assert!(ts.regressor_future(4).is_err());
    }

    #[test]
    fn short_regressor_is_rejected() {
        let err = revenues()
            .with_regressor(Regressor::new("x", RegressorKind::Event, vec![0.0; 5]))
            .unwrap_err();
        assert!(matches!(err, ForecastError::DimensionMismatch { .. }));
    }

    #[test]
    fn group_key_displays_and_serializes_in_by_order() {
        let key = GroupKey::new(vec![
            ("region".to_string(), "east".to_string()),
            ("product".to_string(), "a".to_string()),
        ]);
        assert_eq!(key.to_string(), "region=east, product=a");
        assert_eq!(key.get("product"), Some("a"));
        assert_eq!(
            serde_json::to_string(&key).unwrap(),
            r#"{"region":"east","product":"a"}"#
        );
        assert_eq!(GroupKey::empty().to_string(), "_ALL_");
    }
}
