//! The `TimeSeries` type: one variable at one location, indexed by UTC timestamp.

use crate::align::AlignedTimestampSet;
use crate::bias::stats::FieldStats;
use crate::types::window::TimeWindow;
use crate::utils::{defined, mean};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered sequence of `(timestamp, value)` pairs where the value may be missing.
///
/// Timestamps are unique within one series; inserting a timestamp that is already present
/// replaces its value. Iteration is always chronological.
///
/// Missing values are stored as `None`. Raw floating point input goes through
/// [`TimeSeries::from_raw`], which maps NaN to `None`.
///
/// # Examples
///
/// ```
/// use forecast_bias::TimeSeries;
/// use chrono::{TimeZone, Utc};
///
/// let t1 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
/// let t2 = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
///
/// let series = TimeSeries::from_points([(t2, None), (t1, Some(10.0))]).with_name("t2m");
/// assert_eq!(series.len(), 2);
/// assert_eq!(series.get(&t1), Some(10.0));
/// assert_eq!(series.get(&t2), None);
/// assert_eq!(series.timestamps().next(), Some(t1));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "TimeSeriesRepr", into = "TimeSeriesRepr")]
pub struct TimeSeries {
    name: Option<String>,
    points: BTreeMap<DateTime<Utc>, Option<f64>>,
}

#[derive(Serialize, Deserialize)]
struct TimeSeriesRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    points: Vec<(DateTime<Utc>, Option<f64>)>,
}

impl From<TimeSeriesRepr> for TimeSeries {
    fn from(repr: TimeSeriesRepr) -> Self {
        let mut series = TimeSeries::from_points(repr.points);
        series.name = repr.name;
        series
    }
}

impl From<TimeSeries> for TimeSeriesRepr {
    fn from(series: TimeSeries) -> Self {
        TimeSeriesRepr {
            points: series.iter().collect(),
            name: series.name,
        }
    }
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: impl IntoIterator<Item = (DateTime<Utc>, Option<f64>)>) -> Self {
        let mut series = Self::new();
        for (timestamp, value) in points {
            series.insert(timestamp, value);
        }
        series
    }

    /// Builds a series from raw samples, treating NaN and infinities as missing.
    pub fn from_raw(points: impl IntoIterator<Item = (DateTime<Utc>, f64)>) -> Self {
        Self::from_points(points.into_iter().map(|(t, v)| (t, defined(v))))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Inserts or replaces the value at `timestamp`. A NaN value is stored as missing.
    pub fn insert(&mut self, timestamp: DateTime<Utc>, value: Option<f64>) {
        self.points.insert(timestamp, value.and_then(defined));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The value at `timestamp`; `None` both when the timestamp is absent and when its
    /// value is missing.
    pub fn get(&self, timestamp: &DateTime<Utc>) -> Option<f64> {
        self.points.get(timestamp).copied().flatten()
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.points.contains_key(timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, Option<f64>)> + '_ {
        self.points.iter().map(|(t, v)| (*t, *v))
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.points.keys().copied()
    }

    /// Only the points that carry a value, in chronological order.
    pub fn defined(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.points.iter().filter_map(|(t, v)| v.map(|v| (*t, v)))
    }

    pub fn has_defined_values(&self) -> bool {
        self.defined().next().is_some()
    }

    /// The sub-series at the given aligned timestamps.
    pub fn restrict(&self, aligned: &AlignedTimestampSet) -> TimeSeries {
        TimeSeries {
            name: self.name.clone(),
            points: aligned
                .iter()
                .filter_map(|t| self.points.get(t).map(|v| (*t, *v)))
                .collect(),
        }
    }

    /// The sub-series whose timestamps fall inside `window`.
    pub fn within(&self, window: &TimeWindow) -> TimeSeries {
        TimeSeries {
            name: self.name.clone(),
            points: self
                .points
                .iter()
                .filter(|(t, _)| window.contains(t))
                .map(|(t, v)| (*t, *v))
                .collect(),
        }
    }

    /// Applies `f` to every defined value; missing values stay missing.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> TimeSeries {
        TimeSeries {
            name: self.name.clone(),
            points: self
                .points
                .iter()
                .map(|(t, v)| (*t, v.map(&f).and_then(defined)))
                .collect(),
        }
    }

    /// Temporal mean over the aligned timestamps, or `None` if none of them carries a value.
    pub fn mean_over(&self, aligned: &AlignedTimestampSet) -> Option<f64> {
        mean(aligned.iter().filter_map(|t| self.get(t)))
    }

    pub fn stats(&self) -> Option<FieldStats> {
        FieldStats::from_values(self.points.values().copied())
    }
}
