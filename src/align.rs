//! Temporal alignment of time series.
//!
//! Alignment finds the timestamps at which every input series carries a value. Matching is
//! by exact timestamp equality only: an hourly forecast aligned with a reference that is
//! only published at 00:00 yields one aligned timestamp per day, not 24.

use crate::types::time_series::TimeSeries;
use crate::types::window::TimeWindow;
use chrono::{DateTime, Utc};
use log::{debug, warn};

/// The chronologically ordered timestamps at which two or more series are all defined.
///
/// The set can only be obtained from [`align`], [`align_all`] or by narrowing an existing
/// set, so every member is guaranteed to have a value in each series it was derived from.
/// When an input series changes the set must be recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlignedTimestampSet {
    timestamps: Vec<DateTime<Utc>>,
}

impl AlignedTimestampSet {
    /// `timestamps` must already be sorted and free of duplicates.
    pub(crate) fn from_sorted(timestamps: Vec<DateTime<Utc>>) -> Self {
        debug_assert!(timestamps.windows(2).all(|pair| pair[0] < pair[1]));
        Self { timestamps }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.timestamps.binary_search(timestamp).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DateTime<Utc>> + '_ {
        self.timestamps.iter()
    }

    pub fn first(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// A new set containing only the timestamps inside `window`.
    pub fn within(&self, window: &TimeWindow) -> AlignedTimestampSet {
        Self::from_sorted(
            self.timestamps
                .iter()
                .filter(|t| window.contains(t))
                .copied()
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }
}

impl<'a> IntoIterator for &'a AlignedTimestampSet {
    type Item = &'a DateTime<Utc>;
    type IntoIter = std::slice::Iter<'a, DateTime<Utc>>;

    fn into_iter(self) -> Self::IntoIter {
        self.timestamps.iter()
    }
}

/// Returns the timestamps at which both `a` and `b` have a non-missing value.
///
/// If either series has no defined values the result is empty; this is not an error.
/// `align(a, b) == align(b, a)`.
///
/// # Examples
///
/// ```
/// use forecast_bias::{align, TimeSeries};
/// use chrono::{TimeZone, Utc};
///
/// let t1 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
/// let t2 = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
/// let t3 = Utc.with_ymd_and_hms(2023, 1, 3, 0, 0, 0).unwrap();
///
/// let forecast = TimeSeries::from_points([(t1, Some(10.0)), (t2, Some(12.0)), (t3, None)]);
/// let reference = TimeSeries::from_points([(t1, Some(9.0)), (t2, Some(11.0)), (t3, Some(8.0))]);
///
/// let aligned = align(&forecast, &reference);
/// assert_eq!(aligned.as_slice(), &[t1, t2]);
/// ```
pub fn align(a: &TimeSeries, b: &TimeSeries) -> AlignedTimestampSet {
    align_all(&[a, b])
}

/// Generalisation of [`align`] to any number of series. An empty slice aligns to nothing.
pub fn align_all(series: &[&TimeSeries]) -> AlignedTimestampSet {
    let Some((first, rest)) = series.split_first() else {
        return AlignedTimestampSet::default();
    };

    let timestamps: Vec<DateTime<Utc>> = first
        .defined()
        .map(|(timestamp, _)| timestamp)
        .filter(|timestamp| rest.iter().all(|other| other.get(timestamp).is_some()))
        .collect();

    if timestamps.is_empty() {
        warn!(
            "Aligning {} series produced no common timestamps (series lengths: {:?})",
            series.len(),
            series.iter().map(|s| s.len()).collect::<Vec<_>>()
        );
    } else {
        debug!(
            "Aligned {} series on {} timestamps",
            series.len(),
            timestamps.len()
        );
    }

    AlignedTimestampSet::from_sorted(timestamps)
}
