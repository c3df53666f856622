//! Polars interop for time series.
//!
//! A [`TimeSeries`] maps onto a two-column frame: `datetime` (timezone-naive UTC, microseconds)
//! and `value` (nullable `f64`). Sub-microsecond precision is truncated, so timestamps that
//! differ by less than a microsecond collapse into one on the way back and the last value wins. [`SeriesLazyFrame`] wraps such a frame for lazy filtering,
//! and [`align_frames`] performs temporal alignment as a lazy inner join.

use crate::align::AlignedTimestampSet;
use crate::bias::error::BiasError;
use crate::types::time_series::TimeSeries;
use crate::types::window::AnyDateTime;
use chrono::DateTime;
use polars::prelude::*;

pub const DATETIME_COLUMN: &str = "datetime";
pub const VALUE_COLUMN: &str = "value";
pub const FORECAST_COLUMN: &str = "forecast";
pub const REFERENCE_COLUMN: &str = "reference";

fn datetime_us() -> DataType {
    DataType::Datetime(TimeUnit::Microseconds, None)
}

fn us_to_datetime(us: i64) -> Option<DateTime<chrono::Utc>> {
    DateTime::from_timestamp_micros(us)
}

/// Non-null and not NaN.
fn value_defined() -> Expr {
    col(VALUE_COLUMN)
        .is_not_null()
        .and(col(VALUE_COLUMN).is_not_nan())
}

impl TimeSeries {
    /// Materialises the series as a `DataFrame` with `datetime` and `value` columns.
    pub fn to_frame(&self) -> Result<DataFrame, BiasError> {
        let datetimes: Vec<i64> = self.timestamps().map(|t| t.timestamp_micros()).collect();
        let values: Vec<Option<f64>> = self.iter().map(|(_, v)| v).collect();
        let frame = df!(
            DATETIME_COLUMN => datetimes,
            VALUE_COLUMN => values
        )?
        .lazy()
        .with_column(col(DATETIME_COLUMN).cast(datetime_us()))
        .collect()?;
        Ok(frame)
    }

    /// Wraps the series in a [`SeriesLazyFrame`] for lazy filtering.
    pub fn lazy(&self) -> Result<SeriesLazyFrame, BiasError> {
        Ok(SeriesLazyFrame::new(self.to_frame()?.lazy()))
    }

    /// Reads a series back from a frame with `datetime` and `value` columns.
    ///
    /// Rows with a null datetime are skipped; null or NaN values become missing.
    pub fn from_frame(frame: &DataFrame) -> Result<TimeSeries, BiasError> {
        let frame = frame
            .clone()
            .lazy()
            .select([
                col(DATETIME_COLUMN).cast(datetime_us()),
                col(VALUE_COLUMN).cast(DataType::Float64),
            ])
            .collect()?;
        let datetimes = frame.column(DATETIME_COLUMN)?.datetime()?;
        let values = frame.column(VALUE_COLUMN)?.f64()?;

        Ok(TimeSeries::from_points(
            datetimes
                .into_iter()
                .zip(values.into_iter())
                .filter_map(|(us, value)| us.and_then(us_to_datetime).map(|t| (t, value))),
        ))
    }
}

/// A wrapper around a Polars `LazyFrame` holding a single time series.
///
/// The frame is expected to carry a `datetime` column (timezone-naive UTC) and a `value`
/// column. Filters are applied lazily; nothing is computed until [`Self::collect_series`]
/// or a `collect()` on the inner frame.
#[derive(Clone)]
pub struct SeriesLazyFrame {
    pub frame: LazyFrame,
}

impl SeriesLazyFrame {
    pub fn new(frame: LazyFrame) -> Self {
        Self { frame }
    }

    /// Filters the series based on a Polars predicate expression.
    ///
    /// # Example
    ///
    /// ```
    /// # use forecast_bias::TimeSeries;
    /// use chrono::{TimeZone, Utc};
    /// use polars::prelude::{col, lit};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let t0 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    /// let series = TimeSeries::from_raw([(t0, -2.0), (t0 + chrono::Duration::hours(1), 3.0)]);
    ///
    /// let freezing = series.lazy()?.filter(col("value").lt(lit(0.0f64))).collect_series()?;
    /// assert_eq!(freezing.len(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn filter(&self, predicate: Expr) -> SeriesLazyFrame {
        SeriesLazyFrame::new(self.frame.clone().filter(predicate))
    }

    /// Keeps the rows whose datetime lies in `[start, end]`.
    ///
    /// `start` and `end` accept anything implementing [`AnyDateTime`]; the start of
    /// `start`'s range and the end of `end`'s range are used.
    ///
    /// # Errors
    ///
    /// Returns [`BiasError::DateParsingError`] if either bound cannot be resolved.
    pub fn get_range(
        &self,
        start: impl AnyDateTime,
        end: impl AnyDateTime,
    ) -> Result<SeriesLazyFrame, BiasError> {
        let start_naive = start
            .get_datetime_range()
            .ok_or(BiasError::DateParsingError)?
            .start
            .naive_utc();
        let end_naive = end
            .get_datetime_range()
            .ok_or(BiasError::DateParsingError)?
            .end
            .naive_utc();

        Ok(self.filter(
            col(DATETIME_COLUMN)
                .gt_eq(lit(start_naive))
                .and(col(DATETIME_COLUMN).lt_eq(lit(end_naive))),
        ))
    }

    /// Keeps the rows inside a whole period, such as a [`crate::Month`] or [`crate::Year`].
    pub fn get_for_period(&self, period: impl AnyDateTime) -> Result<SeriesLazyFrame, BiasError> {
        let window = period
            .get_datetime_range()
            .ok_or(BiasError::DateParsingError)?;
        self.get_range(window.start, window.end)
    }

    /// Drops the rows whose value is null or NaN.
    pub fn defined(&self) -> SeriesLazyFrame {
        self.filter(value_defined())
    }

    pub fn collect_series(self) -> Result<TimeSeries, BiasError> {
        TimeSeries::from_frame(&self.frame.collect()?)
    }
}

/// Temporal alignment as a lazy inner join on `datetime`.
///
/// Both inputs are series frames (`datetime`, `value`). Rows with a null or NaN value are
/// dropped before joining, so the result holds the jointly-defined timestamps, with columns
/// `datetime`, `forecast` and `reference`, sorted by `datetime`. A datetime repeated within
/// one input appears once per matching pair of rows.
pub fn align_frames(forecast: LazyFrame, reference: LazyFrame) -> LazyFrame {
    let forecast = forecast
        .filter(value_defined())
        .select([
            col(DATETIME_COLUMN).cast(datetime_us()),
            col(VALUE_COLUMN).alias(FORECAST_COLUMN),
        ]);
    let reference = reference
        .filter(value_defined())
        .select([
            col(DATETIME_COLUMN).cast(datetime_us()),
            col(VALUE_COLUMN).alias(REFERENCE_COLUMN),
        ]);

    forecast
        .join(
            reference,
            [col(DATETIME_COLUMN)],
            [col(DATETIME_COLUMN)],
            JoinArgs::new(JoinType::Inner),
        )
        .sort([DATETIME_COLUMN], SortMultipleOptions::default())
}

/// Collects the `datetime` column of an aligned frame into an [`AlignedTimestampSet`].
///
/// Repeated datetimes are collapsed and null datetimes are skipped.
pub fn aligned_timestamps(aligned: LazyFrame) -> Result<AlignedTimestampSet, BiasError> {
    let frame = aligned
        .select([col(DATETIME_COLUMN).cast(datetime_us())])
        .sort([DATETIME_COLUMN], SortMultipleOptions::default())
        .collect()?;
    let mut timestamps: Vec<DateTime<chrono::Utc>> = frame
        .column(DATETIME_COLUMN)?
        .datetime()?
        .into_iter()
        .filter_map(|us| us.and_then(us_to_datetime))
        .collect();
    timestamps.dedup();
    Ok(AlignedTimestampSet::from_sorted(timestamps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align;
    use crate::types::calendar::Month;
    use chrono::{Duration, TimeZone, Utc};

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 31, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn column_names(frame: &DataFrame) -> Vec<&str> {
        frame
            .get_column_names()
            .into_iter()
            .map(|name| name.as_str())
            .collect()
    }

    #[test]
    fn test_frame_schema() -> Result<(), Box<dyn std::error::Error>> {
        let series = TimeSeries::from_points([(hour(0), Some(1.0)), (hour(1), None)]);
        let frame = series.to_frame()?;
        assert_eq!(frame.shape(), (2, 2));
        assert_eq!(column_names(&frame), [DATETIME_COLUMN, VALUE_COLUMN]);
        assert!(matches!(
            frame.column(DATETIME_COLUMN)?.dtype(),
            DataType::Datetime(TimeUnit::Microseconds, None)
        ));
        assert_eq!(frame.column(VALUE_COLUMN)?.null_count(), 1);
        Ok(())
    }

    #[test]
    fn test_frame_preserves_series() -> Result<(), Box<dyn std::error::Error>> {
        let series = TimeSeries::from_points([
            (hour(0), Some(1.5)),
            (hour(1), None),
            (hour(2), Some(-3.0)),
        ]);
        let back = TimeSeries::from_frame(&series.to_frame()?)?;
        assert_eq!(back, series);
        Ok(())
    }

    #[test]
    fn test_get_for_period() -> Result<(), Box<dyn std::error::Error>> {
        // Hours 0..48 starting 2023-01-31 span the last day of January and 1 February.
        let series = TimeSeries::from_raw((0..48).map(|h| (hour(h), h as f64)));
        let january = series.lazy()?.get_for_period(Month(2023, 1))?.collect_series()?;
        assert_eq!(january.len(), 24);
        assert_eq!(january.timestamps().last(), Some(hour(23)));
        Ok(())
    }

    #[test]
    fn test_get_range_and_defined() -> Result<(), Box<dyn std::error::Error>> {
        let series = TimeSeries::from_points((0..10).map(|h| {
            let value = (h % 2 == 0).then_some(h as f64);
            (hour(h), value)
        }));
        let window = series.lazy()?.get_range(hour(2), hour(7))?;
        assert_eq!(window.clone().collect_series()?.len(), 6);
        assert_eq!(window.defined().collect_series()?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_align_frames_matches_align() -> Result<(), Box<dyn std::error::Error>> {
        let hourly = TimeSeries::from_raw((0..72).map(|h| {
            let value = if h == 24 { f64::NAN } else { h as f64 };
            (hour(h), value)
        }));
        let daily = TimeSeries::from_raw((0..3).map(|d| (hour(d * 24), 0.5)));

        let joined = align_frames(hourly.to_frame()?.lazy(), daily.to_frame()?.lazy());
        let frame = joined.clone().collect()?;
        assert_eq!(frame.height(), 2);
        assert_eq!(
            column_names(&frame),
            [DATETIME_COLUMN, FORECAST_COLUMN, REFERENCE_COLUMN]
        );

        let from_frames = aligned_timestamps(joined)?;
        assert_eq!(from_frames, align(&hourly, &daily));
        assert_eq!(from_frames.as_slice(), &[hour(0), hour(48)]);
        Ok(())
    }

    fn series_frame(hours: &[i64], values: &[f64]) -> Result<LazyFrame, PolarsError> {
        let datetimes: Vec<i64> = hours.iter().map(|h| hour(*h).timestamp_micros()).collect();
        Ok(df!(DATETIME_COLUMN => datetimes, VALUE_COLUMN => values)?
            .lazy()
            .with_column(col(DATETIME_COLUMN).cast(datetime_us())))
    }

    #[test]
    fn test_align_frames_drops_nan_values() -> Result<(), Box<dyn std::error::Error>> {
        let forecast = series_frame(&[0, 1], &[f64::NAN, 2.0])?;
        let reference = series_frame(&[0, 1], &[1.0, 1.0])?;

        let from_frames = aligned_timestamps(align_frames(forecast.clone(), reference.clone()))?;
        let from_series = align(
            &TimeSeries::from_frame(&forecast.collect()?)?,
            &TimeSeries::from_frame(&reference.collect()?)?,
        );
        assert_eq!(from_frames, from_series);
        assert_eq!(from_frames.as_slice(), &[hour(1)]);
        Ok(())
    }

    #[test]
    fn test_defined_drops_nan_values() -> Result<(), Box<dyn std::error::Error>> {
        let frame = SeriesLazyFrame::new(series_frame(&[0, 1, 2], &[1.0, f64::NAN, 3.0])?);
        assert_eq!(frame.defined().collect_series()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_aligned_timestamps_collapses_repeats() -> Result<(), Box<dyn std::error::Error>> {
        let forecast = series_frame(&[0, 0, 1], &[1.0, 2.0, 3.0])?;
        let reference = series_frame(&[0, 2], &[0.5, 0.5])?;

        let joined = align_frames(forecast, reference);
        assert_eq!(joined.clone().collect()?.height(), 2);
        let aligned = aligned_timestamps(joined)?;
        assert_eq!(aligned.len(), 1);
        assert_eq!(aligned.as_slice(), &[hour(0)]);
        Ok(())
    }

    #[test]
    fn test_frame_keeps_sub_millisecond_timestamps() -> Result<(), Box<dyn std::error::Error>> {
        let t0 = hour(0);
        let t1 = t0 + Duration::microseconds(500);
        let series = TimeSeries::from_raw([(t0, 1.0), (t1, 2.0)]);
        let back = TimeSeries::from_frame(&series.to_frame()?)?;
        assert_eq!(back.len(), 2);
        assert_eq!(back, series);
        Ok(())
    }

    #[test]
    fn test_align_frames_all_missing() -> Result<(), Box<dyn std::error::Error>> {
        let missing = TimeSeries::from_points((0..3).map(|h| (hour(h), None)));
        let defined = TimeSeries::from_raw((0..3).map(|h| (hour(h), 1.0)));
        let joined = align_frames(missing.to_frame()?.lazy(), defined.to_frame()?.lazy());
        assert!(aligned_timestamps(joined)?.is_empty());
        Ok(())
    }
}
