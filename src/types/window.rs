//! Inclusive UTC time windows and the `AnyDateTime` conversions used to build them.

use crate::bias::error::BiasError;
use crate::types::calendar::{days_in_month, Month, Year};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive `[start, end]` interval in UTC.
///
/// Used for baseline and target periods, and as the continuous temporal extent of a query.
///
/// # Examples
///
/// ```
/// use forecast_bias::{Month, TimeWindow};
/// use chrono::{TimeZone, Utc};
///
/// let baseline = TimeWindow::period(Month(2023, 1)).unwrap();
/// assert!(baseline.contains(&Utc.with_ymd_and_hms(2023, 1, 31, 23, 0, 0).unwrap()));
/// assert!(!baseline.contains(&Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Builds a window from the start of `start` to the end of `end`.
    ///
    /// Both arguments accept anything implementing [`AnyDateTime`], so
    /// `TimeWindow::new(Month(2023, 1), Month(2023, 3))` spans January through March.
    ///
    /// # Errors
    ///
    /// Returns [`BiasError::DateParsingError`] if either bound cannot be resolved and
    /// [`BiasError::InvalidWindow`] if the resolved start lies after the resolved end.
    pub fn new(start: impl AnyDateTime, end: impl AnyDateTime) -> Result<Self, BiasError> {
        let start = start
            .get_datetime_range()
            .ok_or(BiasError::DateParsingError)?
            .start;
        let end = end
            .get_datetime_range()
            .ok_or(BiasError::DateParsingError)?
            .end;
        if start > end {
            return Err(BiasError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// The window covering a whole period, such as a [`Year`], [`Month`] or `NaiveDate`.
    pub fn period(period: impl AnyDateTime) -> Result<Self, BiasError> {
        period
            .get_datetime_range()
            .ok_or(BiasError::DateParsingError)
    }

    pub fn contains(&self, datetime: &DateTime<Utc>) -> bool {
        (self.start..=self.end).contains(datetime)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Anything that resolves to a UTC datetime range.
///
/// Instants resolve to a zero-length range; dates, months and years resolve to their
/// full extent (ending at 23:59:59.999999 of the last day).
pub trait AnyDateTime {
    fn get_datetime_range(self) -> Option<TimeWindow>;
}

impl AnyDateTime for TimeWindow {
    fn get_datetime_range(self) -> Option<TimeWindow> {
        Some(self)
    }
}

impl AnyDateTime for NaiveDateTime {
    fn get_datetime_range(self) -> Option<TimeWindow> {
        Utc.from_utc_datetime(&self).get_datetime_range()
    }
}

impl AnyDateTime for DateTime<Utc> {
    fn get_datetime_range(self) -> Option<TimeWindow> {
        Some(TimeWindow {
            start: self,
            end: self,
        })
    }
}

impl AnyDateTime for DateTime<Local> {
    fn get_datetime_range(self) -> Option<TimeWindow> {
        self.with_timezone(&Utc).get_datetime_range()
    }
}

impl AnyDateTime for DateTime<FixedOffset> {
    fn get_datetime_range(self) -> Option<TimeWindow> {
        self.with_timezone(&Utc).get_datetime_range()
    }
}

impl AnyDateTime for NaiveDate {
    fn get_datetime_range(self) -> Option<TimeWindow> {
        let start = self.and_hms_opt(0, 0, 0)?.and_utc();
        let end = self.and_hms_micro_opt(23, 59, 59, 999_999)?.and_utc();
        Some(TimeWindow { start, end })
    }
}

impl AnyDateTime for &str {
    fn get_datetime_range(self) -> Option<TimeWindow> {
        if let Ok(dt) = self.parse::<DateTime<Utc>>() {
            return dt.get_datetime_range();
        }
        if let Ok(dt) = self.parse::<DateTime<FixedOffset>>() {
            return dt.get_datetime_range();
        }
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(self, "%Y-%m-%d %H:%M:%S") {
            return naive_dt.get_datetime_range();
        }
        if let Ok(naive_date) = NaiveDate::parse_from_str(self, "%Y-%m-%d") {
            return naive_date.get_datetime_range();
        }
        None
    }
}

impl AnyDateTime for String {
    fn get_datetime_range(self) -> Option<TimeWindow> {
        self.as_str().get_datetime_range()
    }
}

impl AnyDateTime for Year {
    fn get_datetime_range(self) -> Option<TimeWindow> {
        Some(TimeWindow {
            start: NaiveDate::from_ymd_opt(self.0, 1, 1)?
                .get_datetime_range()?
                .start,
            end: NaiveDate::from_ymd_opt(self.0, 12, 31)?
                .get_datetime_range()?
                .end,
        })
    }
}

impl AnyDateTime for Month {
    fn get_datetime_range(self) -> Option<TimeWindow> {
        let (year, month) = (self.year(), self.month());
        Some(TimeWindow {
            start: NaiveDate::from_ymd_opt(year, month, 1)?
                .get_datetime_range()?
                .start,
            end: NaiveDate::from_ymd_opt(year, month, days_in_month(year, month)?)?
                .get_datetime_range()?
                .end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_month_window_bounds() {
        let window = TimeWindow::period(Month(2024, 2)).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(window.end.hour(), 23);
        assert_eq!(window.end.nanosecond(), 999_999_000);
    }

    #[test]
    fn test_new_spans_start_of_first_to_end_of_last() {
        let window = TimeWindow::new(Month(2023, 1), Month(2023, 3)).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end.date_naive(), NaiveDate::from_ymd_opt(2023, 3, 31).unwrap());
    }

    #[test]
    fn test_new_rejects_reversed_bounds() {
        let result = TimeWindow::new(Year(2024), Year(2023));
        assert!(matches!(result, Err(BiasError::InvalidWindow { .. })));
    }

    #[test]
    fn test_string_forms() {
        let rfc = TimeWindow::period("2023-07-15T12:00:00Z").unwrap();
        assert_eq!(rfc.start, rfc.end);
        assert_eq!(rfc.start, Utc.with_ymd_and_hms(2023, 7, 15, 12, 0, 0).unwrap());

        let offset = TimeWindow::period("2023-07-15T14:00:00+02:00").unwrap();
        assert_eq!(offset.start, rfc.start);

        let naive = TimeWindow::period("2023-07-15 12:00:00").unwrap();
        assert_eq!(naive.start, rfc.start);

        let date = TimeWindow::period("2023-07-15").unwrap();
        assert_eq!(date.start, Utc.with_ymd_and_hms(2023, 7, 15, 0, 0, 0).unwrap());

        assert!(matches!(
            TimeWindow::period("not a date"),
            Err(BiasError::DateParsingError)
        ));
    }

    #[test]
    fn test_invalid_month_does_not_resolve() {
        assert!(Month(2023, 13).get_datetime_range().is_none());
    }
}
