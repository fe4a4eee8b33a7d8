//! Calendar boundaries used for default fetch windows and dashboard ranges.
//!
//! All boundaries are computed in UTC.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{MonitorError, Result};

/// Midnight on January 1st of `today`'s year.
pub fn start_of_year(today: NaiveDate) -> Option<DateTime<Utc>> {
    let first = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;
    Some(Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN)))
}

/// Midnight on the first day of `today`'s month.
pub fn start_of_month(today: NaiveDate) -> Option<DateTime<Utc>> {
    let first = today.with_day(1)?;
    Some(Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN)))
}

/// Last representable microsecond of the last day of `today`'s month.
pub fn end_of_month(today: NaiveDate) -> Option<DateTime<Utc>> {
    let first_next = today.with_day(1)?.checked_add_months(Months::new(1))?;
    let last_day = first_next.pred_opt()?;
    let last_instant = last_day.and_hms_micro_opt(23, 59, 59, 999_999)?;
    Some(Utc.from_utc_datetime(&last_instant))
}

/// The same instant one calendar month earlier, clamped to the month's last day.
pub fn one_month_back(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(1)).unwrap_or(now)
}

/// Inclusive time range sent with a flow query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Fill omitted boundaries: start of the current year and end of the current month.
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        today: NaiveDate,
    ) -> Result<Self> {
        let start = match start {
            Some(start) => start,
            None => start_of_year(today).ok_or_else(|| {
                MonitorError::Config(format!("cannot compute start of year for {today}"))
            })?,
        };
        let end = match end {
            Some(end) => end,
            None => end_of_month(today).ok_or_else(|| {
                MonitorError::Config(format!("cannot compute end of month for {today}"))
            })?,
        };

        if start > end {
            return Err(MonitorError::Config(format!(
                "fetch window starts ({start}) after it ends ({end})"
            )));
        }

        Ok(Self { start, end })
    }

    /// Start as whole epoch seconds, the unit the remote query expects.
    pub fn start_epoch_secs(&self) -> i64 {
        self.start.timestamp()
    }

    /// End as whole epoch seconds; sub-second precision is truncated.
    pub fn end_epoch_secs(&self) -> i64 {
        self.end.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn start_of_year_is_january_first_midnight() {
        let start = start_of_year(date(2024, 7, 19)).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn end_of_month_handles_leap_february_and_december() {
        let feb = end_of_month(date(2024, 2, 10)).unwrap();
        assert_eq!(feb.to_rfc3339(), "2024-02-29T23:59:59.999999+00:00");

        let dec = end_of_month(date(2023, 12, 31)).unwrap();
        assert_eq!(dec.to_rfc3339(), "2023-12-31T23:59:59.999999+00:00");
        assert_eq!(dec.timestamp(), 1_704_067_199);
    }

    #[test]
    fn start_of_month_is_first_day_midnight() {
        let start = start_of_month(date(2024, 3, 17)).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn one_month_back_clamps_to_shorter_month() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let back = one_month_back(now);
        assert_eq!(back, Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap());
    }

    #[test]
    fn resolve_fills_only_missing_boundaries() {
        let explicit_start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let window = FetchWindow::resolve(Some(explicit_start), None, date(2024, 5, 20)).unwrap();

        assert_eq!(window.start, explicit_start);
        assert_eq!(window.end_epoch_secs(), end_of_month(date(2024, 5, 20)).unwrap().timestamp());
    }

    #[test]
    fn resolve_defaults_span_year_to_month_end() {
        let window = FetchWindow::resolve(None, None, date(2024, 5, 20)).unwrap();
        assert_eq!(window.start_epoch_secs(), 1_704_067_200);
        assert_eq!(window.end.to_rfc3339(), "2024-05-31T23:59:59.999999+00:00");
    }

    #[test]
    fn resolve_rejects_inverted_window() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let err = FetchWindow::resolve(Some(start), Some(end), date(2024, 6, 2)).unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }
}
