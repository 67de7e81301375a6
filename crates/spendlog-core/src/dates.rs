//! Date normalization shared by every backend.
//!
//! Storage always sees dates as canonical `YYYY-MM-DD` strings and timestamps as
//! `YYYY-MM-DD HH:MM:SS`, whichever form the caller handed in.

use time::{Date, Month, PrimitiveDateTime, Time};

use crate::storage::StorageError;

/// Anything a caller may pass where an expense date is expected: a `Date`, or an
/// ISO string.
pub trait IntoExpenseDate {
    fn into_expense_date(self) -> Result<Date, StorageError>;
}

impl IntoExpenseDate for Date {
    fn into_expense_date(self) -> Result<Date, StorageError> {
        Ok(self)
    }
}

impl IntoExpenseDate for &Date {
    fn into_expense_date(self) -> Result<Date, StorageError> {
        Ok(*self)
    }
}

impl IntoExpenseDate for &str {
    fn into_expense_date(self) -> Result<Date, StorageError> {
        parse_date(self)
    }
}

impl IntoExpenseDate for &String {
    fn into_expense_date(self) -> Result<Date, StorageError> {
        parse_date(self)
    }
}

impl IntoExpenseDate for String {
    fn into_expense_date(self) -> Result<Date, StorageError> {
        parse_date(&self)
    }
}

pub fn format_date(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}

pub fn format_timestamp(ts: PrimitiveDateTime) -> String {
    format!(
        "{} {:02}:{:02}:{:02}",
        format_date(ts.date()),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}

/// Parses an ISO date. A trailing time component (`2024-08-01T10:00:00`,
/// `2024-08-01 10:00:00`) is accepted and discarded.
pub fn parse_date(s: &str) -> Result<Date, StorageError> {
    let s = s.trim();
    let date_part = s.split(['T', ' ']).next().unwrap_or(s);
    let invalid = || StorageError::InvalidDate(s.to_string());

    let mut parts = date_part.splitn(3, '-');
    let year = parts
        .next()
        .filter(|p| p.len() == 4)
        .and_then(|p| p.parse::<i32>().ok())
        .ok_or_else(invalid)?;
    let month = parts
        .next()
        .filter(|p| (1..=2).contains(&p.len()))
        .and_then(|p| p.parse::<u8>().ok())
        .ok_or_else(invalid)?;
    let day = parts
        .next()
        .filter(|p| (1..=2).contains(&p.len()))
        .and_then(|p| p.parse::<u8>().ok())
        .ok_or_else(invalid)?;

    let month = Month::try_from(month).map_err(|_| invalid())?;
    Date::from_calendar_date(year, month, day).map_err(|_| invalid())
}

/// Parses `YYYY-MM-DD HH:MM:SS` as produced by SQLite `CURRENT_TIMESTAMP` and
/// MySQL `TIMESTAMP` columns. Fractional seconds are dropped; a bare date maps to
/// midnight.
pub fn parse_timestamp(s: &str) -> Result<PrimitiveDateTime, StorageError> {
    let s = s.trim();
    let invalid = || StorageError::InvalidDate(s.to_string());

    let date = parse_date(s)?;
    let time_part = match s.find(['T', ' ']) {
        Some(idx) => &s[idx + 1..],
        None => return Ok(PrimitiveDateTime::new(date, Time::MIDNIGHT)),
    };
    let time_part = time_part.trim_end_matches('Z');
    let time_part = time_part.split('.').next().unwrap_or(time_part);

    let fields = time_part
        .split(':')
        .map(|f| f.parse::<u8>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    let time = match fields.as_slice() {
        [h, m] => Time::from_hms(*h, *m, 0),
        [h, m, sec] => Time::from_hms(*h, *m, *sec),
        _ => return Err(invalid()),
    }
    .map_err(|_| invalid())?;

    Ok(PrimitiveDateTime::new(date, time))
}
