//! Time window parsing and calendar helpers.

use chrono::{Datelike, Duration, NaiveDate, Utc};

use crate::Error;

const UNSUPPORTED_WINDOW: &str = "Unsupported time window format";

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn split_window(window: &str) -> Result<(i64, char), Error> {
    let trimmed = window.trim();
    let unit = trimmed
        .chars()
        .last()
        .ok_or_else(|| Error::bad_request(UNSUPPORTED_WINDOW))?;
    if unit != 'd' && unit != 'm' {
        return Err(Error::bad_request(UNSUPPORTED_WINDOW));
    }
    let amount = trimmed[..trimmed.len() - 1]
        .parse::<i64>()
        .map_err(|_| Error::bad_request(UNSUPPORTED_WINDOW))?;
    Ok((amount, unit))
}

/// Trailing window ending today. `Nm` counts 30 days per month.
pub fn parse_time_window(window: &str) -> Result<(NaiveDate, NaiveDate), Error> {
    parse_time_window_at(window, today())
}

pub fn parse_time_window_at(
    window: &str,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), Error> {
    let (amount, unit) = split_window(window)?;
    let days = if unit == 'd' {
        Some(amount)
    } else {
        amount.checked_mul(30)
    };
    let start = days
        .and_then(Duration::try_days)
        .and_then(|span| today.checked_sub_signed(span))
        .ok_or_else(|| Error::bad_request(UNSUPPORTED_WINDOW))?;
    Ok((start, today))
}

/// Forward-looking window starting on the first of the current month.
pub fn parse_forward_time_window(window: &str) -> Result<(NaiveDate, NaiveDate), Error> {
    parse_forward_time_window_at(window, today())
}

pub fn parse_forward_time_window_at(
    window: &str,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), Error> {
    let (amount, unit) = split_window(window)?;
    let start = month_start(today);
    let end = if unit == 'd' {
        Duration::try_days(amount).and_then(|span| today.checked_add_signed(span))
    } else if amount <= 0 {
        None
    } else {
        i32::try_from(amount)
            .ok()
            .and_then(|months| checked_add_months(start, months))
            .and_then(|first| first.pred_opt())
    };
    let end = end.ok_or_else(|| Error::bad_request(UNSUPPORTED_WINDOW))?;
    Ok((start, end))
}

pub fn month_start(value: NaiveDate) -> NaiveDate {
    value.with_day(1).unwrap_or(value)
}

/// First day of the month `months` away from `value`'s month.
pub fn add_months(value: NaiveDate, months: i32) -> NaiveDate {
    checked_add_months(value, months).unwrap_or(value)
}

/// Like [`add_months`], but `None` when the target month is not representable.
pub fn checked_add_months(value: NaiveDate, months: i32) -> Option<NaiveDate> {
    let index = (value.year() * 12 + value.month0() as i32).checked_add(months)?;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}

pub fn month_end(value: NaiveDate) -> NaiveDate {
    add_months(value, 1) - Duration::days(1)
}

pub fn year_bounds(year: i32) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN);
    let end = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX);
    (start, end)
}

pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
