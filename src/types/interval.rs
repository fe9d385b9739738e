use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::SqlBridgeError;

/// A calendar period of years, months and days.
///
/// Only the year-month part has a SQL representation (`INTERVAL YEAR TO MONTH`); a period with a
/// non-zero day count is rejected on encode rather than truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Period {
    pub years: i32,
    pub months: i32,
    pub days: i32,
}

impl Period {
    #[must_use]
    pub fn new(years: i32, months: i32, days: i32) -> Self {
        Self {
            years,
            months,
            days,
        }
    }

    /// Period of whole years and months, with months folded into years.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UnsupportedConversionError`] when the year count does not fit
    /// in an `i32`.
    pub fn of_months(total_months: i64) -> Result<Self, SqlBridgeError> {
        let out_of_range = |_| {
            SqlBridgeError::unsupported(format!("{total_months} months does not fit a period"))
        };
        Ok(Self {
            years: i32::try_from(total_months / 12).map_err(out_of_range)?,
            months: i32::try_from(total_months % 12).map_err(out_of_range)?,
            days: 0,
        })
    }

    #[must_use]
    pub fn total_months(&self) -> i64 {
        i64::from(self.years) * 12 + i64::from(self.months)
    }

    #[must_use]
    pub fn with_days(mut self, days: i32) -> Self {
        self.days = days;
        self
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}Y{}M{}D", self.years, self.months, self.days)
    }
}

/// Render `INTERVAL YEAR TO MONTH` literal text, e.g. `+02-06` or `-01-03`.
#[must_use]
pub fn format_year_to_month(total_months: i64) -> String {
    let sign = if total_months < 0 { '-' } else { '+' };
    let magnitude = total_months.unsigned_abs();
    format!("{sign}{:02}-{:02}", magnitude / 12, magnitude % 12)
}

/// Parse `INTERVAL YEAR TO MONTH` literal text back into a month count.
///
/// # Errors
/// Returns [`SqlBridgeError::UnsupportedConversionError`] for text that is not `[+-]Y-M`.
pub fn parse_year_to_month(text: &str) -> Result<i64, SqlBridgeError> {
    let bad = || SqlBridgeError::unsupported(format!("`{text}` is not a year-month interval"));
    let (negative, body) = split_sign(text.trim());
    let (years, months) = body.split_once('-').ok_or_else(bad)?;
    let years: i64 = years.parse().map_err(|_| bad())?;
    let months: i64 = months.parse().map_err(|_| bad())?;
    if !(0..12).contains(&months) {
        return Err(bad());
    }
    let total = years * 12 + months;
    Ok(if negative { -total } else { total })
}

/// Render `INTERVAL DAY TO SECOND` literal text, e.g. `+1 00:00:09.000000000`.
#[must_use]
pub fn format_day_to_second(duration: TimeDelta) -> String {
    let sign = if duration < TimeDelta::zero() { '-' } else { '+' };
    let magnitude = duration.abs();
    let total_seconds = magnitude.num_seconds();
    let nanos = magnitude.subsec_nanos();
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    format!("{sign}{days} {hours:02}:{minutes:02}:{seconds:02}.{nanos:09}")
}

/// Parse `INTERVAL DAY TO SECOND` literal text.
///
/// # Errors
/// Returns [`SqlBridgeError::UnsupportedConversionError`] for text that is not
/// `[+-]D HH:MM:SS[.fffffffff]`.
pub fn parse_day_to_second(text: &str) -> Result<TimeDelta, SqlBridgeError> {
    let bad = || SqlBridgeError::unsupported(format!("`{text}` is not a day-second interval"));
    let (negative, body) = split_sign(text.trim());
    let (days, clock) = body.split_once(' ').ok_or_else(bad)?;
    let mut parts = clock.splitn(3, ':');
    let hours: i64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let minutes: i64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let seconds_part = parts.next().ok_or_else(bad)?;
    let (seconds, fraction) = seconds_part.split_once('.').unwrap_or((seconds_part, "0"));
    let seconds: i64 = seconds.parse().map_err(|_| bad())?;
    if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let nanos: i64 = format!("{fraction:0<9}").parse().map_err(|_| bad())?;
    let days: i64 = days.parse().map_err(|_| bad())?;

    let total = TimeDelta::try_days(days)
        .and_then(|d| d.checked_add(&TimeDelta::try_hours(hours)?))
        .and_then(|d| d.checked_add(&TimeDelta::try_minutes(minutes)?))
        .and_then(|d| d.checked_add(&TimeDelta::try_seconds(seconds)?))
        .and_then(|d| d.checked_add(&TimeDelta::nanoseconds(nanos)))
        .ok_or_else(bad)?;
    Ok(if negative { -total } else { total })
}

fn split_sign(text: &str) -> (bool, &str) {
    if let Some(rest) = text.strip_prefix('-') {
        (true, rest)
    } else {
        (false, text.strip_prefix('+').unwrap_or(text))
    }
}
