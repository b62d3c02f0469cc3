//! Date and time normalization.
//!
//! Every date entering the planner goes through [`normalize_date`] so that slot keys built
//! from availability records, assignments and overrides compare equal. A timestamp keeps the
//! calendar date it was written with; it is never converted through UTC first.

use crate::errors::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer};

/// Canonical textual form of a date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses `YYYY-MM-DD`, an RFC 3339 timestamp or a naive `YYYY-MM-DDTHH:MM:SS` timestamp
/// into the calendar date it denotes.
pub fn normalize_date(raw: &str) -> Result<NaiveDate> {
    let value = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
        return Ok(date);
    }

    // Local date as written, offset ignored: "2025-06-02T00:00:00+02:00" is June 2nd.
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.date_naive());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts.date());
        }
    }

    Err(Error::InvalidDate {
        value: raw.to_string(),
    })
}

/// Serde adapter for wire records whose dates may be plain dates or timestamps.
pub fn deserialize_date<'de, D>(deserializer: D) -> std::result::Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    normalize_date(&raw).map_err(serde::de::Error::custom)
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    let value = raw.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| Error::InvalidTime {
            value: raw.to_string(),
        })
}

/// First and last day of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let invalid = || Error::InvalidDate {
        value: format!("{year:04}-{month:02}"),
    };

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(invalid)?;
    let last = next_first.pred_opt().ok_or_else(invalid)?;

    Ok((first, last))
}
