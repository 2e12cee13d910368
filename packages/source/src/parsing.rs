//! Cell-level parsing helpers for the registry extract.
//!
//! Every helper maps "nothing usable" to `None` instead of failing, so a
//! single odd cell never stops a multi-million row import.

use chrono::NaiveDate;

/// Parses a `DD/MM/YYYY` date. Returns `None` for empty input, the wrong
/// number of segments, non-numeric segments, a year that is not four
/// digits, or a day/month combination that does not exist.
#[must_use]
pub fn parse_uk_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut parts = s.split('/');
    let (Some(day), Some(month), Some(year), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    if year.len() != 4 {
        return None;
    }

    let day = day.trim().parse::<u32>().ok()?;
    let month = month.trim().parse::<u32>().ok()?;
    let year = year.parse::<i32>().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Formats a date back into the `DD/MM/YYYY` form used by the extract.
#[must_use]
pub fn format_uk_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Parses an optional integer cell. Empty or non-numeric input is `None`.
#[must_use]
pub fn parse_optional_int(s: &str) -> Option<i32> {
    s.trim().parse::<i32>().ok()
}

/// Trims a text cell, mapping an empty result to `None`.
#[must_use]
pub fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
