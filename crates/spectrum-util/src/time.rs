//! Time utilities for spectrumd
//!
//! Club schedules are expressed in local wall-clock time: a training has a
//! calendar date plus start and end times of day. This module holds the
//! clock used by the service and the parsing helpers for the formats people
//! type into the chat (`DD.MM.YYYY`, `HH:MM`, `HH:MM-HH:MM`).
//!
//! # Mock Time for Development
//!
//! In debug builds, the `SPECTRUM_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is
//! useful for walking through a booking flow on a fixed day.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! SPECTRUM_MOCK_TIME="2025-12-25 14:30:00" spectrumd
//! ```

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "SPECTRUM_MOCK_TIME";

/// Date format used in chat input and replies
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Time-of-day format used in chat input and replies
pub const CLOCK_FORMAT: &str = "%H:%M";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                let Ok(naive_dt) =
                    NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S")
                else {
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time format"
                    );
                    return None;
                };
                match Local.from_local_datetime(&naive_dt).single() {
                    Some(mock_dt) => {
                        let offset = mock_dt.signed_duration_since(chrono::Local::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    None => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Parse a `DD.MM.YYYY` date.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT).ok()
}

/// Parse an `HH:MM` time of day.
pub fn parse_clock(input: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), CLOCK_FORMAT).ok()
}

/// Parse an `HH:MM-HH:MM` range. Returns `None` unless both ends parse.
pub fn parse_clock_range(input: &str) -> Option<(NaiveTime, NaiveTime)> {
    let (start, end) = input.split_once('-')?;
    Some((parse_clock(start)?, parse_clock(end)?))
}

/// Parse a `DD.MM.YYYY-DD.MM.YYYY` period. The end must not precede the start.
pub fn parse_date_range(input: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (from, to) = input.split_once('-')?;
    let (from, to) = (parse_date(from)?, parse_date(to)?);
    (from <= to).then_some((from, to))
}

/// Parse a time of day as stored on a week template.
///
/// Templates may carry `HH:MM`, `HH:MM:SS`, or a timestamp wrapper such as
/// `0000-01-01T15:30:00Z` where only the time part is meaningful.
pub fn parse_template_time(raw: &str) -> Option<NaiveTime> {
    let mut value = raw.trim();
    if let Some((_, time)) = value.split_once('T') {
        value = time;
    }
    let value = value.trim_end_matches('Z');

    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, CLOCK_FORMAT))
        .ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_clock(time: NaiveTime) -> String {
    time.format(CLOCK_FORMAT).to_string()
}

/// The Monday strictly after `date`. A Monday maps to the following Monday.
pub fn next_monday(date: NaiveDate) -> NaiveDate {
    let from_monday = date.weekday().num_days_from_monday() as u64;
    date + Days::new(7 - from_monday)
}

/// `date` itself when it is a Monday, otherwise the next Monday.
pub fn monday_on_or_after(date: NaiveDate) -> NaiveDate {
    match date.weekday().num_days_from_monday() {
        0 => date,
        _ => next_monday(date),
    }
}

/// The Monday of the week containing `date`.
pub fn monday_of_week(date: NaiveDate) -> NaiveDate {
    date - Days::new(date.weekday().num_days_from_monday() as u64)
}

/// Date of the given ISO day of week (1 = Monday .. 7 = Sunday) in the week
/// that starts on or after `week_start`.
pub fn date_for_day_of_week(week_start: NaiveDate, day_of_week: u8) -> Option<NaiveDate> {
    if !(1..=7).contains(&day_of_week) {
        return None;
    }
    Some(monday_on_or_after(week_start) + Days::new(u64::from(day_of_week - 1)))
}
