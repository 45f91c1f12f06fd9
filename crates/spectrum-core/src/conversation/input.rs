//! Parsing of free-text chat input

use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, NaiveTime};
use spectrum_api::{InputProblem, labels};
use spectrum_util::{monday_of_week, next_monday, parse_clock, parse_clock_range, parse_date, parse_date_range};

pub(crate) fn is_cancel(text: &str) -> bool {
    text == labels::CANCEL || text == labels::DECLINE
}

/// Whether the text confirms a step whose specific button is `label`
pub(crate) fn is_confirm(text: &str, label: &str) -> bool {
    text == label || text == labels::CONFIRM
}

pub(crate) fn day_options() -> Vec<String> {
    [
        labels::TODAY,
        labels::TOMORROW,
        labels::DAY_AFTER_TOMORROW,
        labels::IN_A_WEEK,
    ]
    .map(String::from)
    .to_vec()
}

pub(crate) fn period_options() -> Vec<String> {
    [
        labels::TODAY,
        labels::TOMORROW,
        labels::THIS_WEEK,
        labels::NEXT_WEEK,
        labels::TWO_WEEKS_AHEAD,
        labels::WHOLE_MONTH,
    ]
    .map(String::from)
    .to_vec()
}

/// A day button or a `DD.MM.YYYY` date
pub(crate) fn parse_day(text: &str, today: NaiveDate) -> Result<NaiveDate, InputProblem> {
    let offset = match text {
        labels::TODAY => 0,
        labels::TOMORROW => 1,
        labels::DAY_AFTER_TOMORROW => 2,
        labels::IN_A_WEEK => 7,
        _ => return parse_date(text).ok_or(InputProblem::InvalidDate),
    };
    Ok(today + Days::new(offset))
}

/// Like `parse_day`, rejecting days before today
pub(crate) fn parse_upcoming_day(
    text: &str,
    now: DateTime<Local>,
) -> Result<NaiveDate, InputProblem> {
    let today = now.date_naive();
    let day = parse_day(text, today)?;
    if day < today {
        return Err(InputProblem::DateInPast);
    }
    Ok(day)
}

/// `HH:MM` that has not passed yet on `date`
pub(crate) fn parse_start_time(
    text: &str,
    date: NaiveDate,
    now: DateTime<Local>,
) -> Result<NaiveTime, InputProblem> {
    let time = parse_clock(text).ok_or(InputProblem::InvalidTime)?;
    if date.and_time(time) <= now.naive_local() {
        return Err(InputProblem::TimeInPast);
    }
    Ok(time)
}

/// New times for an existing training: `HH:MM-HH:MM`, or `HH:MM` keeping
/// the current duration
pub(crate) fn parse_new_times(
    text: &str,
    current_start: NaiveTime,
    current_end: NaiveTime,
) -> Result<(NaiveTime, NaiveTime), InputProblem> {
    if let Some((start, end)) = parse_clock_range(text) {
        if end <= start {
            return Err(InputProblem::EndNotAfterStart);
        }
        return Ok((start, end));
    }

    let start = parse_clock(text).ok_or(InputProblem::InvalidTime)?;
    let (end, wrapped) = start.overflowing_add_signed(current_end - current_start);
    if wrapped != 0 || end <= start {
        return Err(InputProblem::EndNotAfterStart);
    }
    Ok((start, end))
}

/// Date range for a period button, a single date, or `DD.MM.YYYY-DD.MM.YYYY`
pub(crate) fn parse_period(
    text: &str,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), InputProblem> {
    let week = Days::new(6);
    match text {
        labels::THIS_WEEK => {
            let monday = monday_of_week(today);
            Ok((monday, monday + week))
        }
        labels::NEXT_WEEK => {
            let monday = next_monday(today);
            Ok((monday, monday + week))
        }
        labels::TWO_WEEKS_AHEAD => Ok((today, today + Days::new(14))),
        labels::WHOLE_MONTH => {
            let first = today.with_day(1).ok_or(InputProblem::InvalidPeriod)?;
            let last = first
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .ok_or(InputProblem::InvalidPeriod)?;
            Ok((first, last))
        }
        _ if text.contains('-') => parse_date_range(text).ok_or(InputProblem::InvalidPeriod),
        _ => parse_day(text, today).map(|day| (day, day)),
    }
}

/// One-based list number
pub(crate) fn parse_index(text: &str, len: usize) -> Result<usize, InputProblem> {
    let number: usize = text.trim().parse().map_err(|_| InputProblem::UnknownOption)?;
    if number == 0 || number > len {
        return Err(InputProblem::IndexOutOfRange { max: len });
    }
    Ok(number - 1)
}

pub(crate) fn pick<'a, T>(items: &'a [T], text: &str) -> Result<&'a T, InputProblem> {
    parse_index(text, items.len()).map(|i| &items[i])
}

/// An item by its exact button text or its list number
pub(crate) fn choose<'a, T>(
    items: &'a [T],
    text: &str,
    name: impl Fn(&T) -> &str,
) -> Result<&'a T, InputProblem> {
    match items.iter().find(|item| name(item) == text) {
        Some(item) => Ok(item),
        None => pick(items, text),
    }
}

/// List numbers separated by commas or spaces, in the order given, without repeats
pub(crate) fn parse_indices(text: &str, len: usize) -> Result<Vec<usize>, InputProblem> {
    let mut picked = Vec::new();
    for part in text.split([',', ' ']).filter(|p| !p.is_empty()) {
        let index = parse_index(part, len)?;
        if !picked.contains(&index) {
            picked.push(index);
        }
    }
    if picked.is_empty() {
        return Err(InputProblem::UnknownOption);
    }
    Ok(picked)
}

/// Russian noun form for a count
fn plural(n: u32, one: &'static str, few: &'static str, many: &'static str) -> &'static str {
    match (n % 10, n % 100) {
        (1, r) if r != 11 => one,
        (2..=4, r) if !(12..=14).contains(&r) => few,
        _ => many,
    }
}

/// Button label for a training length, e.g. `45 минут`, `1.5 часа`
pub(crate) fn duration_label(minutes: u32) -> String {
    let hours = minutes / 60;
    match minutes % 60 {
        _ if hours == 0 => format!("{} {}", minutes, plural(minutes, "минута", "минуты", "минут")),
        0 => format!("{} {}", hours, plural(hours, "час", "часа", "часов")),
        30 => format!("{}.5 часа", hours),
        rest => format!("{} ч {} мин", hours, rest),
    }
}

pub(crate) fn parse_duration(text: &str, options: &[u32]) -> Result<u32, InputProblem> {
    options
        .iter()
        .copied()
        .find(|&m| duration_label(m) == text)
        .ok_or(InputProblem::UnknownOption)
}

pub(crate) fn weeks_label(weeks: u32) -> String {
    format!("{} {}", weeks, plural(weeks, "неделя", "недели", "недель"))
}

/// A weeks button or a plain number within `1..=max_weeks`
pub(crate) fn parse_weeks(text: &str, options: &[u32], max_weeks: u32) -> Result<u32, InputProblem> {
    if let Some(&weeks) = options.iter().find(|&&w| weeks_label(w) == text) {
        return Ok(weeks);
    }
    match text.trim().parse::<u32>() {
        Ok(weeks) if (1..=max_weeks).contains(&weeks) => Ok(weeks),
        _ => Err(InputProblem::InvalidWeeksCount { max: max_weeks }),
    }
}
