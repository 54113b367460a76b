use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{Recurrence, Task};

/// Parses a stored `YYYY-MM-DD` date. Anything else is treated as absent
/// by the callers rather than an error.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Next occurrence of a repeating series. `Recurrence::None` and input that
/// does not parse as a date pass through unchanged.
pub fn next_due_date(current: &str, recurrence: Recurrence) -> String {
    let Some(date) = parse_date(current) else {
        return current.to_string();
    };

    let next = match recurrence {
        Recurrence::None => return current.to_string(),
        Recurrence::Daily => date + Duration::days(1),
        Recurrence::Weekly => date + Duration::days(7),
        Recurrence::Monthly => next_month(date),
        Recurrence::Yearly => next_year(date),
    };

    format_date(next)
}

fn next_month(date: NaiveDate) -> NaiveDate {
    let (mut year, mut month) = (date.year(), date.month());
    month += 1;
    if month > 12 {
        month = 1;
        year += 1;
    }
    // Jan 31 -> Feb 28/29: clamp to the last valid day of the target month.
    let day = date.day().min(last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

fn next_year(date: NaiveDate) -> NaiveDate {
    let year = date.year() + 1;
    let day = date.day().min(last_day_of_month(year, date.month()));
    NaiveDate::from_ymd_opt(year, date.month(), day).unwrap_or(date)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("first of month is always valid");
    (first_of_next - Duration::days(1)).day()
}

pub fn is_today(date: &str, today: NaiveDate) -> bool {
    parse_date(date).map(|d| d == today).unwrap_or(false)
}

pub fn is_tomorrow(date: &str, today: NaiveDate) -> bool {
    parse_date(date)
        .map(|d| d == today + Duration::days(1))
        .unwrap_or(false)
}

/// Due within the next three days, today and the third day inclusive.
pub fn is_due_soon(date: &str, today: NaiveDate) -> bool {
    parse_date(date)
        .map(|d| d >= today && d <= today + Duration::days(3))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorizedTasks {
    pub today: Vec<Task>,
    pub tomorrow: Vec<Task>,
    pub upcoming: Vec<Task>,
    pub past: Vec<Task>,
}

/// Buckets tasks by due date relative to `today`. Tasks without a due date
/// (or with one that does not parse) count as due today. Each bucket is
/// sorted ascending by due date with date-less tasks first.
pub fn categorize(tasks: &[Task], today: NaiveDate) -> CategorizedTasks {
    let mut buckets = CategorizedTasks::default();

    for task in tasks {
        let due = task.due_date.as_deref().and_then(parse_date);
        let bucket = match due {
            None => &mut buckets.today,
            Some(date) if date == today => &mut buckets.today,
            Some(date) if date == today + Duration::days(1) => &mut buckets.tomorrow,
            Some(date) if date < today => &mut buckets.past,
            Some(_) => &mut buckets.upcoming,
        };
        bucket.push(task.clone());
    }

    for bucket in [
        &mut buckets.today,
        &mut buckets.tomorrow,
        &mut buckets.upcoming,
        &mut buckets.past,
    ] {
        // Option<NaiveDate> orders None first, which is the wanted position
        // for date-less tasks.
        bucket.sort_by_key(|task| task.due_date.as_deref().and_then(parse_date));
    }

    buckets
}
