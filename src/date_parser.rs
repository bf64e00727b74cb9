//! Date and time extraction from natural-language messages.
//!
//! Everything here is naive (no timezone). Callers treat results as UTC.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use regex::Regex;
use tracing::{debug, info};

/// `(time_min, time_max)`, both inclusive.
pub type DateRange = (NaiveDateTime, NaiveDateTime);

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const MONTH_PATTERN: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

const WEEKDAY_PATTERN: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";

static RELATIVE_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(today|tonight|tomorrow)\b").unwrap());

static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(?:(next|this|coming)\s+)?({WEEKDAY_PATTERN})\b")).unwrap()
});

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b({MONTH_PATTERN})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}})\b)?"
    ))
    .unwrap()
});

static DAY_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTH_PATTERN})\b\.?(?:,?\s+(\d{{4}})\b)?"
    ))
    .unwrap()
});

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());

static SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

static ORDINAL_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bthe\s+(\d{1,2})(?:st|nd|rd|th)\b").unwrap());

static TIME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\d{1,2}:\d{2}",
        r"\d{1,2}\s*(am|pm)\b",
        r"\bat\s+\d{1,2}",
        r"\b(morning|afternoon|evening|night)\b",
        r"\b(noon|midnight)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static AM_PM_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").unwrap());

static CLOCK_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").unwrap());

static AT_HOUR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bat\s+(\d{1,2})\b").unwrap());

static PART_OF_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(morning|afternoon|evening|night|noon|midnight)\b").unwrap()
});

static FULL_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b({})\b(\s+\w+)?", MONTHS.join("|"))).unwrap()
});

/// Extract a single date (or date and time) from `message`.
///
/// Ambiguous dates prefer the future: "January 15" asked in June means next
/// January. When the message names a time, the window is one hour from that
/// time; otherwise it spans the whole day.
pub fn extract_datetime_range(message: &str, reference: NaiveDateTime) -> Option<DateRange> {
    let lower = message.to_lowercase();

    let Some(date) = find_date(&lower, reference.date()) else {
        debug!(
            message = %message.chars().take(50).collect::<String>(),
            "No date found in message"
        );
        return None;
    };

    let range = match message_contains_time(message).then(|| find_time(&lower)).flatten() {
        Some(time) => {
            let start = date.and_time(time);
            (start, start + Duration::hours(1))
        }
        None => full_day(date),
    };

    info!(start = %range.0, end = %range.1, "Parsed date range from message");
    Some(range)
}

/// Whether `message` mentions a specific time of day.
pub fn message_contains_time(message: &str) -> bool {
    let lower = message.to_lowercase();
    TIME_PATTERNS.iter().any(|re| re.is_match(&lower))
}

/// Extract a range for open-ended availability questions.
///
/// Tries, in order: a month name (whole month), "weekend", "next week",
/// "this week", and finally a single date.
pub fn extract_date_range_for_general_query(
    message: &str,
    reference: NaiveDateTime,
) -> Option<DateRange> {
    let lower = message.to_lowercase();
    let today = reference.date();

    if let Some(month) = find_month_name(&lower) {
        return month_range(month, today);
    }

    // before "this week", which "this weekend" also contains
    if lower.contains("weekend") {
        return Some(weekend_range(today, lower.contains("next")));
    }
    if lower.contains("next week") {
        return Some(next_week_range(today));
    }
    if lower.contains("this week") {
        return Some(this_week_range(today));
    }

    extract_datetime_range(message, reference)
}

// ── Single dates ────────────────────────────────────────────────────

/// Earliest date mention in `lower`, resolved against `today`.
fn find_date(lower: &str, today: NaiveDate) -> Option<NaiveDate> {
    let mut found: Vec<(usize, NaiveDate)> = Vec::new();

    for caps in RELATIVE_DAY.captures_iter(lower) {
        let offset = if &caps[1] == "tomorrow" { 1 } else { 0 };
        found.push((caps.get(0)?.start(), today + Duration::days(offset)));
    }

    for caps in WEEKDAY.captures_iter(lower) {
        let Some(weekday) = parse_weekday(&caps[2]) else {
            continue;
        };
        let strictly_after = matches!(caps.get(1).map(|m| m.as_str()), Some("next" | "coming"));
        found.push((caps.get(0)?.start(), upcoming_weekday(today, weekday, strictly_after)));
    }

    for caps in MONTH_DAY.captures_iter(lower) {
        let month = month_number(&caps[1]);
        let day = caps[2].parse().ok();
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
        if let (Some(month), Some(day)) = (month, day) {
            if let Some(date) = resolve(today, year, month, day) {
                found.push((caps.get(0)?.start(), date));
            }
        }
    }

    for caps in DAY_MONTH.captures_iter(lower) {
        let day = caps[1].parse().ok();
        let month = month_number(&caps[2]);
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
        if let (Some(month), Some(day)) = (month, day) {
            if let Some(date) = resolve(today, year, month, day) {
                found.push((caps.get(0)?.start(), date));
            }
        }
    }

    for caps in ISO_DATE.captures_iter(lower) {
        let (Ok(y), Ok(m), Ok(d)) = (caps[1].parse(), caps[2].parse(), caps[3].parse()) else {
            continue;
        };
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            found.push((caps.get(0)?.start(), date));
        }
    }

    for caps in SLASH_DATE.captures_iter(lower) {
        let (Ok(d), Ok(m), Ok(y)) = (caps[1].parse(), caps[2].parse(), caps[3].parse()) else {
            continue;
        };
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            found.push((caps.get(0)?.start(), date));
        }
    }

    for caps in ORDINAL_DAY.captures_iter(lower) {
        if let Some(date) = caps[1].parse().ok().and_then(|d| next_day_of_month(today, d)) {
            found.push((caps.get(0)?.start(), date));
        }
    }

    found.into_iter().min_by_key(|(pos, _)| *pos).map(|(_, date)| date)
}

/// A month/day with an optional year. Without a year, dates already past
/// this year roll to next year.
fn resolve(today: NaiveDate, year: Option<i32>, month: u32, day: u32) -> Option<NaiveDate> {
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
            match this_year {
                Some(date) if date >= today => Some(date),
                _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
            }
        }
    }
}

/// "the 20th": this month if not yet past, else the next month that has
/// that day.
fn next_day_of_month(today: NaiveDate, day: u32) -> Option<NaiveDate> {
    let (mut year, mut month) = (today.year(), today.month());
    for _ in 0..12 {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            if date >= today {
                return Some(date);
            }
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    None
}

fn upcoming_weekday(today: NaiveDate, weekday: Weekday, strictly_after: bool) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut days = (target - current).rem_euclid(7);
    if days == 0 && strictly_after {
        days = 7;
    }
    today + Duration::days(days)
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    name.parse().ok()
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.trim_end_matches('.');
    MONTHS
        .iter()
        .position(|m| *m == name || (name.len() >= 3 && m.starts_with(name)))
        .map(|i| i as u32 + 1)
}

// ── Times ───────────────────────────────────────────────────────────

fn find_time(lower: &str) -> Option<NaiveTime> {
    if let Some(caps) = AM_PM_TIME.captures(lower) {
        let mut hour: u32 = caps[1].parse().ok()?;
        let minute = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        match &caps[3] {
            "pm" if hour < 12 => hour += 12,
            "am" if hour == 12 => hour = 0,
            _ => {}
        }
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    if let Some(caps) = CLOCK_TIME.captures(lower) {
        return NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0);
    }
    if let Some(caps) = AT_HOUR.captures(lower) {
        return NaiveTime::from_hms_opt(caps[1].parse().ok()?, 0, 0);
    }

    let hour = match PART_OF_DAY.captures(lower)?.get(1)?.as_str() {
        "morning" => 9,
        "noon" => 12,
        "afternoon" => 14,
        "evening" => 18,
        "night" => 20,
        _ => 0,
    };
    NaiveTime::from_hms_opt(hour, 0, 0)
}

// ── General ranges ──────────────────────────────────────────────────

fn find_month_name(lower: &str) -> Option<u32> {
    FULL_MONTH.captures_iter(lower).find_map(|caps| {
        let name = caps.get(1)?.as_str();
        let next_word = caps.get(2).map(|m| m.as_str().trim());
        if name == "may" && matches!(next_word, Some("i" | "we" | "you" | "he" | "she" | "they")) {
            return None;
        }
        month_number(name)
    })
}

fn month_range(month: u32, today: NaiveDate) -> Option<DateRange> {
    let year = if month < today.month() {
        today.year() + 1
    } else {
        today.year()
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((
        first.and_time(NaiveTime::MIN),
        next_first.and_time(NaiveTime::MIN) - Duration::seconds(1),
    ))
}

/// Monday to Sunday of the following week.
fn next_week_range(today: NaiveDate) -> DateRange {
    let until_monday = 7 - today.weekday().num_days_from_monday() as i64;
    let monday = today + Duration::days(until_monday);
    (start_of(monday), end_of(monday + Duration::days(6)))
}

/// Today through Sunday.
fn this_week_range(today: NaiveDate) -> DateRange {
    let until_sunday = 6 - today.weekday().num_days_from_monday() as i64;
    (start_of(today), end_of(today + Duration::days(until_sunday)))
}

/// Saturday and Sunday. On a Sunday, "this weekend" is just today.
fn weekend_range(today: NaiveDate, next: bool) -> DateRange {
    let weekday = today.weekday().num_days_from_monday() as i64;
    if weekday == 6 && !next {
        return full_day(today);
    }

    let until_saturday = match (weekday, next) {
        (0..=4, false) => 5 - weekday,
        (0..=4, true) => 12 - weekday,
        (5, false) => 0,
        (5, true) => 7,
        _ => 6,
    };
    let saturday = today + Duration::days(until_saturday);
    (start_of(saturday), end_of(saturday + Duration::days(1)))
}

fn start_of(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// 23:59:59.999999999 on `date`.
fn end_of(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN))
}

fn full_day(date: NaiveDate) -> DateRange {
    (start_of(date), end_of(date))
}
