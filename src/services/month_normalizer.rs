//! Reduces heterogeneous date representations to a [`CanonicalMonth`].
//!
//! Resolution order, first success wins:
//!
//! 1. empty cells are rejected;
//! 2. structured dates and timestamps are formatted directly;
//! 3. text is trimmed and matched exactly against [`EXACT_PATTERNS`], in order;
//! 4. a best-effort parse over common export formats.
//!
//! `DD/MM/YYYY` is tried before `MM/DD/YYYY`, so `05/08/2025` is read as
//! 5 August. Only values whose first field exceeds 12 reach the month-first
//! pattern. Slash dates with both fields at or below 12 are therefore
//! ambiguous; the order is kept as-is so previously imported data keeps its
//! interpretation.

use chrono::{DateTime, Month, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

use crate::models::{CanonicalMonth, CellValue};

/// A strptime-style format and whether it carries a day field.
#[derive(Debug, Clone, Copy)]
struct MonthPattern {
    format: &'static str,
    has_day: bool,
}

const fn with_day(format: &'static str) -> MonthPattern {
    MonthPattern {
        format,
        has_day: true,
    }
}

const fn month_only(format: &'static str) -> MonthPattern {
    MonthPattern {
        format,
        has_day: false,
    }
}

/// Exact patterns, in resolution order.
const EXACT_PATTERNS: &[MonthPattern] = &[
    month_only("%Y-%m"),
    month_only("%Y/%m"),
    with_day("%Y-%m-%d"),
    with_day("%d/%m/%Y"),
    with_day("%m/%d/%Y"),
    month_only("%b %Y"),
    month_only("%B %Y"),
];

const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d.%m.%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%m/%d/%y",
    "%d/%m/%y",
    "%d %B %Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%A, %B %d, %Y",
];

static NAME_THEN_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)([a-z]+)\.?[\s,\-/.']*(\d{4})$").expect("valid month-name regex")
});

static YEAR_THEN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(\d{4})[\s,\-/.]*([a-z]+)\.?$").expect("valid month-name regex")
});

/// Normalize any cell to its canonical month, or `None` when it cannot be resolved.
pub fn normalize(value: &CellValue) -> Option<CanonicalMonth> {
    match value {
        CellValue::Empty => None,
        CellValue::Date(date) => CanonicalMonth::from_date(date),
        CellValue::DateTime(datetime) => CanonicalMonth::from_date(datetime),
        CellValue::Bool(_) => None,
        other => normalize_text(&other.to_text()),
    }
}

/// Text path of [`normalize`].
pub fn normalize_text(raw: &str) -> Option<CanonicalMonth> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    match_exact(text).or_else(|| parse_fallback(text))
}

fn match_exact(text: &str) -> Option<CanonicalMonth> {
    EXACT_PATTERNS
        .iter()
        .find_map(|pattern| parse_with_pattern(text, pattern).filter(has_four_digit_year))
}

/// `%Y` in chrono accepts any digit count; a two-digit "year" means the
/// pattern matched the wrong shape of date.
fn has_four_digit_year(month: &CanonicalMonth) -> bool {
    month.year() >= 1000
}

fn parse_with_pattern(text: &str, pattern: &MonthPattern) -> Option<CanonicalMonth> {
    let date = if pattern.has_day {
        NaiveDate::parse_from_str(text, pattern.format).ok()?
    } else {
        // chrono needs a day to build a date; pin the first.
        let padded = format!("{text} 1");
        let format = format!("{} %d", pattern.format);
        NaiveDate::parse_from_str(&padded, &format).ok()?
    };
    CanonicalMonth::from_date(&date)
}

fn parse_fallback(text: &str) -> Option<CanonicalMonth> {
    // Offsets are ignored: the month is the one written in the text.
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return CanonicalMonth::from_date(&dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return CanonicalMonth::from_date(&dt.naive_local());
    }

    FALLBACK_DATETIME_FORMATS
        .iter()
        .filter_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .find_map(|dt| CanonicalMonth::from_date(&dt).filter(has_four_digit_year))
        .or_else(|| {
            FALLBACK_DATE_FORMATS
                .iter()
                .filter_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .find_map(|date| CanonicalMonth::from_date(&date).filter(has_four_digit_year))
        })
        .or_else(|| parse_compact_date(text))
        .or_else(|| parse_month_name_and_year(text))
}

/// `20250814`
fn parse_compact_date(text: &str) -> Option<CanonicalMonth> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = text[..4].parse().ok()?;
    let month: u32 = text[4..6].parse().ok()?;
    let day: u32 = text[6..].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    CanonicalMonth::from_date(&date)
}

/// `Aug-2025`, `2025 August`, `Sept. 2025`
fn parse_month_name_and_year(text: &str) -> Option<CanonicalMonth> {
    let (name, year) = if let Some(caps) = NAME_THEN_YEAR.captures(text) {
        (caps.get(1)?.as_str(), caps.get(2)?.as_str())
    } else if let Some(caps) = YEAR_THEN_NAME.captures(text) {
        (caps.get(2)?.as_str(), caps.get(1)?.as_str())
    } else {
        return None;
    };

    let month = month_from_name(name)?;
    CanonicalMonth::new(year.parse().ok()?, month)
}

fn month_from_name(name: &str) -> Option<u32> {
    let lowered = name.to_ascii_lowercase();
    let candidate = if lowered == "sept" { "sep" } else { lowered.as_str() };
    candidate
        .parse::<Month>()
        .ok()
        .map(|m| m.number_from_month())
}
