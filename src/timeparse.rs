//! Relative time-phrase parsing.
//!
//! A fixed lexicon of phrases maps to (start, end) date ranges computed
//! against an injected `now`, so generation stays deterministic in tests.
//! Unrecognized text falls back to a trailing window instead of failing.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("first of month is valid")
}

fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).expect("january first is valid")
}

/// Previous calendar month as a closed date range.
fn last_month(today: NaiveDate) -> TimeRange {
    let this_month_start = month_start(today);
    let last_month_end = this_month_start - Duration::days(1);
    TimeRange::new(month_start(last_month_end), last_month_end)
}

fn last_week(today: NaiveDate) -> TimeRange {
    let this_week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    TimeRange::new(this_week_start - Duration::days(7), this_week_start - Duration::days(1))
}

/// Parse a relative time phrase out of `text`, evaluated against `now`
/// (UTC). Returns the matched range, or `None` when no phrase from the
/// lexicon occurs.
pub fn parse_time_phrase(text: &str, now: DateTime<Utc>) -> Option<TimeRange> {
    let text = text.to_lowercase();
    let today = now.date_naive();

    // Fixed phrases, checked in declaration order.
    let fixed: &[(&str, fn(NaiveDate) -> TimeRange)] = &[
        ("today", |t| TimeRange::new(t, t)),
        ("yesterday", |t| {
            TimeRange::new(t - Duration::days(1), t - Duration::days(1))
        }),
        ("this week", |t| {
            TimeRange::new(
                t - Duration::days(t.weekday().num_days_from_monday() as i64),
                t,
            )
        }),
        ("last week", last_week),
        ("this month", |t| TimeRange::new(month_start(t), t)),
        ("last month", last_month),
        ("this year", |t| TimeRange::new(year_start(t), t)),
        ("last year", |t| {
            TimeRange::new(
                NaiveDate::from_ymd_opt(t.year() - 1, 1, 1).expect("valid date"),
                NaiveDate::from_ymd_opt(t.year() - 1, 12, 31).expect("valid date"),
            )
        }),
        ("year to date", |t| TimeRange::new(year_start(t), t)),
        ("ytd", |t| TimeRange::new(year_start(t), t)),
    ];
    for (phrase, f) in fixed {
        if text.contains(phrase) {
            return Some(f(today));
        }
    }

    // "last/past N days|weeks|months"
    let relative = Regex::new(r"(?:last|past)\s+(\d+)\s+(day|week|month)s?")
        .expect("relative time pattern must compile");
    if let Some(caps) = relative.captures(&text) {
        let n: i64 = caps[1].parse().ok()?;
        let days = match &caps[2] {
            "day" => n,
            "week" => n * 7,
            "month" => n * 30,
            _ => unreachable!(),
        };
        return Some(TimeRange::new(today - Duration::days(days), today));
    }

    None
}

/// Parse with fallback: unrecognized phrases yield a trailing window of
/// `default_window_days` ending today.
pub fn parse_time_range(text: &str, now: DateTime<Utc>, default_window_days: u32) -> TimeRange {
    parse_time_phrase(text, now).unwrap_or_else(|| {
        let today = now.date_naive();
        TimeRange::new(today - Duration::days(default_window_days as i64), today)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn last_month_spans_previous_calendar_month() {
        let range = parse_time_phrase("total sales last month", at(2024, 3, 15)).unwrap();
        assert_eq!(range, TimeRange::new(date(2024, 2, 1), date(2024, 2, 29)));
    }

    #[test]
    fn last_month_crosses_year_boundary() {
        let range = parse_time_phrase("last month", at(2024, 1, 10)).unwrap();
        assert_eq!(range, TimeRange::new(date(2023, 12, 1), date(2023, 12, 31)));
    }

    #[test]
    fn last_year_is_full_calendar_year() {
        let range = parse_time_phrase("revenue last year", at(2024, 6, 1)).unwrap();
        assert_eq!(range, TimeRange::new(date(2023, 1, 1), date(2023, 12, 31)));
    }

    #[test]
    fn last_n_days() {
        let range = parse_time_phrase("past 7 days", at(2024, 3, 15)).unwrap();
        assert_eq!(range, TimeRange::new(date(2024, 3, 8), date(2024, 3, 15)));
    }

    #[test]
    fn unknown_phrase_falls_back_to_window() {
        let now = at(2024, 3, 15);
        assert_eq!(parse_time_phrase("how are sales", now), None);
        let range = parse_time_range("how are sales", now, 30);
        assert_eq!(range, TimeRange::new(date(2024, 2, 14), date(2024, 3, 15)));
    }

    #[test]
    fn deterministic_for_fixed_now() {
        let now = at(2024, 3, 15);
        assert_eq!(
            parse_time_range("last week", now, 30),
            parse_time_range("last week", now, 30)
        );
    }
}
