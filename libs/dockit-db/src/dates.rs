//! Temporal coercion and timespan resolution for filter compilation.
//!
//! Everything here is pure; "today" is always passed in so predicate
//! compilation stays deterministic under test.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn json_str(v: &JsonValue) -> Option<&str> {
    v.as_str().map(str::trim)
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Render a filter value as a `YYYY-MM-DD` date literal. Unparseable
/// strings pass through untouched (they are still escaped at render
/// time); a missing value means today.
pub(crate) fn format_date(v: &JsonValue) -> String {
    match json_str(v) {
        Some(s) => parse_date(s).map_or_else(|| s.to_owned(), |d| d.format("%Y-%m-%d").to_string()),
        None => today().format("%Y-%m-%d").to_string(),
    }
}

/// Render a filter value as a microsecond-precision datetime literal.
pub(crate) fn format_datetime(v: &JsonValue) -> String {
    match json_str(v) {
        Some(s) => parse_datetime(s)
            .map_or_else(|| s.to_owned(), |dt| dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        None => Utc::now()
            .naive_utc()
            .format("%Y-%m-%d %H:%M:%S%.6f")
            .to_string(),
    }
}

/// Render a filter value as a microsecond-precision time literal.
pub(crate) fn format_time(v: &JsonValue) -> String {
    match json_str(v) {
        Some(s) => parse_time(s).map_or_else(|| s.to_owned(), |t| t.format("%H:%M:%S%.6f").to_string()),
        None => "00:00:00.000000".to_owned(),
    }
}

/// Bounds for a BETWEEN filter on a date-ish column.
///
/// Missing bounds default to today. When the column holds datetimes (or
/// is a bare `creation`/`modified` default column), the upper bound is
/// exclusive: one day is added so the whole final day is covered.
pub(crate) fn between_bounds(
    value: &JsonValue,
    is_datetime_column: bool,
    has_field_def: bool,
    today: NaiveDate,
) -> (String, String) {
    let today_str = today.format("%Y-%m-%d").to_string();
    let (raw_from, raw_to) = match value {
        JsonValue::Array(items) => (
            items.first().and_then(json_str).unwrap_or(&today_str).to_owned(),
            items.get(1).and_then(json_str).unwrap_or(&today_str).to_owned(),
        ),
        _ => (today_str.clone(), today_str.clone()),
    };

    let extend_upper = is_datetime_column || !has_field_def;
    let raw_to = if extend_upper {
        parse_date(&raw_to).map_or(raw_to, |d| (d + Duration::days(1)).format("%Y-%m-%d").to_string())
    } else {
        raw_to
    };

    if is_datetime_column {
        (
            format_datetime(&JsonValue::String(raw_from)),
            format_datetime(&JsonValue::String(raw_to)),
        )
    } else {
        (
            format_date(&JsonValue::String(raw_from)),
            format_date(&JsonValue::String(raw_to)),
        )
    }
}

/* ---------- timespan resolution ---------- */

fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let zero_based = date.year() * 12 + i32::try_from(date.month0()).unwrap_or(0) + months;
    let year = zero_based.div_euclid(12);
    let month = u32::try_from(zero_based.rem_euclid(12)).unwrap_or(0) + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

fn week_start(d: NaiveDate) -> NaiveDate {
    d - Duration::days(i64::from(d.weekday().num_days_from_monday()))
}

fn week_end(d: NaiveDate) -> NaiveDate {
    week_start(d) + Duration::days(6)
}

fn month_start(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).unwrap_or(d)
}

fn month_end(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), d.month(), days_in_month(d.year(), d.month())).unwrap_or(d)
}

fn quarter_start(d: NaiveDate) -> NaiveDate {
    let month = 3 * ((d.month() - 1) / 3) + 1;
    NaiveDate::from_ymd_opt(d.year(), month, 1).unwrap_or(d)
}

fn quarter_end(d: NaiveDate) -> NaiveDate {
    month_end(add_months(quarter_start(d), 2))
}

fn year_start(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), 1, 1).unwrap_or(d)
}

fn year_end(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), 12, 31).unwrap_or(d)
}

/// Resolve a timespan keyword to an inclusive date range.
pub(crate) fn timespan_range(timespan: &str, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let range = match timespan {
        "yesterday" => {
            let d = today - Duration::days(1);
            (d, d)
        }
        "today" => (today, today),
        "tomorrow" => {
            let d = today + Duration::days(1);
            (d, d)
        }
        "last week" => {
            let d = today - Duration::days(7);
            (week_start(d), week_end(d))
        }
        "this week" => (week_start(today), week_end(today)),
        "next week" => {
            let d = today + Duration::days(7);
            (week_start(d), week_end(d))
        }
        "last month" => {
            let d = add_months(today, -1);
            (month_start(d), month_end(d))
        }
        "this month" => (month_start(today), month_end(today)),
        "next month" => {
            let d = add_months(today, 1);
            (month_start(d), month_end(d))
        }
        "last quarter" => {
            let d = add_months(today, -3);
            (quarter_start(d), quarter_end(d))
        }
        "this quarter" => (quarter_start(today), quarter_end(today)),
        "next quarter" => {
            let d = add_months(today, 3);
            (quarter_start(d), quarter_end(d))
        }
        "last 6 months" => (
            quarter_start(add_months(today, -6)),
            quarter_end(add_months(today, -3)),
        ),
        "next 6 months" => (
            quarter_start(add_months(today, 3)),
            quarter_end(add_months(today, 6)),
        ),
        "last year" => {
            let d = add_months(today, -12);
            (year_start(d), year_end(d))
        }
        "this year" => (year_start(today), year_end(today)),
        "next year" => {
            let d = add_months(today, 12);
            (year_start(d), year_end(d))
        }
        _ => return None,
    };
    Some(range)
}

/// Resolve `previous`/`next` period operators to a timespan keyword range.
/// `value` names the span width (`1 week`, `1 month`, `3 months`,
/// `6 months`, `1 year`).
pub(crate) fn period_range(
    period: &str,
    value: &str,
    today: NaiveDate,
) -> Option<(NaiveDate, NaiveDate)> {
    let span = match value.trim() {
        "1 week" => "week",
        "1 month" => "month",
        "3 months" => "quarter",
        "6 months" => "6 months",
        "1 year" => "year",
        _ => return None,
    };
    let keyword = match period {
        "previous" => format!("last {span}"),
        "next" => format!("next {span}"),
        _ => return None,
    };
    timespan_range(&keyword, today)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn datetime_between_extends_upper_bound_by_one_day() {
        let (from, to) = between_bounds(&json!(["2016-07-06", "2016-07-07"]), true, true, d(2016, 7, 1));
        assert_eq!(from, "2016-07-06 00:00:00.000000");
        assert_eq!(to, "2016-07-08 00:00:00.000000");
    }

    #[test]
    fn date_between_keeps_bounds_inclusive() {
        let (from, to) =
            between_bounds(&json!(["2016-07-06", "2016-07-07"]), false, true, d(2016, 7, 1));
        assert_eq!(from, "2016-07-06");
        assert_eq!(to, "2016-07-07");
    }

    #[test]
    fn missing_bounds_default_to_today() {
        let (from, to) = between_bounds(&json!(["2016-07-06"]), false, true, d(2016, 7, 9));
        assert_eq!(from, "2016-07-06");
        assert_eq!(to, "2016-07-09");
    }

    #[test]
    fn default_column_extends_upper_but_renders_dates() {
        let (from, to) =
            between_bounds(&json!(["2016-07-06", "2016-07-07"]), false, false, d(2016, 7, 1));
        assert_eq!(from, "2016-07-06");
        assert_eq!(to, "2016-07-08");
    }

    #[test]
    fn quarter_boundaries() {
        assert_eq!(quarter_start(d(2026, 8, 6)), d(2026, 7, 1));
        assert_eq!(quarter_end(d(2026, 8, 6)), d(2026, 9, 30));
    }

    #[test]
    fn this_month_range() {
        let (from, to) = timespan_range("this month", d(2026, 2, 10)).unwrap();
        assert_eq!(from, d(2026, 2, 1));
        assert_eq!(to, d(2026, 2, 28));
    }

    #[test]
    fn week_starts_monday() {
        // 2026-08-06 is a Thursday
        let (from, to) = timespan_range("this week", d(2026, 8, 6)).unwrap();
        assert_eq!(from, d(2026, 8, 3));
        assert_eq!(to, d(2026, 8, 9));
    }

    #[test]
    fn previous_period_maps_to_last_keyword() {
        let (from, to) = period_range("previous", "1 month", d(2026, 8, 6)).unwrap();
        assert_eq!(from, d(2026, 7, 1));
        assert_eq!(to, d(2026, 7, 31));
    }

    #[test]
    fn unknown_timespan_is_none() {
        assert!(timespan_range("fortnight", d(2026, 8, 6)).is_none());
    }

    #[test]
    fn month_arithmetic_clamps_day() {
        assert_eq!(add_months(d(2026, 1, 31), 1), d(2026, 2, 28));
        assert_eq!(add_months(d(2026, 3, 31), -1), d(2026, 2, 28));
    }
}
