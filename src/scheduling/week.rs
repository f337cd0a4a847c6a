//! Time-window resolver — turns a caller-supplied week token into a
//! canonical UTC week window.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;

/// `YYYY-Www` ISO year-week token, e.g. `2025-W01`.
static ISO_WEEK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{2})$").expect("valid ISO week pattern"));

/// A canonical UTC week span: Monday 00:00:00.000 through Sunday 23:59:59.999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Resolve a week token to its UTC window.
///
/// Accepted tokens, tried in order:
/// 1. ISO year-week (`2025-W01`) — the Monday of ISO week 1 is the Monday
///    on/before January 4th; later weeks add whole weeks to it.
/// 2. Calendar date (`2025-06-10`) — the Monday-starting week containing it.
/// 3. Anything else (including no token) — the week containing `now`.
///
/// Malformed tokens deliberately fall back to the current week rather than
/// erroring; callers needing strict validation pre-validate the token.
pub fn resolve_week(token: Option<&str>, now: DateTime<Utc>) -> WeekWindow {
    let anchor = token
        .and_then(|t| parse_iso_week(t).or_else(|| parse_date(t)))
        .unwrap_or_else(|| now.date_naive());
    window_for(anchor)
}

/// The week window containing the given date.
fn window_for(date: NaiveDate) -> WeekWindow {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    let sunday = monday + Duration::days(6);
    WeekWindow {
        start: monday
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time")
            .and_utc(),
        end: sunday
            .and_hms_milli_opt(23, 59, 59, 999)
            .expect("end of day is a valid time")
            .and_utc(),
    }
}

/// Parse an ISO year-week token into the Monday of that week.
fn parse_iso_week(token: &str) -> Option<NaiveDate> {
    let caps = ISO_WEEK_RE.captures(token)?;
    let year: i32 = caps[1].parse().ok()?;
    let week: u32 = caps[2].parse().ok()?;
    if !(1..=53).contains(&week) {
        return None;
    }
    // ISO week 1 contains January 4th; its Monday is the Monday on/before it.
    let jan4 = NaiveDate::from_ymd_opt(year, 1, 4)?;
    let week1_monday = jan4 - Duration::days(jan4.weekday().num_days_from_monday() as i64);
    Some(week1_monday + Duration::weeks(week as i64 - 1))
}

fn parse_date(token: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
}
