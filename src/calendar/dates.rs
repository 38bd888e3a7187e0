//! Date argument parsing.
//!
//! Two input shapes are accepted: a bare day (`YYYY-MM-DD`, interpreted in
//! local time) and a timestamp (`YYYY-MM-DDTHH:mm[:ss[.fff]]` with an
//! optional `Z` or `±hh[:]mm` offset; no offset means local time).
//! Everything handed back to clients is UTC via
//! [`to_iso_millis`](super::types::to_iso_millis).

use chrono::{
    DateTime, Days, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};

use crate::error::{CalendarError, Result};

/// Which end of a range a date argument describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// A bare day means local midnight.
    Start,
    /// A bare day means 23:59:59.999 local.
    End,
}

/// `true` for exactly `DDDD-DD-DD`.
pub fn is_date_only(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Trim an optional date argument and reject blank or non-ISO values.
///
/// `None` stays `None`; the returned string is the trimmed raw input.
pub fn normalize_date_input(value: Option<&str>, field: &'static str) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let raw = value.trim();
    if raw.is_empty() || !(is_date_only(raw) || looks_like_timestamp(raw)) {
        return Err(CalendarError::InvalidDate {
            field,
            value: raw.to_owned(),
        });
    }
    Ok(Some(raw.to_owned()))
}

/// Parse a validated date argument into a UTC instant.
pub fn parse_date_input(raw: &str, field: &'static str, bound: Bound) -> Result<DateTime<Utc>> {
    let invalid = || CalendarError::InvalidDate {
        field,
        value: raw.to_owned(),
    };

    if is_date_only(raw) {
        let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
        let time = match bound {
            Bound::Start => NaiveTime::MIN,
            Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999).ok_or_else(invalid)?,
        };
        return local_to_utc(day.and_time(time)).ok_or_else(invalid);
    }

    parse_timestamp(raw).ok_or_else(invalid)
}

/// Parse a timestamp with or without an offset.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if !looks_like_timestamp(raw) {
        return None;
    }

    // chrono's %z does not take a bare `Z`.
    let zoned = match raw.strip_suffix(['Z', 'z']) {
        Some(head) => format!("{head}+00:00"),
        None => raw.to_owned(),
    };

    const WITH_OFFSET: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M%:z",
        "%Y-%m-%dT%H:%M%z",
    ];
    if let Some(dt) = WITH_OFFSET
        .iter()
        .find_map(|fmt| DateTime::<FixedOffset>::parse_from_str(&zoned, fmt).ok())
    {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
    NAIVE
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(local_to_utc)
}

/// `[today, today + 7 days]` as bare local days.
pub fn default_window(today: NaiveDate) -> (String, String) {
    let end = today.checked_add_days(Days::new(7)).unwrap_or(today);
    (
        today.format("%Y-%m-%d").to_string(),
        end.format("%Y-%m-%d").to_string(),
    )
}

/// Today's local date.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

fn looks_like_timestamp(raw: &str) -> bool {
    raw.len() >= 16
        && raw.get(..10).is_some_and(is_date_only)
        && raw.as_bytes().get(10) == Some(&b'T')
}

fn local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        // Skipped by a DST jump; take the instant an hour later.
        LocalResult::None => Local
            .from_local_datetime(&(naive + chrono::Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}
