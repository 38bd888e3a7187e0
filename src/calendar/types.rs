//! Calendar value types and the adapter over backend records.
//!
//! Backends hand back loosely-shaped JSON whose field names drift between
//! versions (`identifier` vs `id`, `startDate` vs `start`, a nested
//! `calendar` object vs a flat `calendarTitle`). [`RawEvent`] and
//! [`RawCalendar`] absorb that drift; nothing past [`RawEvent::into_event`]
//! sees an untyped field.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title used when a backend event has none.
pub const UNTITLED_EVENT: &str = "Untitled Event";

/// Calendar name used when neither the event nor the caller supplies one.
pub const FALLBACK_CALENDAR_NAME: &str = "Calendar";

/// A calendar event as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    /// UTC, millisecond precision, `Z` suffix.
    pub start_date: Option<String>,
    /// UTC, millisecond precision, `Z` suffix.
    pub end_date: Option<String>,
    pub calendar_name: String,
    pub is_all_day: bool,
    pub url: Option<String>,
}

impl CalendarEvent {
    /// Both ends of the event are known.
    pub fn has_range(&self) -> bool {
        self.start_date.is_some() && self.end_date.is_some()
    }

    /// Lowercased title, location and notes joined by newlines, skipping
    /// blank fields.
    pub fn search_haystack(&self) -> String {
        [
            Some(self.title.as_str()),
            self.location.as_deref(),
            self.notes.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase()
    }
}

/// Render a UTC instant the way every outgoing date is rendered.
pub fn to_iso_millis(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A calendar record from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawCalendar(pub Value);

impl RawCalendar {
    /// Display name; empty when the record has none.
    pub fn title(&self) -> String {
        first_string(&self.0, &["title", "name"]).unwrap_or_default()
    }

    /// Backend identifier; empty when the record has none.
    pub fn id(&self) -> String {
        first_string(&self.0, &["identifier", "id", "calendarIdentifier"]).unwrap_or_default()
    }
}

/// An event record from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent(pub Value);

impl RawEvent {
    /// Event identifier; empty when the record carries none.
    pub fn id(&self) -> String {
        first_string(&self.0, &["identifier", "id", "eventIdentifier", "uid"]).unwrap_or_default()
    }

    /// Name of the calendar this event lives in; empty when unknown.
    pub fn calendar_name(&self) -> String {
        let nested = self
            .0
            .get("calendar")
            .and_then(|c| first_string(c, &["title", "name"]))
            .filter(|s| !s.is_empty());
        nested
            .or_else(|| first_string(&self.0, &["calendarTitle", "calendarName"]))
            .unwrap_or_default()
    }

    /// Identifier of the calendar this event lives in; empty when unknown.
    pub fn calendar_id(&self) -> String {
        let nested = self
            .0
            .get("calendar")
            .and_then(|c| first_string(c, &["identifier", "id", "calendarIdentifier"]))
            .filter(|s| !s.is_empty());
        nested
            .or_else(|| first_string(&self.0, &["calendarIdentifier", "calendarId"]))
            .unwrap_or_default()
    }

    /// Map into a [`CalendarEvent`].
    ///
    /// `fallback_calendar` names the calendar when the record does not.
    pub fn into_event(self, fallback_calendar: &str) -> CalendarEvent {
        let value = &self.0;

        let calendar_name = Some(self.calendar_name())
            .filter(|s| !s.is_empty())
            .or_else(|| Some(fallback_calendar.to_owned()).filter(|s| !s.is_empty()))
            .unwrap_or_else(|| FALLBACK_CALENDAR_NAME.to_owned());

        let id = first_string(value, &["identifier", "id", "eventIdentifier", "uid"])
            .unwrap_or_else(|| format!("unknown-{}", Utc::now().timestamp_millis()));

        let title = first_string(value, &["title", "summary", "name"])
            .unwrap_or_else(|| UNTITLED_EVENT.to_owned());

        CalendarEvent {
            id,
            title,
            location: non_empty_string(value.get("location")),
            notes: non_empty_string(value.get("notes")),
            start_date: first_date(value, &["startDate", "start"]),
            end_date: first_date(value, &["endDate", "end"]),
            calendar_name,
            is_all_day: first_bool(value, &["isAllDay", "allDay", "alldayEvent"]),
            url: non_empty_string(value.get("url").or_else(|| value.get("URL"))),
        }
    }
}

fn as_plain_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First present, non-null key among `keys`, stringified.
fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find(|v| !v.is_null())
        .and_then(as_plain_string)
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(as_plain_string)
        .filter(|s| !s.is_empty())
}

fn first_bool(value: &Value, keys: &[&str]) -> bool {
    match keys
        .iter()
        .filter_map(|key| value.get(*key))
        .find(|v| !v.is_null())
    {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}

fn first_date(value: &Value, keys: &[&str]) -> Option<String> {
    let raw = keys
        .iter()
        .filter_map(|key| value.get(*key))
        .find(|v| !v.is_null())?;
    normalize_event_date(raw)
}

/// Normalize a backend date (ISO string or epoch milliseconds) to UTC millis.
fn normalize_event_date(value: &Value) -> Option<String> {
    let instant = match value {
        Value::String(s) if !s.is_empty() => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| super::dates::parse_timestamp(s))?,
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            if millis == 0 {
                return None;
            }
            Utc.timestamp_millis_opt(millis).single()?
        }
        _ => return None,
    };
    Some(to_iso_millis(instant))
}
