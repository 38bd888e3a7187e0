//! In-memory [`CalendarBackend`] for tests and offline runs.
//!
//! Events are stored as backend-shaped JSON so the same record adapter runs
//! against mock data as against Calendar.app.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use super::store::{CalendarBackend, EventPredicate, NewEventRecord};
use super::types::{RawCalendar, RawEvent, to_iso_millis};
use crate::error::BackendError;

fn poisoned() -> BackendError {
    BackendError::Unavailable("mock lock poisoned".to_owned())
}

/// An in-memory calendar backend.
pub struct MockCalendarBackend {
    calendars: Vec<RawCalendar>,
    events: Mutex<Vec<RawEvent>>,
    next_id: Mutex<u64>,
    access_granted: AtomicBool,
    refuse_removal: AtomicBool,
    read_failure: Mutex<Option<BackendError>>,
    save_calls: AtomicUsize,
}

impl Default for MockCalendarBackend {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MockCalendarBackend {
    /// Create a backend seeded with `calendars` and no events.
    pub fn new(calendars: Vec<RawCalendar>) -> Self {
        Self {
            calendars,
            events: Mutex::new(Vec::new()),
            next_id: Mutex::new(2000),
            access_granted: AtomicBool::new(true),
            refuse_removal: AtomicBool::new(false),
            read_failure: Mutex::new(None),
            save_calls: AtomicUsize::new(0),
        }
    }

    /// Create a backend from `(title, identifier)` pairs.
    pub fn with_calendars(calendars: &[(&str, &str)]) -> Self {
        Self::new(
            calendars
                .iter()
                .map(|(title, id)| RawCalendar(json!({ "title": title, "identifier": id })))
                .collect(),
        )
    }

    /// Seed an event record as-is.
    pub fn with_event(mut self, event: RawEvent) -> Self {
        if let Ok(events) = self.events.get_mut() {
            events.push(event);
        }
        self
    }

    /// Seed a well-formed event in calendar `calendar_id`.
    pub fn with_simple_event(
        self,
        id: &str,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar_id: &str,
    ) -> Self {
        let calendar_title = self.calendar_title(calendar_id);
        self.with_event(RawEvent(json!({
            "identifier": id,
            "title": title,
            "startDate": to_iso_millis(start),
            "endDate": to_iso_millis(end),
            "isAllDay": false,
            "calendar": { "title": calendar_title, "identifier": calendar_id },
        })))
    }

    /// Make [`CalendarBackend::request_access`] answer `false`.
    pub fn deny_access(self) -> Self {
        self.access_granted.store(false, Ordering::SeqCst);
        self
    }

    /// Make [`CalendarBackend::remove_event`] answer `false`.
    pub fn refuse_removal(self) -> Self {
        self.refuse_removal.store(true, Ordering::SeqCst);
        self
    }

    /// Fail every event read with `error` until cleared.
    pub fn set_read_failure(&self, error: Option<BackendError>) {
        if let Ok(mut slot) = self.read_failure.lock() {
            *slot = error;
        }
    }

    /// Number of times `save_event` was called.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of stored events.
    pub fn events(&self) -> Vec<RawEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn calendar_title(&self, calendar_id: &str) -> String {
        self.calendars
            .iter()
            .find(|c| c.id() == calendar_id)
            .map(RawCalendar::title)
            .unwrap_or_default()
    }

    fn check_read_failure(&self) -> Result<(), BackendError> {
        let slot = self.read_failure.lock().map_err(|_| poisoned())?;
        match *slot {
            Some(ref error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn parse_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn overlaps(event: &RawEvent, predicate: &EventPredicate) -> bool {
    let mapped = event.clone().into_event("");
    let start = parse_instant(mapped.start_date.as_deref());
    let end = parse_instant(mapped.end_date.as_deref());
    match (start, end) {
        (Some(start), Some(end)) => start <= predicate.end && end >= predicate.start,
        // Undated records are handed back for the caller to filter.
        _ => true,
    }
}

#[async_trait]
impl CalendarBackend for MockCalendarBackend {
    async fn request_access(&self) -> Result<bool, BackendError> {
        Ok(self.access_granted.load(Ordering::SeqCst))
    }

    async fn list_calendars(&self) -> Result<Vec<RawCalendar>, BackendError> {
        Ok(self.calendars.clone())
    }

    async fn events_matching(
        &self,
        predicate: &EventPredicate,
    ) -> Result<Vec<RawEvent>, BackendError> {
        self.check_read_failure()?;
        let events = self.events.lock().map_err(|_| poisoned())?;
        Ok(events
            .iter()
            .filter(|e| predicate.calendar_ids.contains(&e.calendar_id()))
            .filter(|e| overlaps(e, predicate))
            .cloned()
            .collect())
    }

    async fn event_by_id(&self, id: &str) -> Result<Option<RawEvent>, BackendError> {
        self.check_read_failure()?;
        let events = self.events.lock().map_err(|_| poisoned())?;
        Ok(events
            .iter()
            .find(|e| e.id() == id)
            .cloned())
    }

    async fn save_event(&self, event: &NewEventRecord) -> Result<Option<String>, BackendError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let mut next_id = self.next_id.lock().map_err(|_| poisoned())?;
        let id = format!("mock-event-{}", *next_id);
        *next_id += 1;

        let calendar_title = self.calendar_title(&event.calendar_identifier);
        let record = RawEvent(json!({
            "identifier": id,
            "title": event.title,
            "startDate": to_iso_millis(event.start_date),
            "endDate": to_iso_millis(event.end_date),
            "isAllDay": event.is_all_day,
            "location": event.location,
            "notes": event.notes,
            "calendar": { "title": calendar_title, "identifier": event.calendar_identifier },
        }));

        let mut events = self.events.lock().map_err(|_| poisoned())?;
        events.push(record);
        Ok(Some(id))
    }

    async fn remove_event(&self, id: &str) -> Result<bool, BackendError> {
        if self.refuse_removal.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut events = self.events.lock().map_err(|_| poisoned())?;
        let before = events.len();
        events.retain(|e| e.id() != id);
        Ok(events.len() < before)
    }
}
