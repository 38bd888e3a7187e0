//! Calendar operations over a [`CalendarBackend`].
//!
//! Every call starts from scratch: the lock is re-read, access is requested
//! and the locked calendars are resolved against the backend again. No
//! calendar identifiers are cached between calls.
//!
//! Failures come in three shapes:
//!
//! - `Err(CalendarError)` for lock problems, denied access, bad date
//!   arguments on read paths and hard backend failures on write paths
//! - [`Outcome::Rejected`] for domain answers such as "not found" or
//!   "not writable" on `open`/`create`/`delete`
//! - an empty result when a read path hits a degradable backend error

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::dates::{Bound, default_window, local_today, normalize_date_input, parse_date_input};
use super::lock::{CalendarLock, LockSource, LockedCalendars, resolve_lock, resolve_locked_calendars};
use super::store::{CalendarBackend, EventPredicate, NewEventRecord};
use super::types::{CalendarEvent, RawCalendar, RawEvent, to_iso_millis};
use crate::error::{BackendError, CalendarError, Result};

/// Upper bound on events returned by one call.
pub const MAX_EVENTS: usize = 50;

/// Event count used when the caller gives none.
pub const DEFAULT_LIMIT: usize = 10;

/// Target for records that also go to the calendar log file.
pub const LOG_TARGET: &str = "calendar";

/// Clamp a caller-supplied limit into `[1, MAX_EVENTS]`.
///
/// Missing or non-finite values give [`DEFAULT_LIMIT`]; fractions round down.
pub fn clamp_limit(limit: Option<f64>) -> usize {
    match limit {
        Some(value) if value.is_finite() => value.floor().clamp(1.0, MAX_EVENTS as f64) as usize,
        _ => DEFAULT_LIMIT,
    }
}

// ─── Requests and outcomes ────────────────────────────────────────────────────

/// Range arguments shared by `list` and `search`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    /// Requested maximum; clamped to `1..=MAX_EVENTS`, default `DEFAULT_LIMIT`.
    pub limit: Option<f64>,
    /// Range start, ISO 8601. A bare day starts at local midnight.
    pub from_date: Option<String>,
    /// Range end, ISO 8601. A bare day runs to 23:59:59.999 local.
    pub to_date: Option<String>,
    /// One locked calendar to read; both when absent or blank.
    pub calendar_name: Option<String>,
}

/// Arguments for `create`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateEventRequest {
    /// Trimmed before saving; must not be blank.
    pub title: String,
    /// Required, ISO 8601.
    pub start_date: Option<String>,
    /// Required, ISO 8601, strictly after `start_date`.
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub is_all_day: bool,
    /// Must name the outgoing calendar when given.
    pub calendar_name: Option<String>,
}

/// A saved event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    /// `None` when the backend did not report an identifier.
    pub id: Option<String>,
    pub title: String,
    /// UTC, millisecond precision.
    pub start_date: String,
    /// UTC, millisecond precision.
    pub end_date: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub is_all_day: bool,
    /// Title of the outgoing calendar the event was saved to.
    pub calendar_name: String,
}

/// A removed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedEvent {
    /// Identifier of the removed event, trimmed.
    pub event_id: String,
    /// Calendar the event was removed from.
    pub calendar_name: String,
}

/// Why an operation answered "no" without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Bad or missing arguments.
    Validation,
    /// No such event.
    NotFound,
    /// A write aimed at anything but the outgoing calendar.
    NotWritable,
    /// The event lives outside both locked calendars.
    NotInAllowedCalendars,
    /// The backend declined to carry out the change.
    BackendRefused,
}

/// A domain-level "no" with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    /// Shown to the caller after the operation's error prefix.
    pub message: String,
}

impl Rejection {
    fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of an operation that can be refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation went through.
    Done(T),
    /// Refused before or by the backend; nothing changed.
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    fn reject(kind: RejectionKind, message: impl Into<String>) -> Self {
        Outcome::Rejected(Rejection::new(kind, message))
    }

    /// `true` for [`Outcome::Done`].
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

/// Runs calendar operations against a backend under the calendar lock.
#[derive(Clone)]
pub struct CalendarDispatcher {
    backend: Arc<dyn CalendarBackend>,
    lock_source: Arc<dyn LockSource>,
}

impl CalendarDispatcher {
    /// Create a dispatcher over `backend`, reading lock names from `lock_source`.
    pub fn new(backend: Arc<dyn CalendarBackend>, lock_source: Arc<dyn LockSource>) -> Self {
        Self {
            backend,
            lock_source,
        }
    }

    async fn ensure_access(&self) -> Result<()> {
        if self.backend.request_access().await? {
            Ok(())
        } else {
            Err(BackendError::AccessDenied.into())
        }
    }

    async fn locked_calendars(&self, lock: &CalendarLock) -> Result<LockedCalendars> {
        let calendars = self.backend.list_calendars().await?;
        resolve_locked_calendars(&calendars, lock)
    }

    /// Names of the locked calendars, de-duplicated.
    pub async fn list_calendars(&self) -> Result<Vec<String>> {
        let result = self.list_calendars_inner().await;
        degrade("listCalendars", result)
    }

    async fn list_calendars_inner(&self) -> Result<Vec<String>> {
        let lock = resolve_lock(self.lock_source.as_ref())?;
        self.ensure_access().await?;
        info!(target: LOG_TARGET, operation = "listCalendars", "listCalendars start");

        let locked = self.locked_calendars(&lock).await?;
        let mut names: Vec<String> = Vec::with_capacity(2);
        for title in [locked.incoming.title(), locked.outgoing.title()] {
            if !title.is_empty() && !names.contains(&title) {
                names.push(title);
            }
        }

        info!(target: LOG_TARGET, operation = "listCalendars", count = names.len(), "listCalendars result");
        Ok(names)
    }

    /// Events in a date range, sorted by start and truncated to the limit.
    pub async fn get_events(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>> {
        let limit = clamp_limit(query.limit);
        let result = self.fetch_events(limit, query).await;
        degrade("getEvents", result)
    }

    async fn fetch_events(&self, limit: usize, query: &EventQuery) -> Result<Vec<CalendarEvent>> {
        let lock = resolve_lock(self.lock_source.as_ref())?;
        self.ensure_access().await?;

        let from = normalize_date_input(query.from_date.as_deref(), "fromDate")?;
        let to = normalize_date_input(query.to_date.as_deref(), "toDate")?;
        let (default_from, default_to) = default_window(local_today());
        let start = parse_date_input(&from.unwrap_or(default_from), "fromDate", Bound::Start)?;
        let end = parse_date_input(&to.unwrap_or(default_to), "toDate", Bound::End)?;

        let locked = self.locked_calendars(&lock).await?;
        let targets: Vec<&RawCalendar> = match non_blank(query.calendar_name.as_deref()) {
            Some(name) => {
                lock.check_allowed(name)?;
                vec![locked.for_name(&lock, name)]
            }
            None => vec![&locked.incoming, &locked.outgoing],
        };

        let calendar_ids = unique_non_empty(targets.iter().map(|c| c.id()));
        if calendar_ids.is_empty() {
            return Err(CalendarError::Backend(format!(
                "Unable to resolve calendar identifiers for \"{}\" and \"{}\".",
                lock.incoming, lock.outgoing
            )));
        }
        let calendar_names = unique_non_empty(targets.iter().map(|c| c.title()));
        let fallback = calendar_names.first().map(String::as_str).unwrap_or("Calendar");

        info!(
            target: LOG_TARGET,
            operation = "getEvents",
            limit,
            from_date = %to_iso_millis(start),
            to_date = %to_iso_millis(end),
            calendars = ?calendar_names,
            "getEvents start"
        );

        let predicate = EventPredicate {
            start,
            end,
            calendar_ids,
        };
        let raw = self.backend.events_matching(&predicate).await?;

        let mut events: Vec<CalendarEvent> = raw
            .into_iter()
            .map(|event| event.into_event(fallback))
            .filter(CalendarEvent::has_range)
            .collect();
        events.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        events.truncate(limit);

        info!(target: LOG_TARGET, operation = "getEvents", count = events.len(), "getEvents result");
        Ok(events)
    }

    /// Case-insensitive substring search over title, location and notes.
    ///
    /// Scans up to [`MAX_EVENTS`] events from the range before filtering. A
    /// blank query returns the range unfiltered.
    pub async fn search_events(
        &self,
        search_text: &str,
        query: &EventQuery,
    ) -> Result<Vec<CalendarEvent>> {
        let limit = clamp_limit(query.limit);
        let wide = EventQuery {
            limit: Some(MAX_EVENTS as f64),
            ..query.clone()
        };
        let events = self.get_events(&wide).await?;
        let total = events.len();

        let needle = search_text.trim().to_lowercase();
        let matched: Vec<CalendarEvent> = if needle.is_empty() {
            events.into_iter().take(limit).collect()
        } else {
            events
                .into_iter()
                .filter(|event| event.search_haystack().contains(&needle))
                .take(limit)
                .collect()
        };

        info!(
            target: LOG_TARGET,
            operation = "searchEvents",
            search_text = %search_text.trim(),
            total,
            matched = matched.len(),
            "searchEvents result"
        );
        Ok(matched)
    }

    /// Fetch one event, provided it lives in a locked calendar.
    pub async fn open_event(&self, event_id: &str) -> Result<Outcome<CalendarEvent>> {
        let lock = resolve_lock(self.lock_source.as_ref())?;
        self.ensure_access().await?;
        info!(target: LOG_TARGET, operation = "openEvent", event_id, "openEvent start");

        let Some(event) = self.backend.event_by_id(event_id).await? else {
            info!(target: LOG_TARGET, operation = "openEvent", event_id, success = false, "openEvent result");
            return Ok(Outcome::reject(RejectionKind::NotFound, "Event not found"));
        };

        let locked = self.locked_calendars(&lock).await?;
        let event_calendar_name = event.calendar_name();
        if !event_in_calendar(&event, &locked.incoming, &lock.incoming)
            && !event_in_calendar(&event, &locked.outgoing, &lock.outgoing)
        {
            info!(target: LOG_TARGET, operation = "openEvent", event_id, "openEvent denied");
            return Ok(Outcome::reject(
                RejectionKind::NotInAllowedCalendars,
                format!(
                    "Event is not in allowed calendars (\"{}\", \"{}\").",
                    lock.incoming, lock.outgoing
                ),
            ));
        }

        info!(target: LOG_TARGET, operation = "openEvent", event_id, success = true, "openEvent result");
        Ok(Outcome::Done(event.into_event(&event_calendar_name)))
    }

    /// Save a new event in the outgoing calendar.
    ///
    /// Argument problems come back as [`RejectionKind::Validation`] and never
    /// reach the backend.
    pub async fn create_event(&self, request: &CreateEventRequest) -> Result<Outcome<CreatedEvent>> {
        let lock = resolve_lock(self.lock_source.as_ref())?;
        self.ensure_access().await?;

        let title = request.title.trim();
        if title.is_empty() {
            return Ok(Outcome::reject(
                RejectionKind::Validation,
                "Event title cannot be empty",
            ));
        }

        let (start, end) = match parse_create_range(request) {
            Ok(range) => range,
            Err(rejection) => return Ok(Outcome::Rejected(rejection)),
        };

        let locked = self.locked_calendars(&lock).await?;
        if let Some(name) = non_blank(request.calendar_name.as_deref())
            && !lock.is_outgoing(name)
        {
            return Ok(Outcome::reject(
                RejectionKind::NotWritable,
                lock.not_writable_message(name),
            ));
        }

        let target = &locked.outgoing;
        let calendar_name = target.title();
        info!(
            target: LOG_TARGET,
            operation = "createEvent",
            title,
            start_date = %to_iso_millis(start),
            end_date = %to_iso_millis(end),
            calendar = %calendar_name,
            "createEvent start"
        );

        let record = NewEventRecord {
            title: title.to_owned(),
            start_date: start,
            end_date: end,
            is_all_day: request.is_all_day,
            location: non_blank(request.location.as_deref()).map(str::to_owned),
            notes: non_blank(request.notes.as_deref()).map(str::to_owned),
            calendar_identifier: target.id(),
        };
        let id = self.backend.save_event(&record).await?;

        info!(target: LOG_TARGET, operation = "createEvent", success = true, event_id = ?id, "createEvent result");
        Ok(Outcome::Done(CreatedEvent {
            id,
            title: record.title,
            start_date: to_iso_millis(start),
            end_date: to_iso_millis(end),
            location: record.location,
            notes: record.notes,
            is_all_day: record.is_all_day,
            calendar_name: if calendar_name.is_empty() {
                lock.outgoing.clone()
            } else {
                calendar_name
            },
        }))
    }

    /// Remove an event from the outgoing calendar.
    ///
    /// A `calendar_name` other than the outgoing calendar is refused before
    /// the backend is asked about the event.
    pub async fn delete_event(
        &self,
        event_id: &str,
        calendar_name: Option<&str>,
    ) -> Result<Outcome<DeletedEvent>> {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return Ok(Outcome::reject(
                RejectionKind::Validation,
                "eventId is required for delete operation",
            ));
        }

        let lock = resolve_lock(self.lock_source.as_ref())?;
        if let Some(name) = non_blank(calendar_name)
            && !lock.is_outgoing(name)
        {
            debug!(target: LOG_TARGET, operation = "deleteEvent", calendar = name, "write to non-outgoing calendar refused");
            return Ok(Outcome::reject(
                RejectionKind::NotWritable,
                lock.not_writable_message(name),
            ));
        }

        self.ensure_access().await?;
        let locked = self.locked_calendars(&lock).await?;
        info!(target: LOG_TARGET, operation = "deleteEvent", event_id, calendar = %lock.outgoing, "deleteEvent start");

        let Some(event) = self.backend.event_by_id(event_id).await? else {
            info!(target: LOG_TARGET, operation = "deleteEvent", event_id, success = false, "deleteEvent result");
            return Ok(Outcome::reject(RejectionKind::NotFound, "Event not found"));
        };

        let event_calendar_name = event.calendar_name();
        if !event_in_calendar(&event, &locked.outgoing, &lock.outgoing) {
            info!(
                target: LOG_TARGET,
                operation = "deleteEvent",
                event_id,
                calendar = %event_calendar_name,
                "deleteEvent denied"
            );
            return Ok(Outcome::reject(
                RejectionKind::NotWritable,
                format!("Event is not in writable calendar \"{}\".", lock.outgoing),
            ));
        }

        if !self.backend.remove_event(event_id).await? {
            warn!(target: LOG_TARGET, operation = "deleteEvent", event_id, "backend declined removal");
            return Ok(Outcome::reject(
                RejectionKind::BackendRefused,
                "Failed to delete event",
            ));
        }

        let deleted_from = if event_calendar_name.is_empty() {
            lock.outgoing.clone()
        } else {
            event_calendar_name
        };
        info!(
            target: LOG_TARGET,
            operation = "deleteEvent",
            event_id,
            success = true,
            calendar = %deleted_from,
            "deleteEvent result"
        );
        Ok(Outcome::Done(DeletedEvent {
            event_id: event_id.to_owned(),
            calendar_name: deleted_from,
        }))
    }
}

fn parse_create_range(
    request: &CreateEventRequest,
) -> std::result::Result<(DateTime<Utc>, DateTime<Utc>), Rejection> {
    let invalid = |e: CalendarError| Rejection::new(RejectionKind::Validation, e.to_string());

    let start_raw = normalize_date_input(request.start_date.as_deref(), "startDate").map_err(invalid)?;
    let end_raw = normalize_date_input(request.end_date.as_deref(), "endDate").map_err(invalid)?;
    let (Some(start_raw), Some(end_raw)) = (start_raw, end_raw) else {
        return Err(Rejection::new(
            RejectionKind::Validation,
            "Start date and end date are required",
        ));
    };

    let start = parse_date_input(&start_raw, "startDate", Bound::Start).map_err(invalid)?;
    let end = parse_date_input(&end_raw, "endDate", Bound::Start).map_err(invalid)?;
    if end <= start {
        return Err(Rejection::new(
            RejectionKind::Validation,
            "End date must be after start date",
        ));
    }
    Ok((start, end))
}

/// Swallow degradable errors into an empty result.
fn degrade<T: Default>(operation: &'static str, result: Result<T>) -> Result<T> {
    match result {
        Err(e) if e.is_degradable() => {
            warn!(target: LOG_TARGET, operation, error = %e, "{operation} error; returning empty result");
            Ok(T::default())
        }
        Err(e) => {
            warn!(target: LOG_TARGET, operation, code = e.code(), error = %e, "{operation} error");
            Err(e)
        }
        ok => ok,
    }
}

/// Whether `event` lives in `calendar`, configured as `lock_name`.
///
/// Identifiers decide whenever both sides carry one, since titles can repeat
/// across accounts. The title is compared only when an identifier is missing.
fn event_in_calendar(event: &RawEvent, calendar: &RawCalendar, lock_name: &str) -> bool {
    let event_calendar_id = event.calendar_id();
    let calendar_id = calendar.id();
    if !event_calendar_id.is_empty() && !calendar_id.is_empty() {
        return event_calendar_id == calendar_id;
    }
    let event_calendar_name = event.calendar_name();
    !event_calendar_name.is_empty() && event_calendar_name.to_lowercase() == lock_name.to_lowercase()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

fn unique_non_empty(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
