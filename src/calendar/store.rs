//! The calendar backend seam.
//!
//! Implemented by [`OsascriptBackend`](super::osascript::OsascriptBackend)
//! for Calendar.app and by [`MockCalendarBackend`](super::mock_store::MockCalendarBackend)
//! for tests. The dispatcher only ever talks to `dyn CalendarBackend`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{RawCalendar, RawEvent};
use crate::error::BackendError;

/// Range query for [`CalendarBackend::events_matching`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPredicate {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Inclusive upper bound.
    pub end: DateTime<Utc>,
    /// Calendars to search; never empty.
    pub calendar_ids: Vec<String>,
}

/// An event to be saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEventRecord {
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_all_day: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Target calendar.
    pub calendar_identifier: String,
}

/// Native calendar capability.
///
/// Records come back loosely typed; the dispatcher adapts them.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Ask the OS for calendar access. `Ok(false)` means the user said no.
    async fn request_access(&self) -> Result<bool, BackendError>;

    /// Every event calendar the backend can see.
    async fn list_calendars(&self) -> Result<Vec<RawCalendar>, BackendError>;

    /// Events overlapping the predicate's range in its calendars.
    async fn events_matching(
        &self,
        predicate: &EventPredicate,
    ) -> Result<Vec<RawEvent>, BackendError>;

    /// Look up one event. `Ok(None)` when it does not exist.
    async fn event_by_id(&self, id: &str) -> Result<Option<RawEvent>, BackendError>;

    /// Persist a new event, returning the assigned identifier if the backend
    /// reports one.
    async fn save_event(&self, event: &NewEventRecord) -> Result<Option<String>, BackendError>;

    /// Remove an event. `Ok(false)` when the backend declined.
    async fn remove_event(&self, id: &str) -> Result<bool, BackendError>;
}
