//! End-to-end calendar scenarios through the router, against the in-memory
//! backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use calendar_mcp::calendar::{
    CalendarDispatcher, LockSource, MockCalendarBackend, RawEvent, StaticLockSource,
};
use calendar_mcp::error::BackendError;
use calendar_mcp::{CalendarOperation, CalendarRouter, Envelope, ToolAccessConfig};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

// ─── Fixtures ─────────────────────────────────────────────────────────────────

struct Harness {
    backend: Arc<MockCalendarBackend>,
    router: CalendarRouter,
}

impl Harness {
    fn new(backend: MockCalendarBackend, lock: impl LockSource + 'static) -> Self {
        let backend = Arc::new(backend);
        let dispatcher = CalendarDispatcher::new(backend.clone(), Arc::new(lock));
        let router = CalendarRouter::new(Arc::new(ToolAccessConfig::defaults()), dispatcher);
        Self { backend, router }
    }

    fn standard() -> Self {
        Self::new(seeded_backend(), StaticLockSource::new("Work", "🤖Bot"))
    }

    async fn call(&self, args: Value) -> Envelope {
        self.router.handle_call("calendar", args.as_object()).await
    }
}

fn seeded_backend() -> MockCalendarBackend {
    let soon = Utc::now() + Duration::hours(1);
    MockCalendarBackend::with_calendars(&[("Work", "C1"), ("🤖Bot", "C2"), ("Family", "C3")])
        .with_simple_event("W1", "Design review", soon, soon + Duration::hours(1), "C1")
        .with_simple_event("B1", "Bot sync", soon + Duration::hours(2), soon + Duration::hours(3), "C2")
        .with_simple_event("F1", "Dinner", soon, soon + Duration::hours(2), "C3")
}

fn event_ids(env: &Envelope) -> Vec<String> {
    env.events
        .as_ref()
        .map(|events| events.iter().map(|e| e.id.clone()).collect())
        .unwrap_or_default()
}

// ─── Lock ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_covers_only_locked_calendars() {
    let h = Harness::standard();
    let env = h.call(json!({ "operation": "list" })).await;
    assert!(env.ok, "{}", env.text());
    let ids = event_ids(&env);
    assert_eq!(ids, vec!["W1", "B1"]);
    assert_eq!(env.events_count, Some(2));
}

#[tokio::test]
async fn list_rejects_calendar_outside_lock() {
    let h = Harness::standard();
    let env = h
        .call(json!({ "operation": "list", "calendarName": "__NOT_ALLOWED__" }))
        .await;
    assert!(env.is_error);
    assert_eq!(env.operation, Some(CalendarOperation::List));
    assert_eq!(
        env.text(),
        "Calendar \"__NOT_ALLOWED__\" is not allowed. Allowed calendars: \"Work\", \"🤖Bot\"."
    );
}

#[tokio::test]
async fn calendar_name_matches_case_insensitively() {
    let h = Harness::standard();
    let env = h.call(json!({ "operation": "list", "calendarName": "work" })).await;
    assert!(env.ok, "{}", env.text());
    assert_eq!(event_ids(&env), vec!["W1"]);
}

#[tokio::test]
async fn unset_lock_disables_every_operation() {
    let h = Harness::new(seeded_backend(), StaticLockSource::disabled());
    for args in [
        json!({ "operation": "listCalendars" }),
        json!({ "operation": "list" }),
        json!({ "operation": "search", "searchText": "sync" }),
        json!({ "operation": "open", "eventId": "W1" }),
    ] {
        let env = h.call(args).await;
        assert!(env.is_error);
        assert!(env.text().contains("Calendar operations are disabled"), "{}", env.text());
    }
}

#[tokio::test]
async fn missing_locked_calendar_is_reported() {
    let h = Harness::new(seeded_backend(), StaticLockSource::new("Work", "Archive"));
    let env = h.call(json!({ "operation": "listCalendars" })).await;
    assert!(env.is_error);
    assert!(env.text().contains("\"Archive\" not found"), "{}", env.text());
}

// ─── Reads ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_calendars_is_idempotent() {
    let h = Harness::standard();
    let first = h.call(json!({ "operation": "listCalendars" })).await;
    let second = h.call(json!({ "operation": "listCalendars" })).await;
    assert_eq!(first.to_json(), second.to_json());
    assert_eq!(first.calendars, Some(vec!["Work".to_owned(), "🤖Bot".to_owned()]));
}

#[tokio::test]
async fn search_filters_by_text() {
    let h = Harness::standard();
    let env = h
        .call(json!({ "operation": "search", "searchText": "REVIEW" }))
        .await;
    assert!(env.ok);
    assert_eq!(event_ids(&env), vec!["W1"]);
    assert!(env.text().starts_with("Found 1 matching events:"));

    let none = h.call(json!({ "operation": "search", "searchText": "dinner" })).await;
    assert!(none.ok);
    assert_eq!(none.text(), "No matching events found.");
}

#[tokio::test]
async fn invalid_date_is_an_error_not_an_empty_list() {
    let h = Harness::standard();
    let env = h
        .call(json!({ "operation": "list", "fromDate": "next tuesday" }))
        .await;
    assert!(env.is_error);
    assert!(env.text().starts_with("fromDate must be ISO 8601"));
}

#[tokio::test]
async fn non_ascii_date_is_an_error_envelope() {
    let h = Harness::standard();
    let env = h
        .call(json!({ "operation": "list", "fromDate": "2025-03-0éT10:00:00Z" }))
        .await;
    assert!(env.is_error);
    assert_eq!(env.operation, Some(CalendarOperation::List));
    assert!(env.text().starts_with("fromDate must be ISO 8601"), "{}", env.text());
}

#[tokio::test]
async fn backend_failure_degrades_reads_to_empty() {
    let h = Harness::standard();
    h.backend
        .set_read_failure(Some(BackendError::Script("boom".to_owned())));
    let env = h.call(json!({ "operation": "list" })).await;
    assert!(env.ok);
    assert_eq!(env.events_count, Some(0));
    assert_eq!(env.text(), "No events found.");
}

#[tokio::test]
async fn denied_access_is_surfaced() {
    let h = Harness::new(seeded_backend().deny_access(), StaticLockSource::new("Work", "🤖Bot"));
    let env = h.call(json!({ "operation": "list" })).await;
    assert!(env.is_error);
    assert!(env.text().contains("Calendar access was denied"));
}

#[tokio::test]
async fn open_refuses_events_outside_lock() {
    let h = Harness::standard();
    let found = h.call(json!({ "operation": "open", "eventId": "W1" })).await;
    assert!(found.ok);
    assert_eq!(found.text(), "Event found");
    assert_eq!(found.to_json()["event"]["title"], "Design review");

    let outside = h.call(json!({ "operation": "open", "eventId": "F1" })).await;
    assert!(outside.is_error);
    assert!(outside.text().starts_with("Error opening event: Event is not in allowed calendars"));

    let missing = h.call(json!({ "operation": "open", "eventId": "nope" })).await;
    assert_eq!(missing.text(), "Error opening event: Event not found");
}

// ─── Writes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_list_round_trip() {
    let h = Harness::standard();
    let start = Utc::now() + Duration::hours(4);
    let end = start + Duration::minutes(30);
    let created = h
        .call(json!({
            "operation": "create",
            "title": "  Retro  ",
            "startDate": start.to_rfc3339(),
            "endDate": end.to_rfc3339(),
            "location": "Room 4"
        }))
        .await;
    assert!(created.ok, "{}", created.text());
    assert_eq!(created.text(), "Event \"Retro\" created successfully.");
    let event = created.to_json()["event"].clone();
    assert_eq!(event["calendarName"], "🤖Bot");
    assert_eq!(event["location"], "Room 4");
    let id = event["id"].as_str().unwrap().to_owned();

    let listed = h
        .call(json!({ "operation": "list", "calendarName": "🤖Bot", "limit": 50 }))
        .await;
    assert!(event_ids(&listed).contains(&id));
}

#[tokio::test]
async fn create_rejects_inverted_range_without_saving() {
    let h = Harness::standard();
    let env = h
        .call(json!({
            "operation": "create",
            "title": "Backwards",
            "startDate": "2030-01-02T10:00:00Z",
            "endDate": "2030-01-02T09:00:00Z"
        }))
        .await;
    assert!(env.is_error);
    assert_eq!(env.text(), "Error creating event: End date must be after start date");
    assert_eq!(h.backend.save_calls(), 0);
}

#[tokio::test]
async fn create_refuses_incoming_calendar() {
    let h = Harness::standard();
    let env = h
        .call(json!({
            "operation": "create",
            "title": "Sneaky",
            "startDate": "2030-01-02T09:00:00Z",
            "endDate": "2030-01-02T10:00:00Z",
            "calendarName": "Work"
        }))
        .await;
    assert!(env.is_error);
    assert_eq!(
        env.text(),
        "Error creating event: Calendar \"Work\" is not writable. Use outgoing calendar \"🤖Bot\"."
    );
    assert_eq!(h.backend.save_calls(), 0);
}

#[tokio::test]
async fn delete_with_incoming_calendar_name_is_refused() {
    let h = Harness::standard();
    let env = h
        .call(json!({ "operation": "delete", "eventId": "B1", "calendarName": "Work" }))
        .await;
    assert!(env.is_error);
    assert!(env.text().contains("is not writable"));
    assert!(h.backend.events().iter().any(|e| e.0["identifier"] == "B1"));
}

#[tokio::test]
async fn delete_only_touches_outgoing_events() {
    let h = Harness::standard();
    let incoming = h.call(json!({ "operation": "delete", "eventId": "W1" })).await;
    assert!(incoming.is_error);
    assert_eq!(
        incoming.text(),
        "Error deleting event: Event is not in writable calendar \"🤖Bot\"."
    );

    let outgoing = h.call(json!({ "operation": "delete", "eventId": "B1" })).await;
    assert!(outgoing.ok, "{}", outgoing.text());
    assert_eq!(outgoing.deleted_event_id.as_deref(), Some("B1"));
    assert_eq!(outgoing.deleted_from_calendar.as_deref(), Some("🤖Bot"));
    assert!(!h.backend.events().iter().any(|e| e.0["identifier"] == "B1"));
}

#[tokio::test]
async fn same_titled_calendar_in_another_account_is_off_limits() {
    let soon = Utc::now() + Duration::hours(1);
    let backend =
        MockCalendarBackend::with_calendars(&[("Work", "C1"), ("🤖Bot", "C2"), ("🤖Bot", "C9")])
            .with_simple_event("X1", "Elsewhere", soon, soon + Duration::hours(1), "C9");
    let h = Harness::new(backend, StaticLockSource::new("Work", "🤖Bot"));

    let deleted = h.call(json!({ "operation": "delete", "eventId": "X1" })).await;
    assert!(deleted.is_error);
    assert_eq!(
        deleted.text(),
        "Error deleting event: Event is not in writable calendar \"🤖Bot\"."
    );
    assert!(h.backend.events().iter().any(|e| e.0["identifier"] == "X1"));

    let opened = h.call(json!({ "operation": "open", "eventId": "X1" })).await;
    assert!(opened.is_error);
    assert!(opened.text().starts_with("Error opening event: Event is not in allowed calendars"));

    let listed = h.call(json!({ "operation": "list" })).await;
    assert!(!event_ids(&listed).contains(&"X1".to_owned()));
}

#[tokio::test]
async fn refused_removal_reports_failure() {
    let h = Harness::new(
        seeded_backend().refuse_removal(),
        StaticLockSource::new("Work", "🤖Bot"),
    );
    let env = h.call(json!({ "operation": "delete", "eventId": "B1" })).await;
    assert!(env.is_error);
    assert_eq!(env.text(), "Error deleting event: Failed to delete event");
}

#[tokio::test]
async fn raw_records_without_dates_are_skipped() {
    let backend = seeded_backend().with_event(RawEvent(json!({
        "identifier": "U1",
        "title": "Undated",
        "calendar": { "title": "Work", "identifier": "C1" }
    })));
    let h = Harness::new(backend, StaticLockSource::new("Work", "🤖Bot"));
    let env = h.call(json!({ "operation": "list" })).await;
    assert!(env.ok);
    assert!(!event_ids(&env).contains(&"U1".to_owned()));
}
