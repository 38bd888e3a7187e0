//! The `calendar` tool: advertised schema, argument decoding and the
//! response envelope.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::calendar::{CalendarEvent, CreatedEvent};
use crate::error::CalendarError;
use crate::policy::{ObjectSchema, OperationProperty, ToolSchema};

/// Name of the only tool this server exposes.
pub const CALENDAR_TOOL_NAME: &str = "calendar";

// ─── Operations ───────────────────────────────────────────────────────────────

/// The operations multiplexed behind the `calendar` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalendarOperation {
    #[serde(rename = "search")]
    Search,
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "list")]
    List,
    #[serde(rename = "listCalendars")]
    ListCalendars,
    #[serde(rename = "create")]
    Create,
    #[serde(rename = "delete")]
    Delete,
}

impl CalendarOperation {
    /// All operations in advertised order.
    pub const ALL: [CalendarOperation; 6] = [
        CalendarOperation::Search,
        CalendarOperation::Open,
        CalendarOperation::List,
        CalendarOperation::ListCalendars,
        CalendarOperation::Create,
        CalendarOperation::Delete,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            CalendarOperation::Search => "search",
            CalendarOperation::Open => "open",
            CalendarOperation::List => "list",
            CalendarOperation::ListCalendars => "listCalendars",
            CalendarOperation::Create => "create",
            CalendarOperation::Delete => "delete",
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// Best-effort operation for error envelopes; unknown values map to
    /// [`CalendarOperation::Search`].
    pub fn coerce(value: Option<&Value>) -> Self {
        value
            .and_then(Value::as_str)
            .and_then(Self::parse)
            .unwrap_or(CalendarOperation::Search)
    }
}

impl fmt::Display for CalendarOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Arguments ────────────────────────────────────────────────────────────────

/// Decoded `calendar` tool arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarArgs {
    pub operation: CalendarOperation,
    pub search_text: Option<String>,
    pub event_id: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub limit: Option<f64>,
    pub title: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub is_all_day: bool,
    pub calendar_name: Option<String>,
}

impl CalendarArgs {
    /// Decode raw arguments.
    ///
    /// A missing object or an unrecognised `operation` is rejected outright.
    /// Non-numeric `limit` values are ignored; string fields must be strings
    /// when present.
    pub fn from_arguments(arguments: Option<&Map<String, Value>>) -> Result<Self, CalendarError> {
        let invalid = || CalendarError::Validation("Invalid arguments for calendar tool".to_owned());
        let args = arguments.ok_or_else(invalid)?;
        let operation = args
            .get("operation")
            .and_then(Value::as_str)
            .and_then(CalendarOperation::parse)
            .ok_or_else(invalid)?;

        Ok(Self {
            operation,
            search_text: string_field(args, "searchText")?,
            event_id: string_field(args, "eventId")?,
            from_date: string_field(args, "fromDate")?,
            to_date: string_field(args, "toDate")?,
            limit: args.get("limit").and_then(Value::as_f64),
            title: string_field(args, "title")?,
            start_date: string_field(args, "startDate")?,
            end_date: string_field(args, "endDate")?,
            location: string_field(args, "location")?,
            notes: string_field(args, "notes")?,
            is_all_day: args.get("isAllDay").and_then(Value::as_bool).unwrap_or(false),
            calendar_name: string_field(args, "calendarName")?,
        })
    }

    /// Required-field checks that run before policy and dispatch.
    pub fn validate(&self) -> Result<(), CalendarError> {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        match self.operation {
            CalendarOperation::Open | CalendarOperation::Delete if blank(&self.event_id) => Err(
                CalendarError::Validation("eventId is required for open/delete operations".into()),
            ),
            CalendarOperation::Create if blank(&self.title) => Err(CalendarError::Validation(
                "title is required for create operation".into(),
            )),
            CalendarOperation::Create if blank(&self.start_date) || blank(&self.end_date) => {
                Err(CalendarError::Validation(
                    "startDate and endDate are required for create operation".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

fn string_field(args: &Map<String, Value>, key: &str) -> Result<Option<String>, CalendarError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CalendarError::Validation(format!(
            "{key} must be a string when provided"
        ))),
    }
}

// ─── Envelope ─────────────────────────────────────────────────────────────────

/// One text content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl TextContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
        }
    }
}

/// The `event` field of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Found(CalendarEvent),
    Created(CreatedEvent),
}

/// Uniform result of every tool call.
///
/// `ok` always mirrors `!is_error`. The same fields are sent both as the
/// structured result and, for the text, as content blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub content: Vec<TextContent>,
    pub operation: Option<CalendarOperation>,
    pub ok: bool,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendars: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendars_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<CalendarEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_from_calendar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl Envelope {
    fn base(operation: Option<CalendarOperation>, ok: bool, text: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent::new(text)],
            operation,
            ok,
            is_error: !ok,
            calendars: None,
            calendars_count: None,
            events: None,
            events_count: None,
            event: None,
            deleted_event_id: None,
            deleted_from_calendar: None,
            tool: None,
        }
    }

    /// A successful result.
    pub fn success(operation: CalendarOperation, text: impl Into<String>) -> Self {
        Self::base(Some(operation), true, text)
    }

    /// A failed result.
    pub fn failure(operation: Option<CalendarOperation>, text: impl Into<String>) -> Self {
        Self::base(operation, false, text)
    }

    /// Tag the envelope with the tool name.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Attach calendar names and their count.
    pub fn with_calendars(mut self, calendars: Vec<String>) -> Self {
        self.calendars_count = Some(calendars.len());
        self.calendars = Some(calendars);
        self
    }

    /// Attach events and their count.
    pub fn with_events(mut self, events: Vec<CalendarEvent>) -> Self {
        self.events_count = Some(events.len());
        self.events = Some(events);
        self
    }

    /// Attach a single event.
    pub fn with_event(mut self, event: EventPayload) -> Self {
        self.event = Some(event);
        self
    }

    /// Attach the identity of a removed event.
    pub fn with_deleted(mut self, event_id: String, calendar: String) -> Self {
        self.deleted_event_id = Some(event_id);
        self.deleted_from_calendar = Some(calendar);
        self
    }

    /// The first text block.
    pub fn text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or_default()
    }

    /// Serialize to a JSON object.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            json!({
                "content": [{ "type": "text", "text": format!("failed to encode result: {e}") }],
                "operation": self.operation,
                "ok": false,
                "isError": true,
            })
        })
    }
}

// ─── Text rendering ───────────────────────────────────────────────────────────

/// Text block for `list` and `search` results.
pub fn format_events_text(operation: CalendarOperation, events: &[CalendarEvent]) -> String {
    let is_search = operation == CalendarOperation::Search;
    if events.is_empty() {
        return if is_search {
            "No matching events found.".to_owned()
        } else {
            "No events found.".to_owned()
        };
    }

    let header = if is_search {
        format!("Found {} matching events:", events.len())
    } else {
        format!("Found {} events:", events.len())
    };

    let mut lines = vec![header, String::new()];
    for event in events {
        lines.push(format!(
            "{} ({} - {})",
            event.title,
            event.start_date.as_deref().unwrap_or("N/A"),
            event.end_date.as_deref().unwrap_or("N/A"),
        ));
        lines.push(format!(
            "Location: {}",
            event.location.as_deref().unwrap_or("Not specified")
        ));
        lines.push(format!("Calendar: {}", event.calendar_name));
        lines.push(format!("ID: {}", event.id));
        lines.push(String::new());
    }
    lines.join("\n").trim_end().to_owned()
}

/// Text block for `listCalendars`.
pub fn format_calendars_text(calendars: &[String]) -> String {
    if calendars.is_empty() {
        return "No calendars available.".to_owned();
    }
    let bullets: Vec<String> = calendars.iter().map(|c| format!("- {c}")).collect();
    format!(
        "Available calendars ({}):\n\n{}",
        calendars.len(),
        bullets.join("\n")
    )
}

// ─── Schema ───────────────────────────────────────────────────────────────────

const DATE_HINT: &str = "in ISO 8601 format: YYYY-MM-DD or YYYY-MM-DDTHH:mm:ssZ";

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn operation_values() -> Vec<String> {
    CalendarOperation::ALL
        .iter()
        .map(|op| op.as_str().to_owned())
        .collect()
}

/// Advertised definition of the `calendar` tool, before policy pruning.
pub fn calendar_tool() -> ToolSchema {
    let input_properties = object(json!({
        "searchText": {
            "type": "string",
            "description": "Optional keyword filter for event titles, locations, and notes (search operation). For date-only queries, prefer operation='list' or leave this empty."
        },
        "eventId": {
            "type": "string",
            "description": "ID of the event to open/delete (required for open/delete operations)"
        },
        "limit": {
            "type": "integer",
            "description": "Number of events to retrieve (optional, default 10, max 50)",
            "minimum": 1,
            "maximum": 50
        },
        "fromDate": {
            "type": "string",
            "description": format!("Start date for search range {DATE_HINT}")
        },
        "toDate": {
            "type": "string",
            "description": format!("End date for search range {DATE_HINT}")
        },
        "title": {
            "type": "string",
            "description": "Title of the event to create (required for create operation)"
        },
        "startDate": {
            "type": "string",
            "description": format!("Event start date/time {DATE_HINT}")
        },
        "endDate": {
            "type": "string",
            "description": format!("Event end date/time {DATE_HINT}")
        },
        "location": {
            "type": "string",
            "description": "Location of the event (optional for create operation)"
        },
        "notes": {
            "type": "string",
            "description": "Additional notes for the event (optional for create operation)"
        },
        "isAllDay": {
            "type": "boolean",
            "description": "Whether the event is an all-day event (optional for create operation, default is false)"
        },
        "calendarName": {
            "type": "string",
            "description": "Name of the calendar to target (optional for list/search/create/delete; list/search use both allowed locked calendars if omitted, create/delete use outgoing calendar if omitted)"
        }
    }));

    let output_properties = object(json!({
        "ok": {
            "type": "boolean",
            "description": "Convenience success flag. Equivalent to !isError."
        },
        "isError": { "type": "boolean" },
        "content": {
            "type": "array",
            "items": { "type": "object", "additionalProperties": true }
        },
        "calendars": { "type": "array", "items": { "type": "string" } },
        "calendarsCount": { "type": "number" },
        "events": {
            "type": "array",
            "items": { "type": "object", "additionalProperties": true }
        },
        "eventsCount": { "type": "number" },
        "event": { "type": "object", "additionalProperties": true },
        "deletedEventId": { "type": "string" },
        "deletedFromCalendar": { "type": "string" }
    }));

    ToolSchema {
        name: CALENDAR_TOOL_NAME.to_owned(),
        title: Some("Apple Calendar".to_owned()),
        description: "Search, create, delete, and open calendar events in Apple Calendar app. \
            Use operation=list for date-range availability and operation=search for keyword \
            filtering. Calendar access is locked to incoming/outgoing calendars. Returned \
            startDate/endDate values are ISO 8601 UTC strings."
            .to_owned(),
        input: ObjectSchema {
            operation: Some(OperationProperty {
                description: Some(
                    "Operation to perform: 'search', 'open', 'list', 'listCalendars', 'create', \
                     or 'delete'. Use 'list' for date-only availability checks; use 'search' for \
                     keyword filtering."
                        .to_owned(),
                ),
                values: operation_values(),
            }),
            properties: input_properties,
            required: vec!["operation".to_owned()],
            additional_properties: false,
            branches: Vec::new(),
        },
        output: Some(ObjectSchema {
            operation: Some(OperationProperty {
                description: None,
                values: operation_values(),
            }),
            properties: output_properties,
            required: ["operation", "ok", "isError", "content"]
                .map(str::to_owned)
                .to_vec(),
            additional_properties: true,
            branches: Vec::new(),
        }),
    }
}
