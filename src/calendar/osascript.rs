//! Calendar.app backend driven through JavaScript for Automation.
//!
//! Each backend call runs one `osascript -l JavaScript` process. The script
//! receives its arguments as a single JSON string in `argv[0]` and prints a
//! JSON document on stdout.
//!
//! Requires macOS and the Calendar automation permission for the host
//! process. Elsewhere every call fails with [`BackendError::Unavailable`].

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;

use super::store::{CalendarBackend, EventPredicate, NewEventRecord};
use super::types::{RawCalendar, RawEvent, to_iso_millis};
use crate::error::BackendError;

/// Default per-invocation timeout.
const OSASCRIPT_TIMEOUT_SECS: u64 = 30;

/// AppleEvent error raised when automation permission is missing.
const NOT_AUTHORIZED_CODE: &str = "-1743";

const ACCESS_SCRIPT: &str = r#"
function run(argv) {
  const app = Application("Calendar");
  app.calendars.length;
  return JSON.stringify(true);
}
"#;

const LIST_CALENDARS_SCRIPT: &str = r#"
function run(argv) {
  const app = Application("Calendar");
  const out = app.calendars().map(function (c) {
    return { title: c.name(), identifier: c.calendarIdentifier() };
  });
  return JSON.stringify(out);
}
"#;

const EVENTS_MATCHING_SCRIPT: &str = r#"
function describe(e, cal) {
  return {
    uid: e.uid(),
    summary: e.summary(),
    location: e.location(),
    notes: e.description(),
    startDate: e.startDate().toISOString(),
    endDate: e.endDate().toISOString(),
    alldayEvent: e.alldayEvent(),
    url: e.url(),
    calendar: { title: cal.name(), identifier: cal.calendarIdentifier() }
  };
}
function run(argv) {
  const args = JSON.parse(argv[0]);
  const app = Application("Calendar");
  const start = new Date(args.start);
  const end = new Date(args.end);
  const out = [];
  args.calendarIds.forEach(function (id) {
    app.calendars.whose({ calendarIdentifier: id })().forEach(function (cal) {
      cal.events.whose({
        _and: [{ startDate: { _lessThan: end } }, { endDate: { _greaterThan: start } }]
      })().forEach(function (e) { out.push(describe(e, cal)); });
    });
  });
  return JSON.stringify(out);
}
"#;

const EVENT_BY_ID_SCRIPT: &str = r#"
function run(argv) {
  const args = JSON.parse(argv[0]);
  const app = Application("Calendar");
  const calendars = app.calendars();
  for (let i = 0; i < calendars.length; i++) {
    const cal = calendars[i];
    const hits = cal.events.whose({ uid: args.id })();
    if (hits.length > 0) {
      const e = hits[0];
      return JSON.stringify({
        uid: e.uid(),
        summary: e.summary(),
        location: e.location(),
        notes: e.description(),
        startDate: e.startDate().toISOString(),
        endDate: e.endDate().toISOString(),
        alldayEvent: e.alldayEvent(),
        url: e.url(),
        calendar: { title: cal.name(), identifier: cal.calendarIdentifier() }
      });
    }
  }
  return JSON.stringify(null);
}
"#;

const SAVE_EVENT_SCRIPT: &str = r#"
function run(argv) {
  const args = JSON.parse(argv[0]);
  const app = Application("Calendar");
  const cal = app.calendars.whose({ calendarIdentifier: args.calendarIdentifier })()[0];
  if (!cal) { throw new Error("calendar " + args.calendarIdentifier + " not found"); }
  const props = {
    summary: args.title,
    startDate: new Date(args.startDate),
    endDate: new Date(args.endDate),
    alldayEvent: args.isAllDay
  };
  if (args.location) { props.location = args.location; }
  if (args.notes) { props.description = args.notes; }
  const event = app.Event(props);
  cal.events.push(event);
  return JSON.stringify(event.uid());
}
"#;

const REMOVE_EVENT_SCRIPT: &str = r#"
function run(argv) {
  const args = JSON.parse(argv[0]);
  const app = Application("Calendar");
  const calendars = app.calendars();
  for (let i = 0; i < calendars.length; i++) {
    const hits = calendars[i].events.whose({ uid: args.id })();
    if (hits.length > 0) {
      app.delete(hits[0]);
      return JSON.stringify(true);
    }
  }
  return JSON.stringify(false);
}
"#;

/// Backend that scripts Calendar.app through `osascript`.
#[derive(Debug, Clone)]
pub struct OsascriptBackend {
    program: PathBuf,
    timeout: Duration,
}

impl Default for OsascriptBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OsascriptBackend {
    /// Use `osascript` from `PATH` with the default timeout.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("osascript"),
            timeout: Duration::from_secs(OSASCRIPT_TIMEOUT_SECS),
        }
    }

    /// Override the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_script(&self, script: &str, args: &Value) -> Result<Value, BackendError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-l")
            .arg("JavaScript")
            .arg("-e")
            .arg(script)
            .arg(args.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::Unavailable(format!(
                    "{} not found; Calendar automation requires macOS",
                    self.program.display()
                )));
            }
            Ok(Err(e)) => {
                return Err(BackendError::Unavailable(format!(
                    "failed to spawn {}: {e}",
                    self.program.display()
                )));
            }
            Err(_) => {
                return Err(BackendError::Script(format!(
                    "osascript timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Map osascript stderr to a [`BackendError`].
fn classify_failure(stderr: &str) -> BackendError {
    let trimmed = stderr.trim();
    if trimmed.contains(NOT_AUTHORIZED_CODE) || trimmed.contains("Not authorized") {
        BackendError::AccessDenied
    } else {
        BackendError::Script(trimmed.to_owned())
    }
}

/// Decode the JSON document a script printed.
fn parse_output(stdout: &str) -> Result<Value, BackendError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed).map_err(|e| BackendError::Malformed(format!("{e}: {trimmed}")))
}

fn into_array(value: Value, what: &str) -> Result<Vec<Value>, BackendError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(BackendError::Malformed(format!(
            "expected {what} array, got {other}"
        ))),
    }
}

#[async_trait]
impl CalendarBackend for OsascriptBackend {
    async fn request_access(&self) -> Result<bool, BackendError> {
        match self.run_script(ACCESS_SCRIPT, &Value::Null).await {
            Ok(value) => Ok(value.as_bool().unwrap_or(true)),
            Err(BackendError::AccessDenied) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_calendars(&self) -> Result<Vec<RawCalendar>, BackendError> {
        let value = self.run_script(LIST_CALENDARS_SCRIPT, &Value::Null).await?;
        Ok(into_array(value, "calendar")?
            .into_iter()
            .map(RawCalendar)
            .collect())
    }

    async fn events_matching(
        &self,
        predicate: &EventPredicate,
    ) -> Result<Vec<RawEvent>, BackendError> {
        let args = json!({
            "start": to_iso_millis(predicate.start),
            "end": to_iso_millis(predicate.end),
            "calendarIds": predicate.calendar_ids,
        });
        let value = self.run_script(EVENTS_MATCHING_SCRIPT, &args).await?;
        Ok(into_array(value, "event")?
            .into_iter()
            .map(RawEvent)
            .collect())
    }

    async fn event_by_id(&self, id: &str) -> Result<Option<RawEvent>, BackendError> {
        let value = self.run_script(EVENT_BY_ID_SCRIPT, &json!({ "id": id })).await?;
        Ok(match value {
            Value::Null => None,
            other => Some(RawEvent(other)),
        })
    }

    async fn save_event(&self, event: &NewEventRecord) -> Result<Option<String>, BackendError> {
        let args = serde_json::to_value(event)
            .map_err(|e| BackendError::Malformed(format!("event encode failed: {e}")))?;
        let value = self.run_script(SAVE_EVENT_SCRIPT, &args).await?;
        Ok(match value {
            Value::String(id) if !id.is_empty() => Some(id),
            Value::Object(ref map) => map
                .get("id")
                .or_else(|| map.get("identifier"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => None,
        })
    }

    async fn remove_event(&self, id: &str) -> Result<bool, BackendError> {
        let value = self.run_script(REMOVE_EVENT_SCRIPT, &json!({ "id": id })).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn permission_errors_map_to_access_denied() {
        let stderr = "execution error: Error: Error: Not authorized to send Apple events to Calendar. (-1743)";
        assert!(matches!(classify_failure(stderr), BackendError::AccessDenied));
    }

    #[test]
    fn other_errors_keep_their_text() {
        match classify_failure("  execution error: boom (-2700)\n") {
            BackendError::Script(msg) => assert_eq!(msg, "execution error: boom (-2700)"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn output_parsing() {
        assert_eq!(parse_output("  \n").unwrap(), Value::Null);
        assert_eq!(parse_output("true\n").unwrap(), Value::Bool(true));
        let parsed = parse_output(r#"[{"title":"Work","identifier":"C1"}]"#).unwrap();
        let calendars = into_array(parsed, "calendar").unwrap();
        assert_eq!(RawCalendar(calendars[0].clone()).title(), "Work");
        assert!(matches!(
            parse_output("not json"),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn non_array_listing_is_malformed() {
        assert!(into_array(Value::Bool(true), "event").is_err());
        assert!(into_array(Value::Null, "event").unwrap().is_empty());
    }

    #[test]
    fn jxa_event_records_adapt_cleanly() {
        let raw = RawEvent(serde_json::json!({
            "uid": "ABC-123",
            "summary": "Review",
            "location": null,
            "notes": null,
            "startDate": "2025-03-01T09:00:00.000Z",
            "endDate": "2025-03-01T10:00:00.000Z",
            "alldayEvent": false,
            "url": null,
            "calendar": { "title": "🤖Bot", "identifier": "C2" }
        }));
        assert_eq!(raw.calendar_id(), "C2");
        let event = raw.into_event("");
        assert_eq!(event.id, "ABC-123");
        assert_eq!(event.title, "Review");
        assert_eq!(event.calendar_name, "🤖Bot");
        assert_eq!(event.location, None);
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let backend = OsascriptBackend {
            program: PathBuf::from("/nonexistent/osascript-for-tests"),
            timeout: Duration::from_secs(5),
        };
        assert!(matches!(
            backend.list_calendars().await,
            Err(BackendError::Unavailable(_))
        ));
    }
}
