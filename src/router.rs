//! Routes tool calls through policy and into the dispatcher.
//!
//! [`CalendarRouter::handle_call`] never fails: every problem, from an
//! unknown tool name to a backend crash, comes back as an [`Envelope`] with
//! `isError: true`.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{Instrument, debug, warn};

use crate::calendar::{CalendarDispatcher, CreateEventRequest, EventQuery, Outcome};
use crate::error::CalendarError;
use crate::policy::{KnownTool, ToolAccessConfig, ToolSchema, configure_tools, decision};
use crate::tool::{
    CALENDAR_TOOL_NAME, CalendarArgs, CalendarOperation, Envelope, EventPayload, calendar_tool,
    format_calendars_text, format_events_text,
};

/// Span wrapped around every tool call.
pub const SPAN_TOOL_CALL: &str = "calendar.tool.call";

/// Policy-aware front door for tool calls.
#[derive(Clone)]
pub struct CalendarRouter {
    config: Arc<ToolAccessConfig>,
    dispatcher: CalendarDispatcher,
    tools: Vec<ToolSchema>,
}

impl CalendarRouter {
    /// Build a router; the advertised tools are pruned against `config` once.
    pub fn new(config: Arc<ToolAccessConfig>, dispatcher: CalendarDispatcher) -> Self {
        let tools = configure_tools(&[calendar_tool()], &config);
        Self {
            config,
            dispatcher,
            tools,
        }
    }

    /// Tools visible under the current policy.
    pub fn tools(&self) -> &[ToolSchema] {
        &self.tools
    }

    /// The policy this router enforces.
    pub fn config(&self) -> &ToolAccessConfig {
        &self.config
    }

    /// Handle one `tools/call`.
    pub async fn handle_call(&self, name: &str, arguments: Option<&Map<String, Value>>) -> Envelope {
        let requested_op: &str = arguments
            .and_then(|a| a.get("operation"))
            .and_then(|op| op.as_str())
            .unwrap_or_default();
        let span = tracing::info_span!(SPAN_TOOL_CALL, tool = name, operation = requested_op);
        self.route(name, arguments).instrument(span).await
    }

    async fn route(&self, name: &str, arguments: Option<&Map<String, Value>>) -> Envelope {
        if name != CALENDAR_TOOL_NAME {
            debug!("unknown tool requested");
            return Envelope::failure(
                None,
                format!("Unknown tool: {name}. This server only exposes \"calendar\"."),
            )
            .with_tool(name);
        }

        let coerced = CalendarOperation::coerce(arguments.and_then(|a| a.get("operation")));
        let args = match CalendarArgs::from_arguments(arguments).and_then(|args| {
            args.validate()?;
            Ok(args)
        }) {
            Ok(args) => args,
            Err(e) => return thrown(name, coerced, &e),
        };

        if let Some(tool) = KnownTool::from_name(name) {
            let verdict = decision(&self.config, tool, Some(args.operation.as_str()));
            if !verdict.allowed {
                let reason = verdict
                    .reason
                    .unwrap_or_else(|| format!("Tool \"{name}\" is blocked by policy."));
                debug!(mode = %verdict.mode, %reason, "call denied by policy");
                return Envelope::failure(Some(args.operation), reason).with_tool(name);
            }
        }

        match self.dispatch(&args).await {
            Ok(envelope) => envelope,
            Err(e) => thrown(name, args.operation, &e),
        }
    }

    async fn dispatch(&self, args: &CalendarArgs) -> Result<Envelope, CalendarError> {
        let op = args.operation;
        let query = EventQuery {
            limit: args.limit,
            from_date: args.from_date.clone(),
            to_date: args.to_date.clone(),
            calendar_name: args.calendar_name.clone(),
        };

        let envelope = match op {
            CalendarOperation::ListCalendars => {
                let calendars = self.dispatcher.list_calendars().await?;
                Envelope::success(op, format_calendars_text(&calendars)).with_calendars(calendars)
            }
            CalendarOperation::List => {
                let events = self.dispatcher.get_events(&query).await?;
                Envelope::success(op, format_events_text(op, &events)).with_events(events)
            }
            CalendarOperation::Search => {
                let text = args.search_text.as_deref().unwrap_or_default();
                let events = self.dispatcher.search_events(text, &query).await?;
                Envelope::success(op, format_events_text(op, &events)).with_events(events)
            }
            CalendarOperation::Open => {
                let event_id = args.event_id.as_deref().unwrap_or_default();
                match self.dispatcher.open_event(event_id).await {
                    Ok(Outcome::Done(event)) => Envelope::success(op, "Event found")
                        .with_event(EventPayload::Found(event)),
                    Ok(Outcome::Rejected(r)) => {
                        Envelope::failure(Some(op), format!("Error opening event: {}", r.message))
                    }
                    Err(e) => Envelope::failure(Some(op), format!("Error opening event: {e}")),
                }
            }
            CalendarOperation::Create => {
                let request = CreateEventRequest {
                    title: args.title.clone().unwrap_or_default(),
                    start_date: args.start_date.clone(),
                    end_date: args.end_date.clone(),
                    location: args.location.clone(),
                    notes: args.notes.clone(),
                    is_all_day: args.is_all_day,
                    calendar_name: args.calendar_name.clone(),
                };
                match self.dispatcher.create_event(&request).await {
                    Ok(Outcome::Done(created)) => Envelope::success(
                        op,
                        format!("Event \"{}\" created successfully.", created.title),
                    )
                    .with_event(EventPayload::Created(created)),
                    Ok(Outcome::Rejected(r)) => {
                        Envelope::failure(Some(op), format!("Error creating event: {}", r.message))
                    }
                    Err(e) => Envelope::failure(Some(op), format!("Error creating event: {e}")),
                }
            }
            CalendarOperation::Delete => {
                let event_id = args.event_id.as_deref().unwrap_or_default();
                match self
                    .dispatcher
                    .delete_event(event_id, args.calendar_name.as_deref())
                    .await
                {
                    Ok(Outcome::Done(deleted)) => Envelope::success(op, "Event deleted successfully.")
                        .with_deleted(deleted.event_id, deleted.calendar_name),
                    Ok(Outcome::Rejected(r)) => {
                        Envelope::failure(Some(op), format!("Error deleting event: {}", r.message))
                    }
                    Err(e) => Envelope::failure(Some(op), format!("Error deleting event: {e}")),
                }
            }
        };
        Ok(envelope)
    }
}

/// Envelope for an error that escaped the operation itself.
fn thrown(tool: &str, operation: CalendarOperation, error: &CalendarError) -> Envelope {
    warn!(code = error.code(), error = %error, "calendar call failed");
    Envelope::failure(Some(operation), error.to_string()).with_tool(tool)
}
