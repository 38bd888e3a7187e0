//! Access decisions for tool calls.
//!
//! Every known tool has a fixed operation → [`AccessMode`] table. A call is
//! allowed only when the tool is enabled and the mode of the requested
//! operation is switched on in its [`ToolAccessRule`].

use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::ToolAccessConfig;

/// A tool name the policy file can configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownTool {
    /// Apple Contacts.
    Contacts,
    /// Apple Notes.
    Notes,
    /// Apple Messages.
    Messages,
    /// Apple Mail.
    Mail,
    /// Apple Reminders.
    Reminders,
    /// Apple Calendar.
    Calendar,
    /// Apple Maps.
    Maps,
}

impl KnownTool {
    /// Return all known tools in policy-file order.
    pub fn all() -> &'static [KnownTool] {
        &[
            KnownTool::Contacts,
            KnownTool::Notes,
            KnownTool::Messages,
            KnownTool::Mail,
            KnownTool::Reminders,
            KnownTool::Calendar,
            KnownTool::Maps,
        ]
    }

    /// Canonical lowercase name, as used in `[tool.<name>]` sections.
    pub fn as_str(self) -> &'static str {
        match self {
            KnownTool::Contacts => "contacts",
            KnownTool::Notes => "notes",
            KnownTool::Messages => "messages",
            KnownTool::Mail => "mail",
            KnownTool::Reminders => "reminders",
            KnownTool::Calendar => "calendar",
            KnownTool::Maps => "maps",
        }
    }

    /// Look up a tool by its exact advertised name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.as_str() == name)
    }

    /// Mode used when an operation is absent or not in the table.
    pub fn default_mode(self) -> AccessMode {
        AccessMode::Read
    }

    /// Fixed operation table. `None` means the operation is unmapped.
    pub fn operation_mode(self, operation: &str) -> Option<AccessMode> {
        use AccessMode::{Read, Write};

        let mode = match (self, operation) {
            (KnownTool::Notes, "search" | "list") => Read,
            (KnownTool::Notes, "create") => Write,

            (KnownTool::Messages, "read" | "unread") => Read,
            (KnownTool::Messages, "send" | "schedule") => Write,

            (KnownTool::Mail, "unread" | "search" | "mailboxes" | "accounts" | "latest") => Read,
            (KnownTool::Mail, "send") => Write,

            (KnownTool::Reminders, "list" | "search" | "open" | "listById") => Read,
            (KnownTool::Reminders, "create") => Write,

            (KnownTool::Calendar, "search" | "open" | "list" | "listCalendars") => Read,
            (KnownTool::Calendar, "create" | "delete") => Write,

            (KnownTool::Maps, "search" | "directions" | "listGuides") => Read,
            (KnownTool::Maps, "save" | "pin" | "addToGuide" | "createGuide") => Write,

            _ => return None,
        };
        Some(mode)
    }
}

impl fmt::Display for KnownTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an operation reads or mutates user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Reads data.
    Read,
    /// Creates, changes or deletes data.
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => f.write_str("read"),
            AccessMode::Write => f.write_str("write"),
        }
    }
}

/// Per-tool switches loaded from the policy file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAccessRule {
    /// Master switch for the tool.
    pub enabled: bool,
    /// Whether read operations are allowed.
    pub read: bool,
    /// Whether write operations are allowed.
    pub write: bool,
}

impl Default for ToolAccessRule {
    fn default() -> Self {
        Self {
            enabled: true,
            read: true,
            write: true,
        }
    }
}

/// Outcome of a policy check, computed fresh for every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Mode the operation was classified as.
    pub mode: AccessMode,
    /// Why the call was denied.
    pub reason: Option<String>,
}

impl Decision {
    fn allow(mode: AccessMode) -> Self {
        Self {
            allowed: true,
            mode,
            reason: None,
        }
    }

    fn deny(mode: AccessMode, reason: String) -> Self {
        Self {
            allowed: false,
            mode,
            reason: Some(reason),
        }
    }
}

/// Classify an operation for `tool`, falling back to the tool's default mode.
pub fn operation_mode(tool: KnownTool, operation: Option<&str>) -> AccessMode {
    operation
        .and_then(|op| tool.operation_mode(op))
        .unwrap_or_else(|| tool.default_mode())
}

/// Decide whether `operation` on `tool` is allowed under `config`.
///
/// Checks run in order: tool disabled, read disabled, write disabled.
pub fn decision(config: &ToolAccessConfig, tool: KnownTool, operation: Option<&str>) -> Decision {
    let rule = config.rule(tool);
    let mode = operation_mode(tool, operation);
    let source = config.source_label();

    if !rule.enabled {
        return Decision::deny(mode, format!("Tool \"{tool}\" is disabled by {source}."));
    }

    match mode {
        AccessMode::Read if !rule.read => Decision::deny(
            mode,
            format!("Read operations are disabled for tool \"{tool}\" by {source}."),
        ),
        AccessMode::Write if !rule.write => Decision::deny(
            mode,
            format!("Write operations are disabled for tool \"{tool}\" by {source}."),
        ),
        _ => Decision::allow(mode),
    }
}

/// One-line summary such as `contacts=read+write, calendar=read, maps=disabled`.
pub fn summarize_tool_access(config: &ToolAccessConfig) -> String {
    KnownTool::all()
        .iter()
        .map(|&tool| {
            let rule = config.rule(tool);
            let mut modes = Vec::new();
            if rule.read {
                modes.push("read");
            }
            if rule.write {
                modes.push("write");
            }
            if !rule.enabled || modes.is_empty() {
                format!("{tool}=disabled")
            } else {
                format!("{tool}={}", modes.join("+"))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
