//! Tool access policy.
//!
//! The policy layer decides which tools and operations are usable at all,
//! before any calendar code runs:
//!
//! - [`config`] loads the INI-style policy file into a [`ToolAccessConfig`]
//! - [`engine`] classifies operations as read/write and makes per-call
//!   [`Decision`]s
//! - [`schema`] trims advertised tool schemas so clients only see what the
//!   policy allows
//!
//! The config is loaded once at startup and shared read-only; decisions are
//! recomputed for every call.

pub mod config;
pub mod engine;
pub mod schema;

pub use config::ToolAccessConfig;
pub use engine::{
    AccessMode, Decision, KnownTool, ToolAccessRule, decision, operation_mode,
    summarize_tool_access,
};
pub use schema::{ObjectSchema, OperationProperty, SchemaBranch, ToolSchema, configure_tools};
