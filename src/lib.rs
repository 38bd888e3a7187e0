//! Apple Calendar MCP: a policy-gated calendar tool for agent hosts.
//!
//! The crate serves a single `calendar` tool over the Model Context Protocol.
//! Every call flows through the same stages:
//!
//! - **Router** ([`router`]): decodes arguments, checks required fields
//! - **Policy** ([`policy`]): per-tool read/write switches from `config.ini`
//! - **Dispatcher** ([`calendar::dispatcher`]): runs the operation under the
//!   two-calendar lock (one readable incoming calendar, one writable outgoing)
//! - **Backend** ([`calendar::store`]): Calendar.app via `osascript`, or the
//!   in-memory mock
//!
//! Results always come back as an [`tool::Envelope`]; failures are envelopes
//! with `isError: true`, never protocol errors.

pub mod calendar;
pub mod error;
pub mod logging;
pub mod paths;
pub mod policy;
pub mod router;
pub mod server;
pub mod tool;

pub use calendar::{CalendarBackend, CalendarDispatcher, MockCalendarBackend, OsascriptBackend};
pub use error::{BackendError, CalendarError, Result};
pub use policy::ToolAccessConfig;
pub use router::CalendarRouter;
pub use server::CalendarServer;
pub use tool::{CalendarOperation, Envelope};
