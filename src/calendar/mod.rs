//! Apple Calendar access under the two-calendar lock.
//!
//! - [`store`]: the [`CalendarBackend`] trait
//! - [`osascript`]: Calendar.app through JXA
//! - [`mock_store`]: in-memory backend
//! - [`lock`]: incoming/outgoing calendar resolution
//! - [`dispatcher`]: the six calendar operations
//! - [`types`] and [`dates`]: values and argument parsing

pub mod dates;
pub mod dispatcher;
pub mod lock;
pub mod mock_store;
pub mod osascript;
pub mod store;
pub mod types;

pub use dispatcher::{
    CalendarDispatcher, CreateEventRequest, CreatedEvent, DeletedEvent, EventQuery, Outcome,
    Rejection, RejectionKind,
};
pub use lock::{CalendarLock, EnvLockSource, LockSource, StaticLockSource};
pub use mock_store::MockCalendarBackend;
pub use osascript::OsascriptBackend;
pub use store::{CalendarBackend, EventPredicate, NewEventRecord};
pub use types::{CalendarEvent, RawCalendar, RawEvent};
