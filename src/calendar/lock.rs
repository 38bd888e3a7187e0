//! The two-calendar lock.
//!
//! All calendar traffic is confined to an *incoming* (read) calendar and an
//! *outgoing* (write) calendar named by environment variables. The names are
//! read again on every call, so a changed environment takes effect without a
//! restart.

use std::collections::HashSet;

use super::types::RawCalendar;
use crate::error::{CalendarError, LockRole, Result};

/// Environment variable naming the read calendar.
pub const INCOMING_ENV: &str = "APPLE_MCP_CALENDAR_INCOMING";

/// Environment variable naming the write calendar.
pub const OUTGOING_ENV: &str = "APPLE_MCP_CALENDAR_OUTGOING";

/// Where the locked calendar names come from.
pub trait LockSource: Send + Sync {
    /// Raw `(incoming, outgoing)` names, untrimmed.
    fn names(&self) -> (Option<String>, Option<String>);
}

/// Reads [`INCOMING_ENV`] and [`OUTGOING_ENV`] from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvLockSource;

impl LockSource for EnvLockSource {
    fn names(&self) -> (Option<String>, Option<String>) {
        (
            std::env::var(INCOMING_ENV).ok(),
            std::env::var(OUTGOING_ENV).ok(),
        )
    }
}

/// Fixed names, for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct StaticLockSource {
    pub incoming: Option<String>,
    pub outgoing: Option<String>,
}

impl StaticLockSource {
    pub fn new(incoming: impl Into<String>, outgoing: impl Into<String>) -> Self {
        Self {
            incoming: Some(incoming.into()),
            outgoing: Some(outgoing.into()),
        }
    }

    /// No calendars configured.
    pub fn disabled() -> Self {
        Self::default()
    }
}

impl LockSource for StaticLockSource {
    fn names(&self) -> (Option<String>, Option<String>) {
        (self.incoming.clone(), self.outgoing.clone())
    }
}

/// Resolved lock names for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarLock {
    pub incoming: String,
    pub outgoing: String,
    /// Lowercased incoming and outgoing names.
    pub allowed_lower: HashSet<String>,
}

impl CalendarLock {
    /// Build from raw names. Fails closed when either is blank.
    pub fn new(incoming: &str, outgoing: &str) -> Result<Self> {
        let incoming = incoming.trim();
        let outgoing = outgoing.trim();
        if incoming.is_empty() || outgoing.is_empty() {
            return Err(CalendarError::LockDisabled {
                incoming_var: INCOMING_ENV,
                outgoing_var: OUTGOING_ENV,
            });
        }
        Ok(Self {
            incoming: incoming.to_owned(),
            outgoing: outgoing.to_owned(),
            allowed_lower: [incoming.to_lowercase(), outgoing.to_lowercase()].into(),
        })
    }

    /// Single-calendar mode: both names are the same calendar.
    pub fn is_single_calendar(&self) -> bool {
        self.incoming.to_lowercase() == self.outgoing.to_lowercase()
    }

    /// `true` when `name` (trimmed, any case) is the outgoing calendar.
    pub fn is_outgoing(&self, name: &str) -> bool {
        name.trim().to_lowercase() == self.outgoing.to_lowercase()
    }

    /// `true` when `name` (trimmed, any case) is either locked calendar.
    pub fn allows(&self, name: &str) -> bool {
        self.allowed_lower.contains(&name.trim().to_lowercase())
    }

    /// Reject names outside the lock.
    pub fn check_allowed(&self, requested: &str) -> Result<()> {
        if self.allows(requested) {
            Ok(())
        } else {
            Err(CalendarError::CalendarNotAllowed {
                requested: requested.to_owned(),
                incoming: self.incoming.clone(),
                outgoing: self.outgoing.clone(),
            })
        }
    }

    /// Message used when a write targets anything but the outgoing calendar.
    pub fn not_writable_message(&self, requested: &str) -> String {
        format!(
            "Calendar \"{requested}\" is not writable. Use outgoing calendar \"{}\".",
            self.outgoing
        )
    }
}

/// Read the lock from `source`.
pub fn resolve_lock(source: &dyn LockSource) -> Result<CalendarLock> {
    let (incoming, outgoing) = source.names();
    CalendarLock::new(
        incoming.as_deref().unwrap_or_default(),
        outgoing.as_deref().unwrap_or_default(),
    )
}

/// The backend calendars behind a [`CalendarLock`].
#[derive(Debug, Clone, PartialEq)]
pub struct LockedCalendars {
    pub incoming: RawCalendar,
    pub outgoing: RawCalendar,
}

impl LockedCalendars {
    /// Calendar that `name` refers to; the caller has already checked the lock.
    pub fn for_name(&self, lock: &CalendarLock, name: &str) -> &RawCalendar {
        if lock.is_outgoing(name) {
            &self.outgoing
        } else {
            &self.incoming
        }
    }
}

fn find_by_name<'a>(calendars: &'a [RawCalendar], name: &str) -> Option<&'a RawCalendar> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    calendars
        .iter()
        .find(|calendar| calendar.title().to_lowercase() == wanted)
}

/// Match the lock names against the backend's calendars, case-insensitively.
///
/// When both names are equal the same calendar is returned twice.
pub fn resolve_locked_calendars(
    calendars: &[RawCalendar],
    lock: &CalendarLock,
) -> Result<LockedCalendars> {
    let incoming = find_by_name(calendars, &lock.incoming).ok_or_else(|| {
        CalendarError::CalendarNotFound {
            role: LockRole::Incoming,
            name: lock.incoming.clone(),
        }
    })?;

    let outgoing = if lock.is_single_calendar() {
        incoming
    } else {
        find_by_name(calendars, &lock.outgoing).ok_or_else(|| CalendarError::CalendarNotFound {
            role: LockRole::Outgoing,
            name: lock.outgoing.clone(),
        })?
    };

    Ok(LockedCalendars {
        incoming: incoming.clone(),
        outgoing: outgoing.clone(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use serde_json::json;

    use super::*;

    fn cal(title: &str, id: &str) -> RawCalendar {
        RawCalendar(json!({ "title": title, "identifier": id }))
    }

    #[test]
    fn blank_names_disable_the_lock() {
        for (incoming, outgoing) in [
            (None, Some("Bot")),
            (Some("Work"), None),
            (Some("  "), Some("Bot")),
            (None, None),
        ] {
            let source = StaticLockSource {
                incoming: incoming.map(str::to_owned),
                outgoing: outgoing.map(str::to_owned),
            };
            let err = resolve_lock(&source).unwrap_err();
            assert_eq!(err.code(), "LOCK_DISABLED");
            assert!(err.to_string().contains(INCOMING_ENV));
            assert!(err.to_string().contains(OUTGOING_ENV));
        }
    }

    #[test]
    fn names_are_trimmed_and_lowercased() {
        let lock = resolve_lock(&StaticLockSource::new(" Work ", "🤖Bot")).unwrap();
        assert_eq!(lock.incoming, "Work");
        assert!(lock.allows("WORK"));
        assert!(lock.allows("🤖bot"));
        assert!(!lock.allows("Home"));
        assert!(lock.is_outgoing(" 🤖BOT "));
        assert!(!lock.is_outgoing("Work"));
    }

    #[test]
    fn not_allowed_names_both_calendars() {
        let lock = CalendarLock::new("Work", "Bot").unwrap();
        let err = lock.check_allowed("__NOT_ALLOWED__").unwrap_err();
        assert_eq!(err.code(), "CALENDAR_NOT_ALLOWED");
        let msg = err.to_string();
        assert!(msg.contains("not allowed"));
        assert!(msg.contains("\"Work\", \"Bot\""));
    }

    #[test]
    fn resolves_case_insensitively() {
        let calendars = vec![cal("work", "C1"), cal("BOT", "C2"), cal("Home", "C3")];
        let lock = CalendarLock::new("Work", "Bot").unwrap();
        let locked = resolve_locked_calendars(&calendars, &lock).unwrap();
        assert_eq!(locked.incoming.id(), "C1");
        assert_eq!(locked.outgoing.id(), "C2");
        assert_eq!(locked.for_name(&lock, "bot").id(), "C2");
        assert_eq!(locked.for_name(&lock, "WORK").id(), "C1");
    }

    #[test]
    fn single_calendar_mode_shares_one_calendar() {
        let calendars = vec![cal("Shared", "C1")];
        let lock = CalendarLock::new("Shared", "shared").unwrap();
        assert!(lock.is_single_calendar());
        let locked = resolve_locked_calendars(&calendars, &lock).unwrap();
        assert_eq!(locked.incoming, locked.outgoing);
    }

    #[test]
    fn missing_calendar_is_reported_by_role() {
        let calendars = vec![cal("Work", "C1")];
        let lock = CalendarLock::new("Work", "Bot").unwrap();
        let err = resolve_locked_calendars(&calendars, &lock).unwrap_err();
        assert_eq!(err.to_string(), "Outgoing calendar \"Bot\" not found.");
        assert!(err.is_lock_error());

        let lock = CalendarLock::new("Missing", "Work").unwrap();
        let err = resolve_locked_calendars(&calendars, &lock).unwrap_err();
        assert_eq!(err.to_string(), "Incoming calendar \"Missing\" not found.");
    }
}
