//! Error types for the calendar MCP server.
//!
//! Each [`CalendarError`] variant carries a stable error code
//! (SCREAMING_SNAKE_CASE) included in [`CalendarError::code()`]. The Display
//! output is the bare human-readable message, because it is shown verbatim to
//! the agent inside the response envelope.

/// Stable error codes for programmatic error handling.
///
/// These codes never change and form part of the public API contract.
pub mod error_codes {
    /// The incoming/outgoing calendar names are not configured.
    pub const LOCK_DISABLED: &str = "LOCK_DISABLED";

    /// A locked calendar name does not exist in the backend.
    pub const CALENDAR_NOT_FOUND: &str = "CALENDAR_NOT_FOUND";

    /// A requested calendar is outside the two locked calendars.
    pub const CALENDAR_NOT_ALLOWED: &str = "CALENDAR_NOT_ALLOWED";

    /// A date argument is not valid ISO-8601.
    pub const INVALID_DATE: &str = "INVALID_DATE";

    /// Any other malformed or missing argument.
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";

    /// The operating system refused calendar access.
    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";

    /// Unexpected failure from the calendar backend.
    pub const BACKEND_ERROR: &str = "BACKEND_ERROR";
}

/// Which side of the calendar lock a failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRole {
    /// The read calendar.
    Incoming,
    /// The write calendar.
    Outgoing,
}

impl std::fmt::Display for LockRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockRole::Incoming => f.write_str("Incoming"),
            LockRole::Outgoing => f.write_str("Outgoing"),
        }
    }
}

/// Failures reported by a [`CalendarBackend`](crate::calendar::CalendarBackend).
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The OS denied calendar access.
    #[error("Calendar access was denied. Ensure Calendar permissions are granted in System Settings.")]
    AccessDenied,

    /// The backend could not be reached at all (e.g. not running on macOS).
    #[error("calendar backend unavailable: {0}")]
    Unavailable(String),

    /// The automation script failed.
    #[error("calendar script failed: {0}")]
    Script(String),

    /// The backend answered with data that could not be decoded.
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

/// Errors produced by the calendar lock, the dispatcher and the router.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CalendarError {
    /// One or both lock environment variables are unset or empty.
    #[error("Calendar operations are disabled. Set {incoming_var} and {outgoing_var}.")]
    LockDisabled {
        /// Name of the incoming-calendar variable.
        incoming_var: &'static str,
        /// Name of the outgoing-calendar variable.
        outgoing_var: &'static str,
    },

    /// A locked calendar name did not match any backend calendar.
    #[error("{role} calendar \"{name}\" not found.")]
    CalendarNotFound {
        /// Which locked calendar is missing.
        role: LockRole,
        /// The configured display name.
        name: String,
    },

    /// A `calendarName` argument is outside the lock.
    #[error(
        "Calendar \"{requested}\" is not allowed. Allowed calendars: \"{incoming}\", \"{outgoing}\"."
    )]
    CalendarNotAllowed {
        /// The name the caller asked for.
        requested: String,
        /// Locked incoming name.
        incoming: String,
        /// Locked outgoing name.
        outgoing: String,
    },

    /// A date argument failed ISO-8601 validation.
    #[error("{field} must be ISO 8601 (YYYY-MM-DD or YYYY-MM-DDTHH:mm:ssZ). Received: \"{value}\"")]
    InvalidDate {
        /// Argument name, e.g. `fromDate`.
        field: &'static str,
        /// The rejected raw input.
        value: String,
    },

    /// Other argument validation failure.
    #[error("{0}")]
    Validation(String),

    /// The OS refused calendar access.
    #[error("{0}")]
    AccessDenied(String),

    /// Unexpected backend failure.
    #[error("{0}")]
    Backend(String),
}

impl CalendarError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LockDisabled { .. } => error_codes::LOCK_DISABLED,
            Self::CalendarNotFound { .. } => error_codes::CALENDAR_NOT_FOUND,
            Self::CalendarNotAllowed { .. } => error_codes::CALENDAR_NOT_ALLOWED,
            Self::InvalidDate { .. } => error_codes::INVALID_DATE,
            Self::Validation(_) => error_codes::VALIDATION_FAILED,
            Self::AccessDenied(_) => error_codes::ACCESS_DENIED,
            Self::Backend(_) => error_codes::BACKEND_ERROR,
        }
    }

    /// Whether this error comes from lock configuration or lock resolution.
    ///
    /// Lock errors are never degraded into empty results on read paths.
    pub fn is_lock_error(&self) -> bool {
        matches!(
            self,
            Self::LockDisabled { .. } | Self::CalendarNotFound { .. } | Self::CalendarNotAllowed { .. }
        )
    }

    /// Whether a read path may swallow this error and return no data.
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

impl From<BackendError> for CalendarError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::AccessDenied => CalendarError::AccessDenied(e.to_string()),
            other => CalendarError::Backend(other.to_string()),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CalendarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_disabled_message_names_both_variables() {
        let err = CalendarError::LockDisabled {
            incoming_var: "IN_VAR",
            outgoing_var: "OUT_VAR",
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Calendar operations are disabled"));
        assert!(msg.contains("IN_VAR"));
        assert!(msg.contains("OUT_VAR"));
        assert_eq!(err.code(), "LOCK_DISABLED");
    }

    #[test]
    fn not_found_message_names_role_and_calendar() {
        let err = CalendarError::CalendarNotFound {
            role: LockRole::Outgoing,
            name: "Bot".into(),
        };
        assert_eq!(err.to_string(), "Outgoing calendar \"Bot\" not found.");
    }

    #[test]
    fn not_allowed_lists_both_locked_names_verbatim() {
        let err = CalendarError::CalendarNotAllowed {
            requested: "Other".into(),
            incoming: "Work".into(),
            outgoing: "🤖Bot".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("not allowed"));
        assert!(msg.contains("\"Work\""));
        assert!(msg.contains("\"🤖Bot\""));
    }

    #[test]
    fn lock_classification_is_typed() {
        assert!(
            CalendarError::LockDisabled {
                incoming_var: "A",
                outgoing_var: "B"
            }
            .is_lock_error()
        );
        assert!(
            CalendarError::CalendarNotFound {
                role: LockRole::Incoming,
                name: "x".into()
            }
            .is_lock_error()
        );
        // Backend text that merely looks like a lock error is still a backend error.
        let backend = CalendarError::Backend("Incoming calendar exploded".into());
        assert!(!backend.is_lock_error());
        assert!(backend.is_degradable());
    }

    #[test]
    fn only_backend_errors_degrade() {
        assert!(
            !CalendarError::InvalidDate {
                field: "fromDate",
                value: "nope".into()
            }
            .is_degradable()
        );
        assert!(!CalendarError::AccessDenied("denied".into()).is_degradable());
        assert!(!CalendarError::Validation("bad".into()).is_degradable());
    }

    #[test]
    fn access_denied_backend_error_maps_to_access_denied() {
        let err: CalendarError = BackendError::AccessDenied.into();
        assert_eq!(err.code(), "ACCESS_DENIED");
        assert!(err.to_string().contains("Calendar access was denied"));

        let err: CalendarError = BackendError::Script("boom".into()).into();
        assert_eq!(err.code(), "BACKEND_ERROR");
    }

    #[test]
    fn all_codes_are_screaming_snake_case() {
        let errors = [
            CalendarError::LockDisabled {
                incoming_var: "A",
                outgoing_var: "B",
            },
            CalendarError::CalendarNotFound {
                role: LockRole::Incoming,
                name: "x".into(),
            },
            CalendarError::CalendarNotAllowed {
                requested: "x".into(),
                incoming: "a".into(),
                outgoing: "b".into(),
            },
            CalendarError::InvalidDate {
                field: "toDate",
                value: "x".into(),
            },
            CalendarError::Validation("x".into()),
            CalendarError::AccessDenied("x".into()),
            CalendarError::Backend("x".into()),
        ];
        for err in &errors {
            let code = err.code();
            assert!(
                code.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
                "code {code:?} is not SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CalendarError>();
        assert_send_sync::<BackendError>();
    }
}
