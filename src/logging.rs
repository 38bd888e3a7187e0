//! Tracing subscriber setup.
//!
//! Everything goes to stderr so stdout stays a clean protocol channel. Events
//! with target `calendar` are also appended to the calendar operation log.

use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt};

use crate::calendar::dispatcher::LOG_TARGET;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the calendar log writer. A log file that cannot be
/// opened is reported on stderr and skipped.
pub fn init(calendar_log: Option<&Path>) -> Result<Option<WorkerGuard>, TryInitError> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    );

    let (file_layer, guard) = match calendar_log.and_then(open_calendar_log) {
        Some((writer, guard)) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(Targets::new().with_target(LOG_TARGET, Level::INFO));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}

fn open_calendar_log(
    path: &Path,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let file_name = path.file_name()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("calendar log disabled: cannot create {}: {e}", dir.display());
        return None;
    }
    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn calendar_log_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/apple-mcp.out.log");
        let opened = open_calendar_log(&path);
        assert!(opened.is_some());
        assert!(tmp.path().join("nested").is_dir());
    }

    #[test]
    fn path_without_file_name_is_skipped() {
        assert!(open_calendar_log(Path::new("/")).is_none());
    }
}
