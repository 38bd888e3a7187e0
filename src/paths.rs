//! Filesystem locations used by the server.
//!
//! Provides the ordered list of candidate policy files and the default
//! calendar log file location. Uses the [`dirs`] crate for platform-appropriate
//! directory resolution.
//!
//! # Environment Overrides
//!
//! - `APPLE_MCP_CONFIG_FILE`: explicit policy file, searched first
//! - `APPLE_MCP_CALENDAR_LOG_FILE`: overrides [`calendar_log_file`]

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit policy file.
pub const CONFIG_FILE_ENV: &str = "APPLE_MCP_CONFIG_FILE";

/// Environment variable naming the calendar operation log file.
pub const CALENDAR_LOG_FILE_ENV: &str = "APPLE_MCP_CALENDAR_LOG_FILE";

/// File name looked up in each candidate directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Where to look for the tool policy file.
///
/// Built from the process environment with [`ConfigSearch::from_env`], or
/// constructed directly in tests.
#[derive(Debug, Clone, Default)]
pub struct ConfigSearch {
    /// Explicit override path (takes precedence over everything else).
    pub explicit: Option<PathBuf>,
    /// Current working directory.
    pub cwd: Option<PathBuf>,
    /// Directory containing the running executable.
    pub install_dir: Option<PathBuf>,
    /// Platform config directory for this application.
    pub user_config_dir: Option<PathBuf>,
}

impl ConfigSearch {
    /// Capture the search roots from the current process.
    ///
    /// An empty or whitespace-only `APPLE_MCP_CONFIG_FILE` counts as unset.
    pub fn from_env() -> Self {
        let explicit = std::env::var(CONFIG_FILE_ENV)
            .ok()
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            explicit,
            cwd: std::env::current_dir().ok(),
            install_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
            user_config_dir: dirs::config_dir().map(|d| d.join("apple-mcp")),
        }
    }

    /// Replace the explicit override path.
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    /// Ordered, de-duplicated candidate files.
    ///
    /// Order: explicit override, `<cwd>/config.ini`, `<install>/../config.ini`,
    /// `<install>/config.ini`, `<user config dir>/config.ini`.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut raw = Vec::new();
        if let Some(ref explicit) = self.explicit {
            raw.push(self.absolutize(explicit));
        }
        if let Some(ref cwd) = self.cwd {
            raw.push(cwd.join(CONFIG_FILE_NAME));
        }
        if let Some(ref install) = self.install_dir {
            if let Some(parent) = install.parent() {
                raw.push(parent.join(CONFIG_FILE_NAME));
            }
            raw.push(install.join(CONFIG_FILE_NAME));
        }
        if let Some(ref user) = self.user_config_dir {
            raw.push(user.join(CONFIG_FILE_NAME));
        }
        dedupe_paths(raw)
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.cwd {
            Some(ref cwd) => cwd.join(path),
            None => path.to_path_buf(),
        }
    }
}

/// Remove repeated entries, keeping first occurrences.
///
/// Paths are compared after lexical normalization of `.` and `..` segments.
pub fn dedupe_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for candidate in paths {
        if candidate.as_os_str().is_empty() {
            continue;
        }
        let normalized = normalize_lexically(&candidate);
        if seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }
    out
}

fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Calendar operation log file.
///
/// `APPLE_MCP_CALENDAR_LOG_FILE` if set, otherwise `~/apple-mcp.out.log`.
/// Returns `None` only when no home directory can be determined.
#[must_use]
pub fn calendar_log_file() -> Option<PathBuf> {
    if let Some(override_path) = std::env::var_os(CALENDAR_LOG_FILE_ENV)
        && !override_path.is_empty()
    {
        return Some(PathBuf::from(override_path));
    }
    dirs::home_dir().map(|home| home.join("apple-mcp.out.log"))
}
