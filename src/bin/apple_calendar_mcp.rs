//! Apple Calendar MCP server binary.
//!
//! Serves the `calendar` tool over stdio (default) or streamable HTTP. All
//! tracing output goes to stderr so stdout stays a clean protocol channel.

use std::path::PathBuf;
use std::sync::Arc;

use calendar_mcp::calendar::{
    CalendarBackend, CalendarDispatcher, EnvLockSource, LockSource, MockCalendarBackend,
    OsascriptBackend,
};
use calendar_mcp::paths::{self, ConfigSearch};
use calendar_mcp::server::{self, CalendarServer, HttpOptions};
use calendar_mcp::{CalendarRouter, ToolAccessConfig, logging};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

/// Policy-gated MCP server for Apple Calendar.
#[derive(Parser)]
#[command(name = "apple-calendar-mcp", version, about)]
struct Cli {
    /// Transport to serve on.
    #[arg(long, env = "APPLE_MCP_TRANSPORT", value_enum, default_value_t = Transport::Stdio, ignore_case = true)]
    transport: Transport,

    /// HTTP bind host.
    #[arg(long, env = "APPLE_MCP_HTTP_HOST", default_value = "127.0.0.1")]
    host: String,

    /// HTTP bind port.
    #[arg(long, env = "APPLE_MCP_HTTP_PORT", default_value_t = 8787)]
    port: u16,

    /// HTTP endpoint path.
    #[arg(long, env = "APPLE_MCP_HTTP_PATH", default_value = "/mcp")]
    path: String,

    /// Tool policy file; overrides APPLE_MCP_CONFIG_FILE.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Calendar backend.
    #[arg(long, env = "APPLE_MCP_CALENDAR_BACKEND", value_enum, default_value_t = Backend::Osascript)]
    backend: Backend,

    /// Calendar operation log file (default: ~/apple-mcp.out.log).
    #[arg(long, env = "APPLE_MCP_CALENDAR_LOG_FILE")]
    calendar_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Calendar.app through osascript (macOS only).
    Osascript,
    /// In-memory calendars named after the lock variables.
    Mock,
}

fn build_backend(kind: Backend, lock_source: &dyn LockSource) -> Arc<dyn CalendarBackend> {
    match kind {
        Backend::Osascript => Arc::new(OsascriptBackend::new()),
        Backend::Mock => {
            let (incoming, outgoing) = lock_source.names();
            let mut calendars = Vec::new();
            if let Some(name) = incoming.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                calendars.push((name.to_owned(), "mock-incoming"));
            }
            if let Some(name) = outgoing.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                calendars.push((name.to_owned(), "mock-outgoing"));
            }
            let pairs: Vec<(&str, &str)> = calendars.iter().map(|(n, id)| (n.as_str(), *id)).collect();
            Arc::new(MockCalendarBackend::with_calendars(&pairs))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = cli.calendar_log.clone().or_else(paths::calendar_log_file);
    let _log_guard = logging::init(log_file.as_deref())?;

    let search = match cli.config {
        Some(ref path) => ConfigSearch::from_env().with_explicit(path),
        None => ConfigSearch::from_env(),
    };
    let config = ToolAccessConfig::load_from(&search);
    for warning in &config.warnings {
        warn!("Tool policy warning: {warning}");
    }
    info!(source = %config.source_label(), "tool policy loaded");

    let lock_source: Arc<dyn LockSource> = Arc::new(EnvLockSource);
    let backend = build_backend(cli.backend, lock_source.as_ref());
    let dispatcher = CalendarDispatcher::new(backend, lock_source);
    let router = CalendarRouter::new(Arc::new(config), dispatcher);
    let server = CalendarServer::new(router);

    info!(transport = ?cli.transport, backend = ?cli.backend, "starting Apple Calendar MCP server");
    let result = match cli.transport {
        Transport::Stdio => server::serve_stdio(server).await,
        Transport::Http => {
            let options = HttpOptions {
                host: cli.host,
                port: cli.port,
                path: cli.path,
            };
            server::serve_http(server, options).await
        }
    };

    result.map_err(|e| {
        tracing::error!(error = %e, "Failed to initialize Calendar MCP server");
        anyhow::anyhow!("apple-calendar-mcp failed: {e}")
    })?;

    info!("Apple Calendar MCP server shut down cleanly");
    Ok(())
}
