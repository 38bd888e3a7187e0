//! MCP server adapter and transports.
//!
//! [`CalendarServer`] exposes a [`CalendarRouter`] through rmcp's
//! [`ServerHandler`]. It can be served over stdio or over streamable HTTP
//! behind an origin check.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    model::*,
    service::{RequestContext, RoleServer},
};
use tracing::{info, warn};

use crate::policy::{ToolAccessConfig, ToolSchema, summarize_tool_access};
use crate::router::CalendarRouter;
use crate::tool::Envelope;

/// Human-readable server name reported during initialization.
pub const SERVER_NAME: &str = "Apple Calendar MCP";

/// Setting this to `1` disables the origin check.
pub const ALLOW_ANY_ORIGIN_ENV: &str = "APPLE_MCP_HTTP_ALLOW_ANY_ORIGIN";
/// Comma-separated list of accepted `Origin` values.
pub const ALLOWED_ORIGINS_ENV: &str = "APPLE_MCP_HTTP_ALLOWED_ORIGINS";

const INSTRUCTIONS_BASE: &[&str] = &[
    "Apple Calendar MCP exposes only calendar operations for Apple Calendar.",
    "Use operation=list for date-based availability and operation=search for keyword filtering.",
    "Use operation=delete with eventId to remove an event from the writable calendar.",
    "Calendar operations are locked to APPLE_MCP_CALENDAR_INCOMING (read) and APPLE_MCP_CALENDAR_OUTGOING (write).",
    "Use ISO 8601 dates (YYYY-MM-DD) or timestamps (YYYY-MM-DDTHH:mm:ssZ).",
    "Date/time values returned by tools use ISO 8601 UTC strings.",
    "Treat structured fields (events, event, calendars, counters) as source of truth.",
];

/// Transport startup or runtime failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The MCP session could not be initialized.
    #[error("failed to start MCP service: {0}")]
    Init(String),
    /// The service task ended abnormally.
    #[error("MCP service task failed: {0}")]
    Join(String),
    /// Socket bind or serve failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Instructions sent to clients: usage notes plus the active policy.
pub fn server_instructions(config: &ToolAccessConfig) -> String {
    let source = match &config.source_path {
        Some(path) => path.display().to_string(),
        None => "default policy (all tools enabled)".to_owned(),
    };
    let mut parts: Vec<String> = INSTRUCTIONS_BASE.iter().map(|s| (*s).to_owned()).collect();
    parts.push(format!("Tool policy source: {source}."));
    parts.push(format!("Active tool modes: {}.", summarize_tool_access(config)));
    parts.join(" ")
}

// ─── Handler ──────────────────────────────────────────────────────────────────

/// MCP handler for the calendar tool.
#[derive(Clone)]
pub struct CalendarServer {
    router: CalendarRouter,
    instructions: Arc<str>,
}

impl std::fmt::Debug for CalendarServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarServer").finish_non_exhaustive()
    }
}

impl CalendarServer {
    pub fn new(router: CalendarRouter) -> Self {
        let instructions = server_instructions(router.config()).into();
        Self {
            router,
            instructions,
        }
    }

    /// Tools advertised under the active policy.
    pub fn tools(&self) -> Vec<Tool> {
        self.router.tools().iter().map(to_mcp_tool).collect()
    }

    /// Run one call and convert the envelope into a protocol result.
    pub async fn call(&self, name: &str, arguments: Option<&JsonObject>) -> CallToolResult {
        to_call_result(self.router.handle_call(name, arguments).await)
    }
}

/// Convert a policy-pruned schema into an MCP tool description.
pub fn to_mcp_tool(schema: &ToolSchema) -> Tool {
    Tool {
        name: schema.name.clone().into(),
        title: schema.title.clone(),
        description: Some(schema.description.clone().into()),
        input_schema: Arc::new(schema.input_schema_json()),
        output_schema: schema.output_schema_json().map(Arc::new),
        annotations: None,
        icons: None,
        meta: None,
    }
}

/// The text goes out as content blocks and the whole envelope as structured
/// content.
pub fn to_call_result(envelope: Envelope) -> CallToolResult {
    let content = envelope
        .content
        .iter()
        .map(|block| Content::text(block.text.clone()))
        .collect();
    let mut result = CallToolResult::success(content);
    result.is_error = Some(envelope.is_error);
    result.structured_content = Some(envelope.to_json());
    result
}

impl ServerHandler for CalendarServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                ..Implementation::from_build_env()
            },
            instructions: Some(self.instructions.to_string()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self
            .call(request.name.as_ref(), request.arguments.as_ref())
            .await)
    }
}

// ─── Stdio ────────────────────────────────────────────────────────────────────

/// Serve over stdin/stdout until the client disconnects.
pub async fn serve_stdio(server: CalendarServer) -> Result<(), TransportError> {
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| TransportError::Init(e.to_string()))?;
    info!("Calendar MCP stdio transport initialized");
    service
        .waiting()
        .await
        .map_err(|e| TransportError::Join(e.to_string()))?;
    Ok(())
}

// ─── Streamable HTTP ──────────────────────────────────────────────────────────

/// Which browser origins may reach the HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    allow_any: bool,
    allowed: Vec<String>,
}

impl OriginPolicy {
    /// Loopback origins only, with or without `port`.
    pub fn loopback(port: u16) -> Self {
        let allowed = ["localhost", "127.0.0.1", "[::1]"]
            .iter()
            .flat_map(|host| [format!("http://{host}"), format!("http://{host}:{port}")])
            .collect();
        Self {
            allow_any: false,
            allowed,
        }
    }

    /// Exactly the listed origins.
    pub fn explicit(origins: impl IntoIterator<Item = String>) -> Self {
        Self {
            allow_any: false,
            allowed: origins.into_iter().collect(),
        }
    }

    /// Accept every origin.
    pub fn any() -> Self {
        Self {
            allow_any: true,
            allowed: Vec::new(),
        }
    }

    /// Build from `APPLE_MCP_HTTP_ALLOW_ANY_ORIGIN` and
    /// `APPLE_MCP_HTTP_ALLOWED_ORIGINS`, falling back to loopback.
    pub fn from_env(port: u16) -> Self {
        if std::env::var(ALLOW_ANY_ORIGIN_ENV).is_ok_and(|v| v == "1") {
            return Self::any();
        }
        let listed: Vec<String> = std::env::var(ALLOWED_ORIGINS_ENV)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        if listed.is_empty() {
            Self::loopback(port)
        } else {
            Self::explicit(listed)
        }
    }

    /// Requests without an `Origin`, or with `null`, are always allowed.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match origin {
            None | Some("") | Some("null") => true,
            Some(_) if self.allow_any => true,
            Some(origin) => self.allowed.iter().any(|a| a == origin),
        }
    }

    fn allows_header(&self, value: Option<&HeaderValue>) -> bool {
        match value {
            None => true,
            Some(value) => value.to_str().is_ok_and(|origin| self.allows(Some(origin))),
        }
    }
}

/// Where the HTTP transport listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8787,
            path: "/mcp".to_owned(),
        }
    }
}

impl HttpOptions {
    /// Endpoint path with exactly one leading slash.
    pub fn endpoint_path(&self) -> String {
        format!("/{}", self.path.trim().trim_start_matches('/'))
    }
}

async fn check_origin(
    State(policy): State<Arc<OriginPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN);
    if !policy.allows_header(origin) {
        warn!(origin = ?origin, "rejected request from forbidden origin");
        return (StatusCode::FORBIDDEN, "Forbidden origin").into_response();
    }
    next.run(request).await
}

/// Build the axum app that serves `server` at the configured path.
pub fn http_router(
    server: CalendarServer,
    options: &HttpOptions,
    origins: OriginPolicy,
) -> axum::Router {
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );
    let path = options.endpoint_path();
    let router = if path == "/" {
        axum::Router::new().fallback_service(service)
    } else {
        axum::Router::new().nest_service(&path, service)
    };
    router.layer(middleware::from_fn_with_state(Arc::new(origins), check_origin))
}

/// Serve streamable HTTP until Ctrl-C.
pub async fn serve_http(server: CalendarServer, options: HttpOptions) -> Result<(), TransportError> {
    let origins = OriginPolicy::from_env(options.port);
    let app = http_router(server, &options, origins);
    let listener = tokio::net::TcpListener::bind((options.host.as_str(), options.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!(
        "Streamable HTTP MCP server listening on http://{addr}{}",
        options.endpoint_path()
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::calendar::{CalendarDispatcher, MockCalendarBackend, StaticLockSource};
    use crate::policy::{KnownTool, ToolAccessRule};

    fn server(config: ToolAccessConfig) -> CalendarServer {
        let backend = MockCalendarBackend::with_calendars(&[("Work", "C1"), ("Bot", "C2")]);
        let dispatcher = CalendarDispatcher::new(
            Arc::new(backend),
            Arc::new(StaticLockSource::new("Work", "Bot")),
        );
        CalendarServer::new(CalendarRouter::new(Arc::new(config), dispatcher))
    }

    #[test]
    fn instructions_name_policy_source_and_modes() {
        let text = server_instructions(&ToolAccessConfig::defaults());
        assert!(text.starts_with("Apple Calendar MCP exposes only calendar operations"));
        assert!(text.contains("Tool policy source: default policy (all tools enabled)."));
        assert!(text.contains("Active tool modes: contacts=read+write,"));

        let mut config = ToolAccessConfig::defaults();
        config.source_path = Some(PathBuf::from("/etc/apple-mcp/config.ini"));
        assert!(server_instructions(&config).contains("Tool policy source: /etc/apple-mcp/config.ini."));
    }

    #[test]
    fn advertised_tool_follows_policy() {
        let tools = server(ToolAccessConfig::defaults()).tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "calendar");
        assert!(tools[0].output_schema.is_some());

        let mut config = ToolAccessConfig::defaults();
        config.tools.insert(
            KnownTool::Calendar,
            ToolAccessRule {
                enabled: false,
                read: true,
                write: true,
            },
        );
        assert!(server(config).tools().is_empty());
    }

    #[tokio::test]
    async fn call_result_carries_structured_envelope() {
        let srv = server(ToolAccessConfig::defaults());
        let args = json!({ "operation": "listCalendars" });
        let result = srv.call("calendar", args.as_object()).await;
        assert_eq!(result.is_error, Some(false));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["ok"], true);
        assert_eq!(structured["calendarsCount"], 2);
        assert_eq!(result.content.len(), 1);

        let unknown = srv.call("weather", None).await;
        assert_eq!(unknown.is_error, Some(true));
        assert!(unknown.structured_content.unwrap()["operation"].is_null());
    }

    #[test]
    fn loopback_origins() {
        let policy = OriginPolicy::loopback(8787);
        for ok in [
            None,
            Some("null"),
            Some("http://localhost"),
            Some("http://127.0.0.1:8787"),
            Some("http://[::1]:8787"),
        ] {
            assert!(policy.allows(ok), "{ok:?}");
        }
        assert!(!policy.allows(Some("http://localhost:3000")));
        assert!(!policy.allows(Some("https://evil.example")));
    }

    #[test]
    fn explicit_and_any_origins() {
        let policy = OriginPolicy::explicit(vec!["https://app.example".to_owned()]);
        assert!(policy.allows(Some("https://app.example")));
        assert!(!policy.allows(Some("http://localhost")));
        assert!(OriginPolicy::any().allows(Some("https://evil.example")));
    }

    #[test]
    fn undecodable_origin_header_is_rejected() {
        let policy = OriginPolicy::loopback(8787);
        let bad = HeaderValue::from_bytes(b"http://\xfflocalhost").unwrap();
        assert!(!policy.allows_header(Some(&bad)));
        assert!(policy.allows_header(None));
    }

    #[test]
    fn endpoint_path_normalization() {
        let mut options = HttpOptions::default();
        assert_eq!(options.endpoint_path(), "/mcp");
        options.path = "mcp".to_owned();
        assert_eq!(options.endpoint_path(), "/mcp");
        options.path = "/".to_owned();
        assert_eq!(options.endpoint_path(), "/");
    }
}
