//! MCP server core: lifecycle, read loop and method dispatch.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start──▶ Starting ──▶ Running ──stop──▶ Stopping ──▶ Stopped
//!                                    │                  ▲
//!                                    └──I/O failure──▶ Degraded
//! ```
//!
//! [`McpServer::start`] builds the tool and resource registries (once),
//! binds the transport to a fresh cancellation token and spawns the read
//! loop. End of input makes the loop call [`McpServer::stop`] itself, so the
//! server reaches `Stopped` without outside help. A transport I/O failure
//! leaves it `Degraded` until `stop` cleans up.
//!
//! # Dispatch
//!
//! [`McpServer::process_message`] handles one framed message. It only reads
//! the registries, which never change after `start`, so it may be called
//! concurrently. The read loop itself handles one message at a time.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::api::Backend;
use crate::config::ServerSettings;
use crate::error::ServerError;
use crate::mcp::error::ToolError;
use crate::mcp::middleware::{self, Middleware};
use crate::mcp::protocol::{
    parse_request, ErrorCode, JsonRpcErrorData, JsonRpcResponse, MCP_PROTOCOL_VERSION,
    SERVER_NAME,
};
use crate::mcp::resources::{self, ResourceRegistry};
use crate::mcp::tools::{self, ToolRegistry};
use crate::mcp::transport::{Transport, TransportError};

/// Server state in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not serving.
    Stopped,
    /// `start` in progress.
    Starting,
    /// Read loop active.
    Running,
    /// `stop` in progress.
    Stopping,
    /// The transport failed; `stop` is required.
    Degraded,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
    /// Resource-related capabilities.
    pub resources: ResourceCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Resource-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapabilities {
    /// Whether clients may subscribe to resource updates.
    #[serde(skip_serializing_if = "is_false")]
    pub subscribe: bool,
    /// Whether the resource list can change during the session.
    #[serde(skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request. All optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by the client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Parameters for resources/read request.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceReadParams {
    /// URI of the resource.
    pub uri: String,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
}

impl ToolCallResult {
    /// Creates a text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
        }
    }
}

/// Mutable lifecycle fields, guarded together.
struct Lifecycle {
    state: ServerState,
    /// Root token of the current run.
    cancel: Option<CancellationToken>,
    /// Cancelled when the current run's read loop exits.
    finished: Option<CancellationToken>,
}

/// The MCP server.
pub struct McpServer {
    settings: ServerSettings,
    transport: Arc<dyn Transport>,
    backend: Backend,
    tools: OnceLock<ToolRegistry>,
    resources: OnceLock<ResourceRegistry>,
    middleware: OnceLock<Vec<Arc<dyn Middleware>>>,
    lifecycle: Mutex<Lifecycle>,
}

impl McpServer {
    /// Creates a stopped server.
    #[must_use]
    pub fn new(
        settings: ServerSettings,
        transport: Arc<dyn Transport>,
        backend: Backend,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            transport,
            backend,
            tools: OnceLock::new(),
            resources: OnceLock::new(),
            middleware: OnceLock::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: ServerState::Stopped,
                cancel: None,
                finished: None,
            }),
        })
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current server state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.lifecycle().state
    }

    /// Names of the registered tools; empty before the first `start`.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.get().map(ToolRegistry::names).unwrap_or_default()
    }

    /// Starts the transport and spawns the read loop.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is not `Stopped`, the registries cannot
    /// be built, or the transport refuses to start.
    pub fn start(self: &Arc<Self>) -> Result<(), ServerError> {
        let mut lifecycle = self.lifecycle();
        match lifecycle.state {
            ServerState::Stopped => {}
            ServerState::Starting | ServerState::Running => {
                return Err(ServerError::AlreadyRunning)
            }
            ServerState::Stopping => return Err(ServerError::Stopping),
            ServerState::Degraded => return Err(ServerError::Degraded),
        }
        lifecycle.state = ServerState::Starting;

        if let Err(e) = self.init_registries() {
            lifecycle.state = ServerState::Stopped;
            return Err(e);
        }

        let cancel = CancellationToken::new();
        if let Err(e) = self.transport.start(&cancel) {
            lifecycle.state = ServerState::Stopped;
            return Err(e.into());
        }

        let finished = CancellationToken::new();
        lifecycle.cancel = Some(cancel.clone());
        lifecycle.finished = Some(finished.clone());
        lifecycle.state = ServerState::Running;
        drop(lifecycle);

        tracing::info!(
            tools = self.tool_names().len(),
            resources = self.resources.get().map_or(0, ResourceRegistry::len),
            "MCP server running"
        );

        let server = Arc::clone(self);
        tokio::spawn(async move {
            server.read_loop(cancel).await;
            finished.cancel();
        });

        Ok(())
    }

    /// Populates the registries and middleware chain on first start.
    fn init_registries(&self) -> Result<(), ServerError> {
        if self.tools.get().is_none() {
            let registry = tools::build_registry(&self.backend)?;
            let _ = self.tools.set(registry);
        }
        self.resources
            .get_or_init(|| resources::build_registry(&self.backend));
        self.middleware
            .get_or_init(|| middleware::chain(&self.settings));
        Ok(())
    }

    /// Cancels the current run and stops the transport.
    ///
    /// A no-op unless the server is `Running` or `Degraded`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to flush.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let cancel = {
            let mut lifecycle = self.lifecycle();
            match lifecycle.state {
                ServerState::Running | ServerState::Degraded => {}
                _ => return Ok(()),
            }
            lifecycle.state = ServerState::Stopping;
            lifecycle.cancel.take()
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        let result = self.transport.stop().await;

        self.lifecycle().state = ServerState::Stopped;
        tracing::info!("MCP server stopped");
        result.map_err(ServerError::from)
    }

    /// Resolves once the read loop of the current run has exited.
    ///
    /// Returns immediately if the server was never started.
    pub async fn closed(&self) {
        let finished = self.lifecycle().finished.clone();
        if let Some(finished) = finished {
            finished.cancelled().await;
        }
    }

    /// Starts the server and serves until input closes or a shutdown signal
    /// arrives, then stops it.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start, the transport fails
    /// while serving, or signal handlers cannot be installed.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        self.start()?;

        tokio::select! {
            () = self.closed() => {
                tracing::debug!("Read loop finished");
            }
            signal = shutdown_signal() => match signal {
                Ok(name) => tracing::info!(signal = name, "Received signal, initiating graceful shutdown"),
                Err(e) => {
                    self.stop().await?;
                    return Err(ServerError::Signal(e));
                }
            }
        }

        let degraded = self.state() == ServerState::Degraded;
        self.stop().await?;
        if degraded {
            return Err(ServerError::Degraded);
        }
        Ok(())
    }

    /// Reads, dispatches and answers messages until input ends, the context
    /// is cancelled, or the transport fails.
    ///
    /// `ctx` belongs to this run only. Once it is cancelled the loop never
    /// touches the transport again, even if a later run has rebound it.
    async fn read_loop(self: Arc<Self>, ctx: CancellationToken) {
        loop {
            let read = tokio::select! {
                biased;
                () = ctx.cancelled() => return,
                read = self.transport.read_message() => read,
            };
            let message = match read {
                Ok(message) => message,
                Err(_) if ctx.is_cancelled() => return,
                Err(TransportError::Closed) => {
                    tracing::info!("Input closed, shutting down");
                    if let Err(e) = self.stop().await {
                        tracing::warn!(error = %e, "Failed to stop cleanly");
                    }
                    return;
                }
                Err(TransportError::Cancelled) => return,
                Err(e) => {
                    self.degrade(&e);
                    return;
                }
            };

            if message.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let Some(response) = self.dispatch(&ctx, &message).await else {
                continue;
            };
            if ctx.is_cancelled() {
                tracing::debug!("Run stopped during dispatch, dropping response");
                return;
            }

            let bytes = match serde_json::to_vec(&response) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialise response");
                    continue;
                }
            };

            match self.transport.write_message(&bytes).await {
                Ok(()) => {}
                Err(_) if ctx.is_cancelled() => return,
                Err(TransportError::Cancelled) => return,
                Err(e) => {
                    self.degrade(&e);
                    return;
                }
            }
        }
    }

    fn degrade(&self, error: &TransportError) {
        tracing::error!(error = %error, "Transport failure");
        let mut lifecycle = self.lifecycle();
        if lifecycle.state == ServerState::Running {
            lifecycle.state = ServerState::Degraded;
        }
    }

    /// Processes one framed message and returns the response to send, if
    /// any. Notifications produce no response.
    ///
    /// Tools run under the current run's context, or a fresh one when the
    /// server is not running. Before the first `start` the registries are
    /// empty.
    pub async fn process_message(&self, raw: &[u8]) -> Option<JsonRpcResponse> {
        let ctx = self.lifecycle().cancel.clone().unwrap_or_default();
        self.dispatch(&ctx, raw).await
    }

    async fn dispatch(&self, ctx: &CancellationToken, raw: &[u8]) -> Option<JsonRpcResponse> {
        let request = match parse_request(raw) {
            Ok(request) => request,
            Err(response) => {
                tracing::debug!("Rejected malformed message");
                return Some(response);
            }
        };

        for middleware in self.middleware.get().into_iter().flatten() {
            if let Err(e) = middleware.handle(&request).await {
                tracing::warn!(middleware = middleware.name(), error = %e, "Request rejected");
                return Some(JsonRpcResponse::failure(
                    request.id,
                    JsonRpcErrorData::with_message(
                        ErrorCode::ServerError,
                        format!("Middleware error: {e}"),
                    ),
                ));
            }
        }

        if request.is_notification() {
            tracing::debug!(method = %request.method, "Notification received");
            return None;
        }

        tracing::debug!(method = %request.method, id = ?request.id, "Request received");

        let id = request.id;
        let result = match request.method.as_str() {
            "initialize" => Self::handle_initialize(request.params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(ctx, request.params).await,
            "resources/list" => Ok(self.handle_resources_list()),
            "resources/templates/list" => Ok(self.handle_resource_templates_list()),
            "resources/read" => self.handle_resources_read(ctx, request.params).await,
            method => return Some(JsonRpcResponse::method_not_found(id, method)),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    /// Handles the initialize request.
    fn handle_initialize(params: Option<Value>) -> Result<Value, JsonRpcErrorData> {
        let params: InitializeParams = match params {
            Some(params) => parse_params(params, "initialize")?,
            None => InitializeParams::default(),
        };

        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                requested_version = params.protocol_version.as_deref().unwrap_or("unspecified"),
                "Client connected"
            );
        }

        Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        }))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self) -> Value {
        let tools = self
            .tools
            .get()
            .map(ToolRegistry::definitions)
            .unwrap_or_default();
        json!({ "tools": tools })
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(
        &self,
        ctx: &CancellationToken,
        params: Option<Value>,
    ) -> Result<Value, JsonRpcErrorData> {
        let params: ToolCallParams = parse_params(
            params.ok_or_else(|| {
                JsonRpcErrorData::with_message(ErrorCode::InvalidParams, "Missing tool call params")
            })?,
            "tool call",
        )?;

        let Some(tool) = self.tools.get().and_then(|t| t.get(&params.name)) else {
            return Err(JsonRpcErrorData::with_message(
                ErrorCode::ServerError,
                format!("Tool not found: {}", params.name),
            )
            .with_data(json!({ "name": params.name })));
        };

        let started = Instant::now();
        match tool.execute(ctx, params.arguments).await {
            Ok(text) => {
                tracing::debug!(
                    tool = %params.name,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Tool call succeeded"
                );
                to_result_value(&ToolCallResult::text(text))
            }
            Err(e) => {
                let error = e.into_tool_error(&params.name, "");
                tracing::warn!(
                    tool = %params.name,
                    kind = error.kind().as_str(),
                    elapsed_ms = started.elapsed().as_millis(),
                    error = %error,
                    "Tool call failed"
                );
                Err(error.into_error_data())
            }
        }
    }

    /// Handles the resources/list request.
    fn handle_resources_list(&self) -> Value {
        let resources = self
            .resources
            .get()
            .map(ResourceRegistry::definitions)
            .unwrap_or_default();
        json!({ "resources": resources })
    }

    /// Handles the resources/templates/list request.
    fn handle_resource_templates_list(&self) -> Value {
        let templates = self
            .resources
            .get()
            .map(ResourceRegistry::templates)
            .unwrap_or_default();
        json!({ "resourceTemplates": templates })
    }

    /// Handles the resources/read request.
    async fn handle_resources_read(
        &self,
        ctx: &CancellationToken,
        params: Option<Value>,
    ) -> Result<Value, JsonRpcErrorData> {
        let params: ResourceReadParams = parse_params(
            params.ok_or_else(|| {
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidParams,
                    "Missing required parameter: uri",
                )
            })?,
            "resource read",
        )?;
        let uri = params.uri;
        if uri.trim().is_empty() {
            return Err(JsonRpcErrorData::with_message(
                ErrorCode::InvalidParams,
                "Missing required parameter: uri",
            ));
        }

        let Some(resource) = self.resources.get().and_then(|r| r.find(&uri)) else {
            return Err(JsonRpcErrorData::with_message(
                ErrorCode::ServerError,
                format!("Resource not found: {uri}"),
            )
            .with_data(json!({ "uri": uri })));
        };

        let content = resource.get_content(ctx, &uri).await.map_err(|e| {
            let error = e.into_tool_error("read_resource", &uri);
            tracing::warn!(%uri, kind = error.kind().as_str(), error = %error, "Resource read failed");
            error.into_error_data()
        })?;

        let mut reader = content.reader;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| ToolError::content_read(&uri, e).into_error_data())?;

        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": content.mime_type,
                "text": String::from_utf8_lossy(&bytes),
            }]
        }))
    }
}

/// Deserialises method parameters, mapping failures to "invalid params".
fn parse_params<T: DeserializeOwned>(params: Value, what: &str) -> Result<T, JsonRpcErrorData> {
    serde_json::from_value(params).map_err(|e| {
        JsonRpcErrorData::with_message(
            ErrorCode::InvalidParams,
            format!("Invalid {what} params: {e}"),
        )
    })
}

fn to_result_value<T: Serialize>(value: &T) -> Result<Value, JsonRpcErrorData> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialise tool call result");
        JsonRpcErrorData::with_message(
            ErrorCode::InternalError,
            "Internal error: failed to serialise result",
        )
    })
}

/// Waits for SIGINT or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

/// Waits for Ctrl+C.
#[cfg(windows)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeRequester;
    use crate::api::OrgSelection;
    use crate::mcp::transport::LineTransport;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    fn server_over(transport: Arc<dyn Transport>, fake: Arc<FakeRequester>) -> Arc<McpServer> {
        McpServer::new(
            ServerSettings::default(),
            transport,
            Backend::new(fake, OrgSelection::new(None)),
        )
    }

    /// A server whose input stays open while the returned stream lives.
    fn idle_server(fake: Arc<FakeRequester>) -> (Arc<McpServer>, DuplexStream) {
        let (client, server) = tokio::io::duplex(1024);
        let server = server_over(Arc::new(LineTransport::new(server, tokio::io::sink())), fake);
        (server, client)
    }

    async fn call(server: &McpServer, message: Value) -> JsonRpcResponse {
        server
            .process_message(message.to_string().as_bytes())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn start_twice_fails_and_stop_is_idempotent() {
        let (server, _client) = idle_server(Arc::new(FakeRequester::default()));
        assert_eq!(server.state(), ServerState::Stopped);
        server.stop().await.unwrap();

        server.start().unwrap();
        assert_eq!(server.state(), ServerState::Running);
        assert!(matches!(server.start(), Err(ServerError::AlreadyRunning)));

        server.stop().await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        server.stop().await.unwrap();
        server.closed().await;
    }

    #[tokio::test]
    async fn registries_survive_restart() {
        let (server, _client) = idle_server(Arc::new(FakeRequester::default()));
        server.start().unwrap();
        let names = server.tool_names();
        server.stop().await.unwrap();
        server.closed().await;

        server.start().unwrap();
        assert_eq!(server.tool_names(), names);
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn end_of_input_stops_the_server() {
        let server = server_over(
            Arc::new(LineTransport::new(tokio::io::empty(), tokio::io::sink())),
            Arc::new(FakeRequester::default()),
        );
        server.start().unwrap();
        server.closed().await;
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn read_failure_degrades_the_server() {
        let reader = tokio_test::io::Builder::new()
            .read_error(std::io::Error::other("device gone"))
            .build();
        let server = server_over(
            Arc::new(LineTransport::new(reader, tokio::io::sink())),
            Arc::new(FakeRequester::default()),
        );
        server.start().unwrap();
        server.closed().await;
        assert_eq!(server.state(), ServerState::Degraded);
        assert!(matches!(server.start(), Err(ServerError::Degraded)));

        server.stop().await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn serves_requests_over_the_transport() {
        let (client, server_end) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_end);
        let server = server_over(
            Arc::new(LineTransport::new(server_read, server_write)),
            Arc::new(FakeRequester::default()),
        );
        server.start().unwrap();

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n\n")
            .await
            .unwrap();
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":\"a\",\"method\":\"ping\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": "a", "result": {}}));

        client_write.shutdown().await.unwrap();
        server.closed().await;
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn initialize_advertises_tools_and_resources() {
        let (server, _client) = idle_server(Arc::new(FakeRequester::default()));
        server.start().unwrap();

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "test-client", "version": "1.0"}
            }}),
        )
        .await;
        let result = response.result().unwrap();
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["capabilities"], json!({"tools": {}, "resources": {}}));
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn tool_failure_is_classified() {
        let fake = Arc::new(FakeRequester::default());
        fake.fail(404, "application not found");
        let (server, _client) = idle_server(fake);
        server.start().unwrap();

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {
                "name": "get_environment",
                "arguments": {"environment_id": "env-123"}
            }}),
        )
        .await;
        let error = response.error().unwrap();
        assert_eq!(error.code, ErrorCode::NotFound.code());
        assert!(error.message.contains("get_environments"));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn resources_read_requires_uri() {
        let (server, _client) = idle_server(Arc::new(FakeRequester::default()));
        server.start().unwrap();

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/read", "params": {}}),
        )
        .await;
        assert_eq!(response.error().unwrap().code, ErrorCode::InvalidParams.code());

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 3, "method": "resources/read",
                   "params": {"uri": "metrics://env-123/web"}}),
        )
        .await;
        let error = response.error().unwrap();
        assert_eq!(error.code, ErrorCode::ServerError.code());
        assert!(error.message.starts_with("Resource not found"));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn resources_read_rejects_blank_uri() {
        let (server, _client) = idle_server(Arc::new(FakeRequester::default()));
        server.start().unwrap();

        for uri in ["", "   "] {
            let response = call(
                &server,
                json!({"jsonrpc": "2.0", "id": 4, "method": "resources/read",
                       "params": {"uri": uri}}),
            )
            .await;
            let error = response.error().unwrap();
            assert_eq!(error.code, ErrorCode::InvalidParams.code());
            assert_eq!(error.message, "Missing required parameter: uri");
        }
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unreadable_resource_content_is_reported() {
        struct Broken;

        #[async_trait::async_trait]
        impl resources::Resource for Broken {
            fn definition(&self) -> resources::ResourceDefinition {
                resources::ResourceDefinition {
                    uri: "broken://feed".to_string(),
                    name: "broken".to_string(),
                    description: "fails while streaming".to_string(),
                    mime_type: "text/plain".to_string(),
                    metadata: None,
                }
            }

            fn template(&self) -> resources::ResourceTemplate {
                resources::ResourceTemplate {
                    uri_template: "broken://feed".to_string(),
                    name: "broken".to_string(),
                    description: "fails while streaming".to_string(),
                    mime_type: "text/plain".to_string(),
                }
            }

            fn is_available(&self, uri: &str) -> bool {
                uri == "broken://feed"
            }

            async fn get_content(
                &self,
                _ctx: &CancellationToken,
                _uri: &str,
            ) -> Result<resources::ResourceContent, crate::mcp::error::CallError> {
                let reader = tokio_test::io::Builder::new()
                    .read(b"partial")
                    .read_error(std::io::Error::other("stream reset"))
                    .build();
                Ok(resources::ResourceContent {
                    reader: Box::new(reader),
                    mime_type: "text/plain".to_string(),
                })
            }
        }

        let (server, _client) = idle_server(Arc::new(FakeRequester::default()));
        let mut registry = ResourceRegistry::new();
        registry.register(Arc::new(Broken));
        let _ = server.resources.set(registry);
        server.start().unwrap();

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 5, "method": "resources/read",
                   "params": {"uri": "broken://feed"}}),
        )
        .await;
        let error = response.error().unwrap();
        assert_eq!(error.code, ErrorCode::InternalError.code());
        assert!(error.message.contains("broken://feed"));
        assert!(error.message.contains("stream reset"));
        assert!(error.message.contains("temporarily unavailable"));
        server.stop().await.unwrap();
    }

    /// Blocks the first request until released and records whether each
    /// call's context was already cancelled on entry.
    #[derive(Default)]
    struct GatedRequester {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        cancelled_on_entry: std::sync::Mutex<Vec<bool>>,
    }

    #[async_trait::async_trait]
    impl crate::api::Requester for GatedRequester {
        async fn request(
            &self,
            ctx: &CancellationToken,
            _method: reqwest::Method,
            _uri: &str,
            _content_type: Option<&str>,
            _body: Option<Vec<u8>>,
        ) -> Result<Vec<u8>, crate::api::ApiError> {
            let first = {
                let mut calls = self.cancelled_on_entry.lock().unwrap();
                calls.push(ctx.is_cancelled());
                calls.len() == 1
            };
            if first {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(br#"{"data": [{"name": "acme"}]}"#.to_vec())
        }
    }

    #[tokio::test]
    async fn restart_retires_the_previous_read_loop() {
        let requester = Arc::new(GatedRequester::default());
        let (client, server_end) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_end);
        let server = McpServer::new(
            ServerSettings::default(),
            Arc::new(LineTransport::new(server_read, server_write)),
            Backend::new(requester.clone(), OrgSelection::new(None)),
        );
        server.start().unwrap();

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut lines = BufReader::new(client_read).lines();
        let get_orgs = |id: u32| {
            format!(
                "{{\"jsonrpc\":\"2.0\",\"id\":{id},\"method\":\"tools/call\",\
                 \"params\":{{\"name\":\"get_orgs\",\"arguments\":{{}}}}}}\n"
            )
        };

        client_write.write_all(get_orgs(1).as_bytes()).await.unwrap();
        requester.entered.notified().await;

        server.stop().await.unwrap();
        server.start().unwrap();
        requester.release.notify_one();

        client_write.write_all(get_orgs(2).as_bytes()).await.unwrap();
        let value: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(value["id"], 2);
        assert!(value["result"].is_object());

        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(value["id"], 3);

        assert_eq!(*requester.cancelled_on_entry.lock().unwrap(), vec![false, false]);
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn middleware_error_short_circuits() {
        struct Deny;

        #[async_trait::async_trait]
        impl Middleware for Deny {
            fn name(&self) -> &'static str {
                "deny"
            }

            async fn handle(
                &self,
                _request: &crate::mcp::protocol::JsonRpcRequest,
            ) -> Result<(), middleware::MiddlewareError> {
                Err(middleware::MiddlewareError {
                    middleware: "deny",
                    reason: "not allowed".to_string(),
                })
            }
        }

        let (server, _client) = idle_server(Arc::new(FakeRequester::default()));
        let _ = server.middleware.set(vec![Arc::new(Deny)]);
        server.start().unwrap();

        let response = call(&server, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).await;
        let error = response.error().unwrap();
        assert_eq!(error.code, ErrorCode::ServerError.code());
        assert_eq!(error.message, "Middleware error: deny: not allowed");
        server.stop().await.unwrap();
    }
}
