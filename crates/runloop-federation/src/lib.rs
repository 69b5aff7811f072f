// External Tool Federation Manager
//
// Connects to zero or more independently-addressed tool servers, discovers
// their tools, applies per-server namespacing and include/exclude filtering,
// and merges the results into a shared ToolRegistry.
//
// Key design decisions:
// - Connecting to N servers runs concurrently, each under its own timeout;
//   one server's failure produces a warning, not a fatal error
// - Qualified names are `<server_id>__<tool_name>` with non-alphanumeric
//   characters normalized to `_`, which keeps names injective across servers
// - A failed connection never contributes tools; reconnecting after a
//   failure creates a fresh ServerConnection record
// - Disconnect removes exactly the descriptors that server contributed;
//   in-flight invocations finish on their own schedule

pub mod transport;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use runloop_core::{Tool, ToolOrigin, ToolOutcome, ToolRegistry};

pub use transport::{HttpToolServer, RemoteToolDef, ToolServerTransport, TransportError};

// ============================================================================
// Configuration and connection records
// ============================================================================

/// Configuration for one external tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server identifier, unique among configured servers
    pub server_id: String,

    /// Transport address (HTTP base URL)
    pub endpoint: String,

    /// Include patterns applied to raw tool names (empty = include all)
    #[serde(default)]
    pub include: Vec<String>,

    /// Exclude patterns applied to raw tool names
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Timeout for connect + discovery
    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Timeout for a single remote tool invocation
    #[serde(default = "default_call_timeout", with = "duration_secs")]
    pub call_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(60)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl ServerConfig {
    /// Create a server configuration with default timeouts and no filters
    pub fn new(server_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            endpoint: endpoint.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            connect_timeout: default_connect_timeout(),
            call_timeout: default_call_timeout(),
        }
    }

    /// Set include patterns
    pub fn with_include(mut self, patterns: impl IntoIterator<Item = &'static str>) -> Self {
        self.include = patterns.into_iter().map(String::from).collect();
        self
    }

    /// Set exclude patterns
    pub fn with_exclude(mut self, patterns: impl IntoIterator<Item = &'static str>) -> Self {
        self.exclude = patterns.into_iter().map(String::from).collect();
        self
    }

    /// Set the connect + discovery timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-invocation timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// Connection lifecycle state.
///
/// Transitions are monotonic except reconnect, which creates a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Failed,
    Disconnected,
}

/// Record of one server connection attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConnection {
    /// Server identifier
    pub server_id: String,
    /// Transport address
    pub endpoint: String,
    /// Current state
    pub state: ConnectionState,
    /// Number of tools this connection contributed to the registry
    pub tool_count: usize,
    /// When the connection reached `Connected`
    pub connected_at: Option<DateTime<Utc>>,
}

/// Warning kinds surfaced by connect/discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Server could not be reached or discovery failed
    ServerConnectError,
    /// Server connected but contributed zero tools (after filtering)
    ServerDiscoveryEmpty,
}

/// A non-fatal signal from connect/discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationWarning {
    pub server_id: String,
    pub kind: WarningKind,
    pub message: String,
}

/// Outcome of connecting to a set of configured servers
#[derive(Debug, Clone, Default)]
pub struct FederationReport {
    /// Final connection record per attempted server
    pub connections: Vec<ServerConnection>,
    /// Warnings accumulated across all attempts
    pub warnings: Vec<FederationWarning>,
}

impl FederationReport {
    /// Total number of tools registered across all servers
    pub fn tool_count(&self) -> usize {
        self.connections.iter().map(|c| c.tool_count).sum()
    }

    /// Check if every attempted server connected without warnings
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

// ============================================================================
// Namespacing and filtering
// ============================================================================

/// Normalize one name component: non-alphanumeric characters become `_`.
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// Qualified name for a discovered tool: `<server_id>__<tool_name>`.
///
/// Components are sanitized independently; server ids are unique per
/// session, so two servers with colliding raw tool names still get
/// distinct qualified names.
pub fn qualified_tool_name(server_id: &str, tool_name: &str) -> String {
    format!(
        "{}__{}",
        sanitize_component(server_id),
        sanitize_component(tool_name)
    )
}

/// Match a filter pattern against a raw tool name.
///
/// Dialect: exact match, `*` (everything), `prefix*`, `*suffix`.
fn matches_pattern(pattern: &str, name: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        if !prefix.contains('*') {
            return name.starts_with(prefix);
        }
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        if !suffix.contains('*') {
            return name.ends_with(suffix);
        }
    }
    pattern == name
}

/// Apply include/exclude filtering to a raw tool name.
///
/// An empty include list means "include everything"; exclusion wins.
pub fn is_tool_included(name: &str, include: &[String], exclude: &[String]) -> bool {
    let included = include.is_empty() || include.iter().any(|p| matches_pattern(p, name));
    let excluded = exclude.iter().any(|p| matches_pattern(p, name));
    included && !excluded
}

// ============================================================================
// Federated tool
// ============================================================================

/// A tool whose implementation lives on an external server.
///
/// Invocations are delegated to the server transport under the configured
/// per-call timeout; failures surface as tool errors the model can see.
struct FederatedTool {
    qualified_name: String,
    description: String,
    parameters: Value,
    server_id: String,
    remote_name: String,
    call_timeout: Duration,
    transport: Arc<dyn ToolServerTransport>,
}

#[async_trait]
impl Tool for FederatedTool {
    fn name(&self) -> &str {
        &self.qualified_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    fn origin(&self) -> ToolOrigin {
        ToolOrigin::federated(&self.server_id)
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        match tokio::time::timeout(
            self.call_timeout,
            self.transport.call_tool(&self.remote_name, arguments),
        )
        .await
        {
            Ok(Ok(value)) => ToolOutcome::success(value),
            Ok(Err(err)) => ToolOutcome::tool_error(format!(
                "remote tool '{}' on server '{}' failed: {}",
                self.remote_name, self.server_id, err
            )),
            Err(_) => ToolOutcome::tool_error(format!(
                "remote tool '{}' on server '{}' timed out",
                self.remote_name, self.server_id
            )),
        }
    }
}

// ============================================================================
// Federation manager
// ============================================================================

/// Manages connections to external tool servers and the tools they
/// contribute to the shared registry.
pub struct FederationManager {
    registry: Arc<ToolRegistry>,
    connections: Mutex<HashMap<String, ServerConnection>>,
}

impl FederationManager {
    /// Create a manager merging into the given registry
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// The registry this manager merges into
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Connect to all configured servers concurrently.
    ///
    /// Each attempt runs under its own timeout; a failing or empty server
    /// only contributes a warning. The report is available once every
    /// attempt has resolved.
    pub async fn connect_all(&self, configs: Vec<ServerConfig>) -> FederationReport {
        let attempts = configs.into_iter().map(|config| async move {
            let transport: Arc<dyn ToolServerTransport> =
                Arc::new(HttpToolServer::new(&config.endpoint));
            self.connect_with_transport(config, transport).await
        });

        let mut report = FederationReport::default();
        for (connection, warning) in join_all(attempts).await {
            report.connections.push(connection);
            report.warnings.extend(warning);
        }
        info!(
            servers = report.connections.len(),
            tools = report.tool_count(),
            warnings = report.warnings.len(),
            "Federation connect finished"
        );
        report
    }

    /// Connect to a single server over HTTP
    pub async fn connect(&self, config: ServerConfig) -> ServerConnection {
        let transport: Arc<dyn ToolServerTransport> =
            Arc::new(HttpToolServer::new(&config.endpoint));
        self.connect_with_transport(config, transport).await.0
    }

    /// Connect to a single server over a caller-supplied transport.
    ///
    /// Reconnecting to a server that is already `Connected` is a no-op
    /// returning the existing connection; a `Connecting` record marks an
    /// attempt already in flight and is returned the same way.
    pub async fn connect_with_transport(
        &self,
        config: ServerConfig,
        transport: Arc<dyn ToolServerTransport>,
    ) -> (ServerConnection, Option<FederationWarning>) {
        // Fresh record for this attempt; a previous Failed record is replaced
        let mut connection = ServerConnection {
            server_id: config.server_id.clone(),
            endpoint: config.endpoint.clone(),
            state: ConnectionState::Connecting,
            tool_count: 0,
            connected_at: None,
        };

        // Check-and-claim under one lock: a Connecting record means another
        // attempt is in flight for this id and must not be raced
        {
            let mut connections = self.connections.lock().await;
            if let Some(existing) = connections.get(&config.server_id) {
                if matches!(
                    existing.state,
                    ConnectionState::Connected | ConnectionState::Connecting
                ) {
                    return (existing.clone(), None);
                }
            }
            connections.insert(config.server_id.clone(), connection.clone());
        }

        let discovery =
            tokio::time::timeout(config.connect_timeout, transport.list_tools()).await;

        let warning = match discovery {
            Err(_) => {
                connection.state = ConnectionState::Failed;
                let message = format!(
                    "server '{}' did not answer within {:?}",
                    config.server_id, config.connect_timeout
                );
                warn!(server_id = %config.server_id, "Server connect timed out");
                Some(FederationWarning {
                    server_id: config.server_id.clone(),
                    kind: WarningKind::ServerConnectError,
                    message,
                })
            }
            Ok(Err(err)) => {
                connection.state = ConnectionState::Failed;
                warn!(server_id = %config.server_id, error = %err, "Server connect failed");
                Some(FederationWarning {
                    server_id: config.server_id.clone(),
                    kind: WarningKind::ServerConnectError,
                    message: err.to_string(),
                })
            }
            Ok(Ok(defs)) => {
                match self.register_discovered(&config, Arc::clone(&transport), defs) {
                    Ok(count) => {
                        connection.state = ConnectionState::Connected;
                        connection.connected_at = Some(Utc::now());
                        connection.tool_count = count;
                        info!(
                            server_id = %config.server_id,
                            tools = count,
                            "Server connected"
                        );
                        if count == 0 {
                            warn!(server_id = %config.server_id, "Server contributed no tools");
                            Some(FederationWarning {
                                server_id: config.server_id.clone(),
                                kind: WarningKind::ServerDiscoveryEmpty,
                                message: format!(
                                    "server '{}' advertised no tools after filtering",
                                    config.server_id
                                ),
                            })
                        } else {
                            None
                        }
                    }
                    Err(err) => {
                        // Roll back any partial contribution; a failed
                        // connection never contributes descriptors
                        self.registry.remove_origin(&config.server_id);
                        connection.state = ConnectionState::Failed;
                        warn!(server_id = %config.server_id, error = %err, "Tool registration failed");
                        Some(FederationWarning {
                            server_id: config.server_id.clone(),
                            kind: WarningKind::ServerConnectError,
                            message: err.to_string(),
                        })
                    }
                }
            }
        };

        self.store_connection(connection.clone()).await;
        (connection, warning)
    }

    /// Disconnect a server, removing all tools it contributed.
    ///
    /// Returns the number of tools removed. In-flight invocations against
    /// the server complete or fail on their own schedule.
    pub async fn disconnect(&self, server_id: &str) -> usize {
        let removed = self.registry.remove_origin(server_id);
        let mut connections = self.connections.lock().await;
        if let Some(connection) = connections.get_mut(server_id) {
            connection.state = ConnectionState::Disconnected;
            connection.tool_count = 0;
        }
        info!(server_id = %server_id, removed = removed, "Server disconnected");
        removed
    }

    /// Current connection record for a server
    pub async fn connection(&self, server_id: &str) -> Option<ServerConnection> {
        self.connections.lock().await.get(server_id).cloned()
    }

    /// All connection records
    pub async fn connections(&self) -> Vec<ServerConnection> {
        self.connections.lock().await.values().cloned().collect()
    }

    /// Build and register the federated tools for one server's discovery
    /// result under a single registry write (the serialized merge step).
    fn register_discovered(
        &self,
        config: &ServerConfig,
        transport: Arc<dyn ToolServerTransport>,
        mut defs: Vec<RemoteToolDef>,
    ) -> runloop_core::Result<usize> {
        defs.sort_by(|a, b| a.name.cmp(&b.name));

        let tools: Vec<Arc<dyn Tool>> = defs
            .into_iter()
            .filter(|def| is_tool_included(&def.name, &config.include, &config.exclude))
            .map(|def| {
                let qualified_name = qualified_tool_name(&config.server_id, &def.name);
                let description = def
                    .description
                    .unwrap_or_else(|| format!("Federated tool {}", def.name));
                Arc::new(FederatedTool {
                    qualified_name,
                    description,
                    parameters: def.input_schema,
                    server_id: config.server_id.clone(),
                    remote_name: def.name,
                    call_timeout: config.call_timeout,
                    transport: Arc::clone(&transport),
                }) as Arc<dyn Tool>
            })
            .collect();

        if tools.is_empty() {
            return Ok(0);
        }
        self.registry.register_all(tools)
    }

    async fn store_connection(&self, connection: ServerConnection) {
        self.connections
            .lock()
            .await
            .insert(connection.server_id.clone(), connection);
    }
}

// ============================================================================
// Tests
// ============================================================================
