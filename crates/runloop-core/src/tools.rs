// Tool abstraction and registry
//
// Tools are defined via the `Tool` trait and registered with a `ToolRegistry`
// which handles dispatch for the engine. Registration of a duplicate
// qualified name fails instead of silently overwriting.
//
// Error handling distinguishes between tool-level errors (shown to the
// model so it can recover) and internal errors (logged but masked).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, warn};

use crate::error::{EngineError, Result};
use crate::tool_types::{ToolCall, ToolCallResult, ToolDescriptor, ToolOrigin};

// ============================================================================
// Tool Outcome - Error Handling Contract
// ============================================================================

/// Result of a single tool invocation.
///
/// - `Success`: result is returned to the model
/// - `ToolError`: expected failure, safe to show to the model
///   (e.g. "City not found", "Invalid date format")
/// - `InternalError`: system-level failure that must NOT reach the model;
///   details are logged and replaced with a generic message
#[derive(Debug)]
pub enum ToolOutcome {
    /// Successful invocation with a JSON result
    Success(Value),

    /// Tool-level error that is safe to show to the model
    ToolError(String),

    /// Internal/system error (hidden from the model)
    InternalError(ToolInternalError),
}

impl ToolOutcome {
    /// Create a successful outcome
    pub fn success(value: impl Into<Value>) -> Self {
        ToolOutcome::Success(value.into())
    }

    /// Create a tool-level error (safe to show to the model)
    pub fn tool_error(message: impl Into<String>) -> Self {
        ToolOutcome::ToolError(message.into())
    }

    /// Create an internal error from a source error
    pub fn internal_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        ToolOutcome::InternalError(ToolInternalError::new(error))
    }

    /// Create an internal error from a string message
    pub fn internal_error_msg(message: impl Into<String>) -> Self {
        ToolOutcome::InternalError(ToolInternalError::from_message(message))
    }

    /// Check if this is a successful outcome
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    /// Convert to a ToolCallResult for the engine.
    ///
    /// Tool errors surface as failed results with their message; internal
    /// errors are logged and surface with a generic message.
    pub fn into_call_result(self, tool_call_id: &str, tool_name: &str) -> ToolCallResult {
        match self {
            ToolOutcome::Success(value) => ToolCallResult::success(tool_call_id, value),
            ToolOutcome::ToolError(message) => {
                ToolCallResult::failure(tool_call_id, format!("ToolExecutionError: {}", message))
            }
            ToolOutcome::InternalError(err) => {
                error!(
                    tool_name = %tool_name,
                    tool_call_id = %tool_call_id,
                    error = %err.message,
                    "Tool internal error (details hidden from model)"
                );
                ToolCallResult::failure(
                    tool_call_id,
                    "ToolExecutionError: an internal error occurred while executing the tool",
                )
            }
        }
    }
}

/// Internal error details (logged but not exposed to the model)
#[derive(Debug)]
pub struct ToolInternalError {
    /// Error message for logging
    pub message: String,
    /// Optional source error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ToolInternalError {
    /// Create from an error
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Create from a string message
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl std::fmt::Display for ToolInternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolInternalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ============================================================================
// Tool Trait
// ============================================================================

/// Trait for tools invocable by the engine.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Qualified tool name, unique within a registry
    fn name(&self) -> &str;

    /// Description provided to the backend
    fn description(&self) -> &str;

    /// JSON schema for the tool's arguments
    fn parameters_schema(&self) -> Value;

    /// Origin of this tool (local by default)
    fn origin(&self) -> ToolOrigin {
        ToolOrigin::Local
    }

    /// Invoke the tool with the given arguments
    async fn invoke(&self, arguments: Value) -> ToolOutcome;

    /// Build the descriptor for this tool
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            origin: self.origin(),
        }
    }
}

// ============================================================================
// ToolRegistry
// ============================================================================

/// Filter for listing registered tools
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    /// Only tools from this origin server (`None` = any origin)
    pub server_id: Option<String>,
    /// Only tools whose qualified name contains this substring
    pub name_contains: Option<String>,
}

impl ToolFilter {
    fn matches(&self, descriptor: &ToolDescriptor) -> bool {
        if let Some(server_id) = &self.server_id {
            if descriptor.origin.server_id() != Some(server_id.as_str()) {
                return false;
            }
        }
        if let Some(fragment) = &self.name_contains {
            if !descriptor.name.contains(fragment.as_str()) {
                return false;
            }
        }
        true
    }
}

/// In-memory mapping from qualified tool name to its invocation contract.
///
/// Shared between the engine (reads) and the federation manager
/// (registration and origin removal), so lookups go through an RwLock.
/// The lock is never held across an await point.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// Fails with `DuplicateTool` if the qualified name is already taken.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let mut tools = self.write_tools();
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            return Err(EngineError::DuplicateTool(name));
        }
        tools.insert(name, tool);
        Ok(())
    }

    /// Register several tools under a single write lock (all-or-nothing
    /// duplicate check happens per tool, in order).
    pub fn register_all(&self, batch: Vec<Arc<dyn Tool>>) -> Result<usize> {
        let mut tools = self.write_tools();
        for tool in &batch {
            if tools.contains_key(tool.name()) {
                return Err(EngineError::DuplicateTool(tool.name().to_string()));
            }
        }
        let count = batch.len();
        for tool in batch {
            tools.insert(tool.name().to_string(), tool);
        }
        Ok(count)
    }

    /// Resolve a tool by qualified name
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.read_tools().get(name).cloned()
    }

    /// Check if a tool is registered
    pub fn has(&self, name: &str) -> bool {
        self.read_tools().contains_key(name)
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.read_tools().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.read_tools().is_empty()
    }

    /// Descriptors of all registered tools
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.read_tools().values().map(|t| t.descriptor()).collect()
    }

    /// Descriptors of registered tools matching a filter
    pub fn list(&self, filter: &ToolFilter) -> Vec<ToolDescriptor> {
        self.read_tools()
            .values()
            .map(|t| t.descriptor())
            .filter(|d| filter.matches(d))
            .collect()
    }

    /// Remove all tools contributed by a federated server.
    ///
    /// Returns the number of tools removed.
    pub fn remove_origin(&self, server_id: &str) -> usize {
        let mut tools = self.write_tools();
        let before = tools.len();
        tools.retain(|_, tool| tool.origin().server_id() != Some(server_id));
        before - tools.len()
    }

    /// Dispatch a tool call.
    ///
    /// Never fails the run: an unregistered name or a failing tool is
    /// absorbed into a failed `ToolCallResult` the model can react to.
    pub async fn invoke(&self, call: &ToolCall) -> ToolCallResult {
        let Some(tool) = self.resolve(&call.name) else {
            warn!(tool_name = %call.name, tool_call_id = %call.id, "Tool not found");
            return ToolCallResult::failure(
                &call.id,
                format!("ToolNotFound: no tool named '{}' is registered", call.name),
            );
        };

        let outcome = tool.invoke(call.arguments.clone()).await;
        outcome.into_call_result(&call.id, &call.name)
    }

    fn read_tools(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        match self.tools.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_tools(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        match self.tools.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.read_tools().keys().cloned().collect();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// A tool that echoes back its arguments (useful for testing)
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the provided message. Useful for testing tool execution."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo back"
                }
            },
            "required": ["message"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let message = arguments
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        ToolOutcome::success(serde_json::json!({
            "echoed": message,
            "length": message.len()
        }))
    }
}

/// A tool that always fails (useful for testing error handling)
pub struct FailingTool {
    error_message: String,
    use_internal_error: bool,
}

impl FailingTool {
    /// Create a failing tool with a tool-level error
    pub fn with_tool_error(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            use_internal_error: false,
        }
    }

    /// Create a failing tool with an internal error
    pub fn with_internal_error(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            use_internal_error: true,
        }
    }
}

impl Default for FailingTool {
    fn default() -> Self {
        Self::with_tool_error("Tool execution failed")
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing_tool"
    }

    fn description(&self) -> &str {
        "A tool that always fails (for testing error handling)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn invoke(&self, _arguments: Value) -> ToolOutcome {
        if self.use_internal_error {
            ToolOutcome::internal_error_msg(&self.error_message)
        } else {
            ToolOutcome::tool_error(&self.error_message)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
