// Tool descriptors, calls, and results
//
// Design Decision: Tools are identified by qualified name (string) for
// extensibility. Federated tools carry their origin server so a disconnect
// can remove exactly the descriptors that server contributed.

use serde::{Deserialize, Serialize};

/// Where a tool's implementation lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOrigin {
    /// Local function executed in-process
    #[default]
    Local,
    /// Tool discovered from an independently-running external server
    Federated { server_id: String },
}

impl ToolOrigin {
    /// Create a federated origin
    pub fn federated(server_id: impl Into<String>) -> Self {
        ToolOrigin::Federated {
            server_id: server_id.into(),
        }
    }

    /// Server ID if this origin is federated
    pub fn server_id(&self) -> Option<&str> {
        match self {
            ToolOrigin::Local => None,
            ToolOrigin::Federated { server_id } => Some(server_id),
        }
    }
}

/// Invocation contract for a registered tool.
///
/// Created at registration time; immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Qualified name, globally unique within a session
    pub name: String,
    /// Tool description for the backend
    pub description: String,
    /// JSON schema for tool arguments
    pub parameters: serde_json::Value,
    /// Origin (local or federated)
    #[serde(default)]
    pub origin: ToolOrigin,
}

/// A structured tool-call request produced by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call (unique within a turn)
    pub id: String,
    /// Qualified tool name to execute
    pub name: String,
    /// Arguments as JSON
    pub arguments: serde_json::Value,
}

/// Result of a dispatched tool call.
///
/// Never mutated after creation; appended to the conversation as a tool turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Tool call ID this result corresponds to
    pub tool_call_id: String,
    /// Result data (success)
    pub result: Option<serde_json::Value>,
    /// Error detail (failure)
    pub error: Option<String>,
}

impl ToolCallResult {
    /// Create a successful result
    pub fn success(tool_call_id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Create a failed result
    pub fn failure(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    /// Check if the call succeeded
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_serialization() {
        let json = r#"{
            "name": "fetch_data",
            "description": "Fetch data from URL",
            "parameters": {"type": "object"}
        }"#;

        let descriptor: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.name, "fetch_data");
        assert_eq!(descriptor.origin, ToolOrigin::Local);
    }

    #[test]
    fn test_federated_origin_roundtrip() {
        let descriptor = ToolDescriptor {
            name: "weather__get_forecast".to_string(),
            description: "Forecast".to_string(),
            parameters: serde_json::json!({"type": "object"}),
            origin: ToolOrigin::federated("weather"),
        };

        let json = serde_json::to_string(&descriptor).unwrap();
        let parsed: ToolDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.origin.server_id(), Some("weather"));
    }

    #[test]
    fn test_tool_call_result_states() {
        let ok = ToolCallResult::success("call_1", serde_json::json!({"temperature": 72}));
        assert!(ok.succeeded());

        let failed = ToolCallResult::failure("call_2", "ToolExecutionError: boom");
        assert!(!failed.succeeded());
        assert!(failed.result.is_none());
    }
}
