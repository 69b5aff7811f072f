// Tool server transport
//
// The wire contract with an external tool server:
//   GET  {base}/tools          -> {"tools": [{name, description?, input_schema}]}
//   POST {base}/tools/{name}   -> result JSON (arbitrary shape)
//
// Servers are reached over HTTP here; other transports plug in behind the
// same trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A tool as advertised by an external server (pre-namespacing)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteToolDef {
    /// Raw tool name on the server
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema for the tool's arguments
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object"})
}

/// Errors from talking to a tool server
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request could not be sent or the connection failed
    #[error("request failed: {0}")]
    Request(String),

    /// Server answered with a non-success status
    #[error("server returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body could not be decoded
    #[error("invalid payload: {0}")]
    Payload(String),
}

/// Trait for transports to external tool servers
#[async_trait]
pub trait ToolServerTransport: Send + Sync {
    /// List the tools the server advertises
    async fn list_tools(&self) -> Result<Vec<RemoteToolDef>, TransportError>;

    /// Invoke a tool by its raw (server-side) name
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, TransportError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListToolsResponse {
    tools: Vec<RemoteToolDef>,
}

#[derive(Debug, Serialize)]
struct CallToolRequest<'a> {
    arguments: &'a Value,
}

/// HTTP tool server transport
#[derive(Debug, Clone)]
pub struct HttpToolServer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpToolServer {
    /// Create a transport for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a transport with a preconfigured client
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// The server's base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ToolServerTransport for HttpToolServer {
    async fn list_tools(&self) -> Result<Vec<RemoteToolDef>, TransportError> {
        let url = format!("{}/tools", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: ListToolsResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Payload(e.to_string()))?;
        Ok(body.tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, TransportError> {
        let url = format!("{}/tools/{}", self.base_url, name);
        let response = self
            .client
            .post(&url)
            .json(&CallToolRequest {
                arguments: &arguments,
            })
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::Payload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let transport = HttpToolServer::new("http://localhost:9000/");
        assert_eq!(transport.base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_remote_tool_def_defaults() {
        let def: RemoteToolDef = serde_json::from_str(r#"{"name": "lookup"}"#).unwrap();
        assert_eq!(def.name, "lookup");
        assert!(def.description.is_none());
        assert_eq!(def.input_schema["type"], "object");
    }
}
