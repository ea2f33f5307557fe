//! MCP client: one JSON-RPC session with one server.
//!
//! Handles the handshake (`initialize` + `notifications/initialized`), tool
//! discovery (`tools/list`), and invocation (`tools/call`). Requests are
//! correlated through a pending table keyed by a per-client id counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::{McpServerConfig, TransportKind};
use crate::error::McpError;
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest};
use crate::pending::PendingTable;
use crate::transport::{MessageHandler, SseTransport, StdioTransport, Transport};

/// MCP protocol version we support.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Lifecycle of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Stopped,
    Starting,
    Initialized,
}

/// Information about a tool exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema", rename = "inputSchema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

#[derive(Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<McpToolInfo>,
}

/// Client for a single MCP server.
pub struct McpClient {
    name: String,
    transport: Arc<dyn Transport>,
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
    state: Mutex<ClientState>,
    timeout: Duration,
}

impl McpClient {
    /// Build a client for `config` using the transport its kind names.
    pub fn new(config: &McpServerConfig, timeout: Duration) -> Self {
        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::Stdio => Arc::new(StdioTransport::new(&config.command)),
            TransportKind::Sse => Arc::new(SseTransport::new(&config.command)),
        };
        Self::with_transport(&config.name, transport, timeout)
    }

    pub fn with_transport(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            pending: Arc::new(PendingTable::default()),
            next_id: AtomicU64::new(1),
            state: Mutex::new(ClientState::Stopped),
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ClientState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Open the transport and perform the handshake.
    ///
    /// On failure the transport is stopped and the client stays unusable.
    pub async fn start(&self) -> Result<(), McpError> {
        self.set_state(ClientState::Starting);
        match self.handshake().await {
            Ok(()) => {
                self.set_state(ClientState::Initialized);
                tracing::info!("MCP server '{}' initialized", self.name);
                Ok(())
            }
            Err(e) => {
                self.stop().await;
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> Result<(), McpError> {
        let pending = Arc::clone(&self.pending);
        let handler: MessageHandler = Arc::new(move |message: String| {
            pending.dispatch(&message);
        });
        self.transport.start(handler).await?;

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "vigil",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "sampling": {},
                "roots": {}
            }
        });
        self.request("initialize", Some(params)).await?;
        self.notify("notifications/initialized", Some(json!({})))
            .await
    }

    /// Issue a request and wait for its result.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        if self.state() == ClientState::Stopped {
            return Err(McpError::NotRunning);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let rx = self.pending.register(id);
        if let Err(e) = self.transport.send(message).await {
            self.pending.remove(id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(err))) => Err(McpError::JsonRpc {
                code: err.code,
                message: err.message,
            }),
            Ok(Err(_)) => Err(McpError::Protocol("response channel dropped".into())),
            Err(_) => {
                self.pending.remove(id);
                Err(McpError::Timeout {
                    method: method.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Send a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let message = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.transport.send(message).await
    }

    /// List the server's tools. Any failure yields an empty list.
    pub async fn list_tools(&self) -> Vec<McpToolInfo> {
        let result = match self.request("tools/list", None).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Failed to list tools for '{}': {e}", self.name);
                return Vec::new();
            }
        };
        match serde_json::from_value::<ToolsListResult>(result) {
            Ok(list) => list.tools,
            Err(e) => {
                tracing::warn!("Malformed tools/list result from '{}': {e}", self.name);
                Vec::new()
            }
        }
    }

    /// Invoke a tool and flatten its text content.
    ///
    /// A result flagged `isError` comes back as text prefixed `Error: `; a
    /// result without `content` is returned as its raw JSON.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, McpError> {
        let result = self
            .request("tools/call", Some(json!({"name": tool, "arguments": arguments})))
            .await?;
        Ok(flatten_tool_result(&result))
    }

    /// Stop the transport and abandon in-flight requests.
    pub async fn stop(&self) {
        self.set_state(ClientState::Stopped);
        self.transport.stop().await;
        self.pending.clear();
    }
}

fn flatten_tool_result(result: &Value) -> String {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return result.to_string();
    };
    let text: String = content
        .iter()
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect();
    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        format!("Error: {text}")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_tool_info() {
        let json = r#"{
            "name": "read_file",
            "description": "Read a file",
            "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}}
        }"#;
        let info: McpToolInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.name, "read_file");
        assert_eq!(info.input_schema["properties"]["path"]["type"], "string");
    }

    #[test]
    fn tool_info_defaults() {
        let info: McpToolInfo = serde_json::from_str(r#"{"name": "list"}"#).unwrap();
        assert_eq!(info.description, "");
        assert_eq!(info.input_schema["type"], "object");
    }

    #[test]
    fn flatten_concatenates_text_items() {
        let result = json!({
            "content": [
                {"type": "text", "text": "first "},
                {"type": "image", "data": "...", "mimeType": "image/png"},
                {"type": "text", "text": "second"}
            ]
        });
        assert_eq!(flatten_tool_result(&result), "first second");
    }

    #[test]
    fn flatten_marks_error_results() {
        let result = json!({"content": [{"type": "text", "text": "not found"}], "isError": true});
        assert_eq!(flatten_tool_result(&result), "Error: not found");
    }

    #[test]
    fn flatten_without_content_returns_raw_json() {
        let result = json!({"value": 3});
        assert_eq!(flatten_tool_result(&result), r#"{"value":3}"#);
    }

    #[tokio::test]
    async fn request_on_stopped_client_fails() {
        let client = McpClient::new(&McpServerConfig::stdio("x", "cat"), Duration::from_secs(1));
        assert_eq!(client.state(), ClientState::Stopped);
        let err = client.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::NotRunning));
        assert!(client.list_tools().await.is_empty());
    }
}
