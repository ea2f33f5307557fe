//! MCP manager: the live client set, per-server status, and tool ownership.
//!
//! Shared by every conversation. Reads (dispatch, listing) race with writes
//! (reload, re-listing), so each map sits behind its own lock and is replaced
//! wholesale rather than edited in place.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use vigil_types::{Provenance, ToolDescriptor, ToolSource};

use crate::client::McpClient;
use crate::config::McpConfig;

/// Connection status of one configured server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Connecting,
    Connected,
    Failed(String),
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("CONNECTING"),
            Self::Connected => f.write_str("CONNECTED"),
            Self::Failed(reason) => write!(f, "FAILED: {reason}"),
        }
    }
}

pub type StatusMap = HashMap<String, ServerStatus>;

/// Owns every MCP client and routes tool calls to them.
pub struct McpManager {
    clients: RwLock<Vec<Arc<McpClient>>>,
    owners: RwLock<HashMap<String, Arc<McpClient>>>,
    status: watch::Sender<StatusMap>,
    reload_lock: Mutex<()>,
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

impl McpManager {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(Vec::new()),
            owners: RwLock::new(HashMap::new()),
            status: watch::Sender::new(HashMap::new()),
            reload_lock: Mutex::new(()),
        }
    }

    /// Stop all current clients, then start one per configured server.
    ///
    /// Old clients are fully stopped before any new one starts. Servers that
    /// fail are marked `FAILED` and skipped. Concurrent reloads run one at a
    /// time.
    pub async fn reload(&self, config: &McpConfig) {
        let _guard = self.reload_lock.lock().await;

        let old = std::mem::take(&mut *self.clients.write().unwrap_or_else(PoisonError::into_inner));
        self.owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        for client in old {
            client.stop().await;
        }
        self.status.send_replace(HashMap::new());

        if !config.enabled {
            tracing::info!("MCP disabled; no servers started");
            return;
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        let mut starting = JoinSet::new();
        for (index, server) in config.servers.iter().enumerate() {
            self.set_status(&server.name, ServerStatus::Connecting);
            let client = Arc::new(McpClient::new(server, timeout));
            starting.spawn(async move {
                let result = client.start().await;
                (index, client, result)
            });
        }

        let mut started: Vec<Option<Arc<McpClient>>> = vec![None; config.servers.len()];
        while let Some(joined) = starting.join_next().await {
            let (index, client, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("MCP start task failed: {e}");
                    continue;
                }
            };
            match result {
                Ok(()) => {
                    self.set_status(client.name(), ServerStatus::Connected);
                    started[index] = Some(client);
                }
                Err(e) => {
                    tracing::warn!("Failed to start MCP server '{}': {e}", client.name());
                    self.set_status(client.name(), ServerStatus::Failed(e.to_string()));
                }
            }
        }

        *self.clients.write().unwrap_or_else(PoisonError::into_inner) =
            started.into_iter().flatten().collect();
    }

    fn set_status(&self, server: &str, status: ServerStatus) {
        self.status.send_modify(|map| {
            map.insert(server.to_string(), status);
        });
    }

    /// Snapshot of every server's status.
    pub fn statuses(&self) -> StatusMap {
        self.status.borrow().clone()
    }

    /// Observe status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusMap> {
        self.status.subscribe()
    }

    /// Live (initialized) clients in configuration order.
    pub fn clients(&self) -> Vec<Arc<McpClient>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Name of the server that last listed `tool`, if any.
    pub fn owner_of(&self, tool: &str) -> Option<String> {
        self.owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tool)
            .map(|c| c.name().to_string())
    }

    /// List tools across all live clients and rebuild the ownership map.
    ///
    /// When two servers expose the same name the later one wins.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let mut descriptors = Vec::new();
        let mut owners = HashMap::new();
        for client in self.clients() {
            for tool in client.list_tools().await {
                owners.insert(tool.name.clone(), Arc::clone(&client));
                descriptors.push(ToolDescriptor {
                    name: tool.name,
                    description: tool.description,
                    parameters: tool.input_schema,
                    provenance: Provenance::Mcp {
                        server: client.name().to_string(),
                    },
                });
            }
        }
        *self.owners.write().unwrap_or_else(PoisonError::into_inner) = owners;
        descriptors
    }

    /// Call `tool` on its owner. `None` means no live server owns it.
    pub async fn call_tool(&self, tool: &str, arguments: serde_json::Value) -> Option<String> {
        let owner = self
            .owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tool)
            .cloned()?;
        match owner.call_tool(tool, arguments).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("MCP tool '{tool}' on '{}' failed: {e}", owner.name());
                Some(format!("Error executing MCP tool {tool}: {e}"))
            }
        }
    }

    /// Stop every client.
    pub async fn shutdown(&self) {
        let _guard = self.reload_lock.lock().await;
        let old = std::mem::take(&mut *self.clients.write().unwrap_or_else(PoisonError::into_inner));
        self.owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        for client in old {
            client.stop().await;
        }
    }
}

impl ToolSource for McpManager {
    fn descriptors(&self) -> Pin<Box<dyn Future<Output = Vec<ToolDescriptor>> + Send + '_>> {
        Box::pin(self.list_tools())
    }

    fn owns(&self, name: &str) -> bool {
        self.owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn call<'a>(
        &'a self,
        name: &'a str,
        arguments: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(self.call_tool(name, arguments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpServerConfig;

    #[test]
    fn status_display() {
        assert_eq!(ServerStatus::Connecting.to_string(), "CONNECTING");
        assert_eq!(ServerStatus::Connected.to_string(), "CONNECTED");
        assert_eq!(
            ServerStatus::Failed("boom".into()).to_string(),
            "FAILED: boom"
        );
    }

    #[tokio::test]
    async fn empty_config_starts_no_servers() {
        let manager = McpManager::new();
        manager.reload(&McpConfig::default()).await;
        assert!(manager.clients().is_empty());
        assert!(manager.list_tools().await.is_empty());
        assert!(manager.statuses().is_empty());
    }

    #[tokio::test]
    async fn unowned_tool_is_not_an_mcp_tool() {
        let manager = McpManager::new();
        assert_eq!(manager.call_tool("run_cmd", serde_json::json!({})).await, None);
    }

    #[tokio::test]
    async fn disabled_config_starts_nothing() {
        let manager = McpManager::new();
        let config = McpConfig {
            enabled: false,
            servers: vec![McpServerConfig::stdio("fs", "cat")],
            ..McpConfig::default()
        };
        manager.reload(&config).await;
        assert!(manager.clients().is_empty());
        assert!(manager.statuses().is_empty());
    }
}
