//! MCP (Model Context Protocol) client implementation for Vigil.
//!
//! Each configured server gets one [`McpClient`] speaking JSON-RPC 2.0 over
//! either a child process's stdin/stdout or an SSE stream with a POST side
//! channel. [`McpManager`] owns the live clients, their status, and the
//! tool-to-server ownership map consulted at dispatch time.

pub mod client;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod manager;
mod pending;
pub mod transport;

pub use client::{ClientState, McpClient, McpToolInfo};
pub use config::{McpConfig, McpServerConfig, TransportKind};
pub use error::McpError;
pub use manager::{McpManager, ServerStatus, StatusMap};
pub use transport::{MessageHandler, SseTransport, StdioTransport, Transport};
