//! Byte-level channels to one MCP server.
//!
//! A transport delivers every inbound message to a single handler from one
//! background task, independently of `send`.

mod sse;
mod stdio;

pub use sse::SseTransport;
pub use stdio::StdioTransport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::McpError;

/// Callback invoked with each complete inbound JSON-RPC message.
pub type MessageHandler = Arc<dyn Fn(String) + Send + Sync>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A duplex message channel to one server.
pub trait Transport: Send + Sync {
    /// Open the channel and begin delivering inbound messages to `handler`.
    fn start(&self, handler: MessageHandler) -> BoxFuture<'_, Result<(), McpError>>;

    /// Write one outbound message.
    fn send(&self, message: String) -> BoxFuture<'_, Result<(), McpError>>;

    /// Close the channel. Safe to call when not started.
    fn stop(&self) -> BoxFuture<'_, ()>;
}
