//! In-flight request table shared by the send path and the inbound handler.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::jsonrpc::{JsonRpcError, JsonRpcMessage};

type Outcome = Result<serde_json::Value, JsonRpcError>;

#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<u64, oneshot::Sender<Outcome>>>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Outcome>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `id` before its request is written.
    pub(crate) fn register(&self, id: u64) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        rx
    }

    /// Abandon `id`; a late response for it will be dropped.
    pub(crate) fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Drop every waiter. Their receivers observe a closed channel.
    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Route one raw inbound line. Returns whether it completed a waiter.
    pub(crate) fn dispatch(&self, raw: &str) -> bool {
        let message: JsonRpcMessage = match serde_json::from_str(raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Failed to parse MCP message: {e}: {raw}");
                return false;
            }
        };
        let Some(id) = message.response_id() else {
            tracing::debug!("Ignoring MCP server message: {raw}");
            return false;
        };
        let waiter = self.lock().remove(&id);
        match waiter {
            Some(tx) => tx.send(message.into_outcome()).is_ok(),
            None => {
                tracing::debug!("Dropping MCP response with no pending request (id {id})");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_resolves_registered_id() {
        let table = PendingTable::default();
        let rx = table.register(4);
        assert!(table.dispatch(r#"{"jsonrpc":"2.0","id":4,"result":{"ok":true}}"#));
        assert_eq!(rx.await.unwrap().unwrap()["ok"], true);
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn dispatch_rejects_on_error_field() {
        let table = PendingTable::default();
        let rx = table.register(1);
        table.dispatch(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-1,"message":"bad"}}"#);
        assert_eq!(rx.await.unwrap().unwrap_err().message, "bad");
    }

    #[test]
    fn unknown_id_is_dropped() {
        let table = PendingTable::default();
        let _rx = table.register(1);
        assert!(!table.dispatch(r#"{"jsonrpc":"2.0","id":99,"result":{}}"#));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn removed_id_drops_late_response() {
        let table = PendingTable::default();
        let _rx = table.register(2);
        table.remove(2);
        assert!(!table.dispatch(r#"{"jsonrpc":"2.0","id":2,"result":{}}"#));
    }

    #[test]
    fn garbage_and_notifications_are_ignored() {
        let table = PendingTable::default();
        assert!(!table.dispatch("not json"));
        assert!(!table.dispatch(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#));
    }
}
