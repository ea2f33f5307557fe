//! Stream transport: a long-lived SSE GET for inbound messages and a POST
//! side channel, announced by the server, for outbound ones.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{BoxFuture, MessageHandler, Transport};
use crate::error::McpError;

/// How long `send` waits for the server to announce its POST endpoint.
const ENDPOINT_WAIT: Duration = Duration::from_secs(2);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Splits a byte stream into trimmed, non-empty lines.
#[derive(Default)]
struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        lines
    }
}

/// SSE framing state: remembers the last `event:` name until its `data:` line.
#[derive(Debug, PartialEq)]
enum SseLine {
    Endpoint(String),
    Message(String),
}

#[derive(Default)]
struct SseFramer {
    event: Option<String>,
}

impl SseFramer {
    fn feed(&mut self, line: &str) -> Option<SseLine> {
        if let Some(name) = line.strip_prefix("event:") {
            self.event = Some(name.trim().to_string());
            return None;
        }
        let data = line.strip_prefix("data:")?.trim().to_string();
        match self.event.take().as_deref() {
            Some("endpoint") => Some(SseLine::Endpoint(data)),
            _ => Some(SseLine::Message(data)),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

/// SSE transport for MCP servers reachable over HTTP.
pub struct SseTransport {
    url: String,
    http: reqwest::Client,
    endpoint: Arc<watch::Sender<Option<Url>>>,
    running: Mutex<Option<Running>>,
}

impl SseTransport {
    pub fn new(url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            http,
            endpoint: Arc::new(watch::Sender::new(None)),
            running: Mutex::new(None),
        }
    }

    /// The POST endpoint announced by the server, once known.
    pub fn endpoint(&self) -> Option<Url> {
        self.endpoint.borrow().clone()
    }

    async fn connect(&self, handler: MessageHandler) -> Result<(), McpError> {
        let mut guard = self.running.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let base = Url::parse(&self.url)
            .map_err(|e| McpError::Transport(format!("invalid SSE URL '{}': {e}", self.url)))?;
        let response = self
            .http
            .get(base.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("SSE connection failed: {e}")))?;
        if !response.status().is_success() {
            return Err(McpError::Transport(format!(
                "SSE connection failed: {}",
                response.status().as_u16()
            )));
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let endpoint = Arc::clone(&self.endpoint);
        let reader = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();
            let mut framer = SseFramer::default();
            loop {
                let chunk = tokio::select! {
                    _ = token.cancelled() => break,
                    chunk = stream.next() => chunk,
                };
                let bytes = match chunk {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        tracing::warn!("SSE transport error: {e}");
                        break;
                    }
                    None => break,
                };
                for line in lines.push(&bytes) {
                    match framer.feed(&line) {
                        Some(SseLine::Endpoint(uri)) => match base.join(&uri) {
                            Ok(url) => {
                                tracing::info!("MCP SSE endpoint discovered: {url}");
                                endpoint.send_replace(Some(url));
                            }
                            Err(e) => tracing::warn!("Bad SSE endpoint '{uri}': {e}"),
                        },
                        Some(SseLine::Message(data)) => handler(data),
                        None => {}
                    }
                }
            }
            tracing::debug!("MCP SSE reader stopped");
        });

        *guard = Some(Running { cancel, reader });
        Ok(())
    }

    async fn post(&self, message: String) -> Result<(), McpError> {
        let mut rx = self.endpoint.subscribe();
        let url = match tokio::time::timeout(ENDPOINT_WAIT, rx.wait_for(Option::is_some)).await {
            Ok(Ok(url)) => url.clone(),
            _ => None,
        }
        .ok_or_else(|| {
            McpError::Transport("MCP POST endpoint not yet discovered via SSE".into())
        })?;

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(message)
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("failed to send message: {e}")))?;
        if !response.status().is_success() {
            return Err(McpError::Transport(format!(
                "failed to send message: {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(running) = self.running.lock().await.take() {
            running.cancel.cancel();
            let _ = running.reader.await;
        }
        self.endpoint.send_replace(None);
    }
}

impl Transport for SseTransport {
    fn start(&self, handler: MessageHandler) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(self.connect(handler))
    }

    fn send(&self, message: String) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(self.post(message))
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.disconnect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_handles_split_chunks() {
        let mut buf = SseLineBuffer::default();
        assert!(buf.push(b"event: end").is_empty());
        assert_eq!(buf.push(b"point\r\ndata: /rpc\n\n"), vec![
            "event: endpoint".to_string(),
            "data: /rpc".to_string()
        ]);
    }

    #[test]
    fn framer_pairs_endpoint_event_with_data() {
        let mut framer = SseFramer::default();
        assert_eq!(framer.feed("event: endpoint"), None);
        assert_eq!(
            framer.feed("data: /rpc?id=abc"),
            Some(SseLine::Endpoint("/rpc?id=abc".into()))
        );
        assert_eq!(
            framer.feed(r#"data: {"id":1}"#),
            Some(SseLine::Message(r#"{"id":1}"#.into()))
        );
    }

    #[test]
    fn framer_ignores_comments_and_other_fields() {
        let mut framer = SseFramer::default();
        assert_eq!(framer.feed(": keepalive"), None);
        assert_eq!(framer.feed("id: 5"), None);
        assert_eq!(framer.feed("event: message"), None);
        assert_eq!(framer.feed("data: x"), Some(SseLine::Message("x".into())));
    }

    #[test]
    fn relative_endpoint_resolves_against_stream_url() {
        let base = Url::parse("http://127.0.0.1:9000/sse").unwrap();
        assert_eq!(
            base.join("/rpc?id=abc").unwrap().as_str(),
            "http://127.0.0.1:9000/rpc?id=abc"
        );
        assert_eq!(
            base.join("http://other:1/post").unwrap().as_str(),
            "http://other:1/post"
        );
    }

    #[tokio::test]
    async fn send_without_endpoint_fails_after_wait() {
        let transport = SseTransport::new("http://127.0.0.1:9/sse");
        let started = std::time::Instant::now();
        let err = transport.send("{}".into()).await.unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
        assert!(started.elapsed() >= ENDPOINT_WAIT);
    }
}
