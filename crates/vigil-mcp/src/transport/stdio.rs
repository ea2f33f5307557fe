//! Pipe transport: a shell-wrapped child process speaking newline-delimited
//! JSON-RPC on stdin/stdout.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::{BoxFuture, MessageHandler, Transport};
use crate::error::McpError;

/// Grace period for the child to exit after stdin closes.
const EXIT_GRACE: Duration = Duration::from_secs(5);

struct Running {
    write_tx: mpsc::Sender<String>,
    child: Child,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Async stdio transport for communicating with an MCP server process.
pub struct StdioTransport {
    command: String,
    running: Mutex<Option<Running>>,
}

impl StdioTransport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            running: Mutex::new(None),
        }
    }

    fn shell_command(&self) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd.exe");
            cmd.arg("/c").arg(&self.command);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            cmd
        }
    }

    async fn spawn(&self, handler: MessageHandler) -> Result<(), McpError> {
        let mut guard = self.running.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut child = self
            .shell_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::SpawnFailed {
                command: self.command.clone(),
                source: e,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill().await;
            return Err(McpError::Transport("child stdio was not piped".into()));
        };

        // Writer task: drains channel and writes to child stdin
        let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
        let writer = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = write_rx.recv().await {
                let line = format!("{msg}\n");
                if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err()
                {
                    break;
                }
            }
        });

        // Reader task: one message per line. Bytes that are not UTF-8 are
        // replaced rather than ending the session.
        let reader = tokio::spawn(async move {
            let mut stdout = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match stdout.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim();
                        if !line.is_empty() {
                            handler(line.to_string());
                        }
                    }
                    Err(e) => {
                        tracing::warn!("MCP stdio read failed: {e}");
                        break;
                    }
                }
            }
            tracing::debug!("MCP stdio reader reached end of stream");
        });

        *guard = Some(Running {
            write_tx,
            child,
            reader,
            writer,
        });
        Ok(())
    }

    async fn write(&self, message: String) -> Result<(), McpError> {
        let write_tx = match self.running.lock().await.as_ref() {
            Some(running) => running.write_tx.clone(),
            None => return Err(McpError::NotRunning),
        };
        write_tx
            .send(message)
            .await
            .map_err(|_| McpError::Transport("writer channel closed".into()))
    }

    async fn shutdown(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let Running {
            write_tx,
            mut child,
            reader,
            writer,
        } = running;

        // Closing the channel ends the writer, which closes the child's stdin
        drop(write_tx);
        if tokio::time::timeout(EXIT_GRACE, child.wait()).await.is_err() {
            let _ = child.kill().await;
        }
        reader.abort();
        writer.abort();
    }
}

impl Transport for StdioTransport {
    fn start(&self, handler: MessageHandler) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(self.spawn(handler))
    }

    fn send(&self, message: String) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(self.write(message))
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}
