//! run_cmd: runs a shell command line and returns its combined output.

use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use vigil_types::{Provenance, Tool, ToolDescriptor, ToolError};

use crate::process::{combined_output, shell};

/// Default timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Built-in command tool. Only registered when enabled in configuration;
/// otherwise `run_cmd` resolves like any other script tool.
pub struct RunCommandTool {
    cwd: Option<PathBuf>,
}

#[derive(Deserialize)]
struct CommandInput {
    command: String,
    #[serde(default)]
    timeout: Option<u64>,
}

impl RunCommandTool {
    pub const NAME: &'static str = "run_cmd";

    pub fn new(cwd: Option<PathBuf>) -> Self {
        Self { cwd }
    }
}

impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: Self::NAME.to_string(),
            description: "Execute a system command and return its combined stdout and stderr. \
                          Commands time out after 2 minutes by default."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The command line to execute"
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Timeout in milliseconds (max 600000)"
                    }
                },
                "required": ["command"]
            }),
            provenance: Provenance::Builtin,
        }
    }

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, ToolError>> + Send + '_>>
    {
        Box::pin(async move {
            let input: CommandInput =
                serde_json::from_value(input).map_err(|e| ToolError::InvalidInput {
                    tool: Self::NAME.into(),
                    message: e.to_string(),
                })?;
            let timeout_ms = input.timeout.unwrap_or(DEFAULT_TIMEOUT_MS).min(600_000);

            let mut cmd = shell(&input.command);
            cmd.stdin(Stdio::null());
            if let Some(cwd) = &self.cwd {
                cmd.current_dir(cwd);
            }
            tracing::debug!("run_cmd: {}", input.command);

            let (text, status) = tokio::time::timeout(
                std::time::Duration::from_millis(timeout_ms),
                combined_output(cmd),
            )
            .await
            .map_err(|_| ToolError::Timeout { timeout_ms })?
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to spawn command: {e}")))?;

            if text.is_empty() && !status.success() {
                return Ok(format!(
                    "Command exited with code {}",
                    status.code().unwrap_or(-1)
                ));
            }
            Ok(text)
        })
    }
}
