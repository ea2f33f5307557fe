//! read_file: returns a local file's text, refusing large files.

use serde::Deserialize;
use vigil_types::{Provenance, Tool, ToolDescriptor, ToolError};

/// Files larger than this are rejected rather than truncated.
pub const MAX_READ_BYTES: u64 = 50_000;

pub struct ReadFileTool;

#[derive(Deserialize)]
struct ReadInput {
    path: String,
}

impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "read_file".to_string(),
            description: "Read the content of a file from the local file system. \
                          Use this to analyze source code or config files."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "The absolute path to the file."
                    }
                },
                "required": ["path"]
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
            let input: ReadInput =
                serde_json::from_value(input).map_err(|e| ToolError::InvalidInput {
                    tool: "read_file".into(),
                    message: e.to_string(),
                })?;

            let meta = tokio::fs::metadata(&input.path)
                .await
                .map_err(|_| ToolError::ExecutionFailed(format!("File not found: {}", input.path)))?;
            if !meta.is_file() {
                return Err(ToolError::ExecutionFailed(format!(
                    "Not a file: {}",
                    input.path
                )));
            }
            if meta.len() > MAX_READ_BYTES {
                return Err(ToolError::ExecutionFailed(format!(
                    "File too large to read directly (Size: {} bytes). Max 50KB.",
                    meta.len()
                )));
            }

            let bytes = tokio::fs::read(&input.path)
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("{}: {e}", input.path)))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_small_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "line one\nline two\n").unwrap();

        let out = ReadFileTool
            .execute(serde_json::json!({"path": file.path()}))
            .await
            .unwrap();
        assert_eq!(out, "line one\nline two\n");
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![b'a'; 50_001]).unwrap();

        let err = ReadFileTool
            .execute(serde_json::json!({"path": file.path()}))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "File too large to read directly (Size: 50001 bytes). Max 50KB."
        );
    }

    #[tokio::test]
    async fn limit_is_inclusive() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![b'a'; 50_000]).unwrap();
        let out = ReadFileTool
            .execute(serde_json::json!({"path": file.path()}))
            .await
            .unwrap();
        assert_eq!(out.len(), 50_000);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = ReadFileTool
            .execute(serde_json::json!({"path": "/nonexistent/vigil/file.txt"}))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("File not found"));
    }

    #[tokio::test]
    async fn missing_path_is_invalid_input() {
        let err = ReadFileTool
            .execute(serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { .. }));
    }
}
