//! list_files: direct children of a directory, tagged by kind.

use serde::Deserialize;
use vigil_types::{Provenance, Tool, ToolDescriptor, ToolError};

pub struct ListFilesTool;

#[derive(Deserialize)]
struct ListInput {
    path: String,
}

impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "list_files".to_string(),
            description: "List files and directories in a given path.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "The absolute path to the directory."
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
            let input: ListInput =
                serde_json::from_value(input).map_err(|e| ToolError::InvalidInput {
                    tool: "list_files".into(),
                    message: e.to_string(),
                })?;

            let not_found = || ToolError::ExecutionFailed(format!("Directory not found: {}", input.path));
            let mut dir = tokio::fs::read_dir(&input.path).await.map_err(|_| not_found())?;

            let mut entries = Vec::new();
            while let Some(entry) = dir
                .next_entry()
                .await
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?
            {
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
            }
            entries.sort();

            Ok(entries
                .into_iter()
                .map(|(name, is_dir)| {
                    let tag = if is_dir { "[DIR]" } else { "[FILE]" };
                    format!("{tag} {name}\n")
                })
                .collect())
        })
    }
}
