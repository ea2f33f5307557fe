//! Tool traits and descriptors.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::message::{FunctionDefinition, ToolDefinition};

/// Where a tool comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Builtin,
    Mcp { server: String },
    /// Declared in the local definition file; `script` is the resolved file
    /// if one exists yet.
    Script { script: Option<PathBuf> },
}

/// A tool as offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: serde_json::Value,
    pub provenance: Provenance,
}

impl ToolDescriptor {
    /// The API-facing definition (provenance is host-side only).
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }

    /// Build a descriptor from a definition-file entry.
    pub fn from_definition(def: ToolDefinition, provenance: Provenance) -> Self {
        Self {
            name: def.function.name,
            description: def.function.description,
            parameters: def.function.parameters,
            provenance,
        }
    }
}

/// A tool executed in-process.
pub trait Tool: Send + Sync {
    /// The unique name of this tool (used in API requests).
    fn name(&self) -> &str;

    /// Descriptor sent to the model.
    fn descriptor(&self) -> ToolDescriptor;

    /// Execute with the parsed JSON arguments object.
    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, crate::error::ToolError>> + Send + '_>>;
}

/// A remote set of tools whose ownership is only known at runtime.
///
/// Implemented by the MCP manager. `call` resolves to `None` when no live
/// server owns `name`, letting the caller fall through to other sources.
pub trait ToolSource: Send + Sync {
    /// List tools from every live server, refreshing ownership as a side effect.
    fn descriptors(&self) -> Pin<Box<dyn Future<Output = Vec<ToolDescriptor>> + Send + '_>>;

    /// Whether `name` is owned according to the last listing.
    fn owns(&self, name: &str) -> bool;

    /// Invoke `name` on its owning server.
    fn call<'a>(
        &'a self,
        name: &'a str,
        arguments: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
}
