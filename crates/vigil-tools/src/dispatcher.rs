//! Name-based tool dispatch across built-in, MCP, and script tools.

use std::path::PathBuf;
use std::sync::Arc;

use vigil_types::{Tool, ToolDescriptor, ToolError, ToolSource};

use crate::blacklist::{Blacklist, ConfirmHandler};
use crate::http::{RequestSender, SendRequestTool};
use crate::{ListFilesTool, ReadFileTool, RunCommandTool, script};

/// Where a call goes, decided once per call.
enum Route {
    Builtin(Arc<dyn Tool>),
    Mcp(Arc<dyn ToolSource>),
    Script,
}

/// Resolves tool names and executes them, always producing text.
///
/// Resolution order is built-ins, then MCP tools owned according to the last
/// listing, then scripts in the tools directory.
#[derive(Default)]
pub struct ToolDispatcher {
    builtins: Vec<Arc<dyn Tool>>,
    remote: Option<Arc<dyn ToolSource>>,
    tools_dir: Option<PathBuf>,
    blacklist: Blacklist,
    confirm: Option<Arc<dyn ConfirmHandler>>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in tools. `run_cmd` is only built in when enabled;
    /// otherwise that name resolves through the tools directory.
    pub fn with_builtins(mut self, sender: Arc<dyn RequestSender>, run_cmd: bool) -> Self {
        self.register(Arc::new(SendRequestTool::new(sender)));
        self.register(Arc::new(ReadFileTool));
        self.register(Arc::new(ListFilesTool));
        if run_cmd {
            self.register(Arc::new(RunCommandTool::new(None)));
        }
        self
    }

    /// Register a built-in tool, replacing any with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.builtins.retain(|t| t.name() != tool.name());
        self.builtins.push(tool);
    }

    pub fn with_remote(mut self, remote: Arc<dyn ToolSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_tools_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tools_dir = Some(dir.into());
        self
    }

    pub fn with_blacklist(mut self, blacklist: Blacklist) -> Self {
        self.blacklist = blacklist;
        self
    }

    pub fn with_confirm_handler(mut self, handler: Arc<dyn ConfirmHandler>) -> Self {
        self.confirm = Some(handler);
        self
    }

    pub fn tools_dir(&self) -> Option<&PathBuf> {
        self.tools_dir.as_ref()
    }

    /// Every tool the model may call: built-ins, then MCP tools, then script
    /// definitions. Listing MCP tools refreshes their ownership.
    pub async fn list_available(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> = self.builtins.iter().map(|t| t.descriptor()).collect();
        if let Some(remote) = &self.remote {
            tools.extend(remote.descriptors().await);
        }
        if let Some(dir) = &self.tools_dir {
            tools.extend(script::load_definitions(dir));
        }
        tools
    }

    fn route(&self, name: &str) -> Route {
        if let Some(tool) = self.builtins.iter().find(|t| t.name() == name) {
            return Route::Builtin(Arc::clone(tool));
        }
        match &self.remote {
            Some(remote) if remote.owns(name) => Route::Mcp(Arc::clone(remote)),
            _ => Route::Script,
        }
    }

    /// Execute `name` with the model's raw JSON argument string.
    ///
    /// Failures come back as `Error...` text so the model can react to them.
    pub async fn execute(&self, name: &str, raw_arguments: &str) -> String {
        let raw_arguments = if raw_arguments.trim().is_empty() {
            "{}"
        } else {
            raw_arguments
        };
        tracing::debug!(tool = name, "Dispatching tool call");

        match self.route(name) {
            Route::Builtin(tool) => {
                if tool.name() == RunCommandTool::NAME
                    && !self.cleared(name, raw_arguments).await
                {
                    return declined(name);
                }
                let result = match parse_arguments(name, raw_arguments) {
                    Ok(input) => tool.execute(input).await,
                    Err(e) => Err(e),
                };
                result.unwrap_or_else(|e| format!("Error: {e}"))
            }
            Route::Mcp(remote) => {
                let input = match parse_arguments(name, raw_arguments) {
                    Ok(input) => input,
                    Err(e) => return format!("Error: {e}"),
                };
                match remote.call(name, input).await {
                    Some(text) => text,
                    // Server went away since the last listing.
                    None => self.run_script_tool(name, raw_arguments).await,
                }
            }
            Route::Script => self.run_script_tool(name, raw_arguments).await,
        }
    }

    async fn run_script_tool(&self, name: &str, raw_arguments: &str) -> String {
        let Some(dir) = &self.tools_dir else {
            return "Error: Tools directory not configured.".to_string();
        };
        let Some(path) = script::find_script(dir, name) else {
            return format!("Error: Tool script not found for {name}");
        };

        if !self.cleared(name, raw_arguments).await {
            return declined(name);
        }

        match script::run_script(&path, raw_arguments).await {
            Ok(output) => output,
            Err(e) => format!("Error executing tool: {e}"),
        }
    }

    /// Whether a command-executing call may proceed. Calls with no
    /// blacklisted term pass; flagged calls need the confirm handler's
    /// approval, and are refused when there is no handler.
    async fn cleared(&self, name: &str, raw_arguments: &str) -> bool {
        if !self.blacklist.flags(name, raw_arguments) {
            return true;
        }
        tracing::warn!(tool = name, "Blacklisted term in tool call, asking for confirmation");
        match &self.confirm {
            Some(handler) => handler.confirm(name, raw_arguments).await,
            None => false,
        }
    }
}

fn declined(name: &str) -> String {
    let declined = ToolError::Declined {
        tool: name.to_string(),
    };
    format!("Error: {declined}")
}

fn parse_arguments(tool: &str, raw: &str) -> Result<serde_json::Value, ToolError> {
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidInput {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use vigil_types::Provenance;

    struct Echo;

    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "echo".into(),
                description: "Echo input".into(),
                parameters: serde_json::json!({"type": "object"}),
                provenance: Provenance::Builtin,
            }
        }

        fn execute(
            &self,
            input: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + '_>> {
            Box::pin(async move { Ok(input.to_string()) })
        }
    }

    #[tokio::test]
    async fn empty_arguments_become_empty_object() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register(Arc::new(Echo));
        assert_eq!(dispatcher.execute("echo", "  ").await, "{}");
    }

    #[tokio::test]
    async fn invalid_builtin_arguments_are_reported() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register(Arc::new(Echo));
        let out = dispatcher.execute("echo", "{oops").await;
        assert!(out.starts_with("Error: Invalid input for tool 'echo'"), "{out}");
    }

    #[tokio::test]
    async fn unknown_tool_without_dir_is_an_error_string() {
        let dispatcher = ToolDispatcher::new();
        assert_eq!(
            dispatcher.execute("nmap", "{}").await,
            "Error: Tools directory not configured."
        );
    }

    #[test]
    fn register_replaces_same_name() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register(Arc::new(Echo));
        dispatcher.register(Arc::new(Echo));
        assert_eq!(dispatcher.builtins.len(), 1);
    }
}
