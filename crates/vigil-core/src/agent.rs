//! The conversation loop that drives tool use until the model settles on an answer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vigil_tools::ToolDispatcher;
use vigil_types::{ChatMessage, ChatProvider, ChatRequest, ResponseMessage, Usage, preview};

/// Characters of tool output shown in [`AgentEvent::ToolEnd`].
pub const TOOL_PREVIEW_CHARS: usize = 500;

/// Prefix for user messages injected mid-run.
pub const INTERVENTION_TAG: &str = "[User Intervention]: ";

/// Tool that content-embedded `{"command": ...}` objects are routed to.
const COMMAND_TOOL: &str = "run_cmd";

static EMBEDDED_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{[\s\S]*?"command"[\s\S]*?\}"#).expect("valid regex"));

/// Events emitted by the agent during execution, in causal order.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A queued user message was folded into the conversation.
    Intervention(String),
    /// Model reasoning, informational only.
    Reasoning(String),
    /// Text the model sent alongside tool calls.
    Thought(String),
    /// A tool is about to be executed.
    ToolStart { name: String, arguments: String },
    /// A tool has finished; `preview` is shortened for display.
    ToolEnd { name: String, preview: String },
    /// Usage summed over the run so far.
    Usage(Usage),
    /// A chunked analysis is starting window `part` of `total`.
    ChunkStart { part: usize, total: usize },
    /// A chunked analysis finished window `part` with `result`.
    ChunkDone {
        part: usize,
        total: usize,
        result: String,
    },
    /// The run was cancelled.
    Cancelled,
    /// The run failed.
    Error(String),
    /// The model produced its final answer.
    Done,
}

/// How a run ended. Every failure path resolves to one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answer(String),
    Cancelled,
    Failed(String),
}

impl Outcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// Text to show the user.
    pub fn into_text(self) -> String {
        match self {
            Outcome::Answer(text) => text,
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Answer(text) => f.write_str(text),
            Outcome::Cancelled => f.write_str("Analysis cancelled."),
            Outcome::Failed(reason) => write!(f, "Error: {reason}"),
        }
    }
}

/// Cloneable control surface for a running agent.
#[derive(Clone, Default)]
pub struct AgentHandle {
    interventions: Arc<Mutex<VecDeque<String>>>,
    cancel: CancellationToken,
}

impl AgentHandle {
    /// Queue a user message for the next outbound request.
    pub fn inject(&self, message: impl Into<String>) {
        self.queue().push_back(message.into());
    }

    /// Stop the run. An in-flight chat request is aborted; an in-flight tool
    /// is left to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Messages queued but not yet sent.
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Take every queued message, oldest first.
    pub(crate) fn drain(&self) -> Vec<String> {
        self.queue().drain(..).collect()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.interventions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives one conversation: chat call, tool execution, repeat.
pub struct Agent {
    provider: Arc<dyn ChatProvider>,
    dispatcher: Arc<ToolDispatcher>,
    model: String,
    handle: AgentHandle,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        dispatcher: Arc<ToolDispatcher>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            model: model.into(),
            handle: AgentHandle::default(),
            events: None,
        }
    }

    /// Send [`AgentEvent`]s to `tx`. Events are dropped once the receiver is gone.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    pub(crate) fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    pub(crate) fn cancelled(&self) -> Outcome {
        self.emit(AgentEvent::Cancelled);
        Outcome::Cancelled
    }

    /// Run the conversation until the model answers without calling tools.
    pub async fn run(&self, system_prompt: Option<&str>, user_prompt: &str, max_tokens: u32) -> Outcome {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(user_prompt));

        let mut total_usage = Usage::default();
        let mut turn = 0usize;

        loop {
            if self.handle.is_cancelled() {
                return self.cancelled();
            }
            for note in self.handle.drain() {
                messages.push(ChatMessage::user(format!("{INTERVENTION_TAG}{note}")));
                self.emit(AgentEvent::Intervention(note));
            }

            let tools: Vec<_> = self
                .dispatcher
                .list_available()
                .await
                .iter()
                .map(|t| t.to_definition())
                .collect();
            tracing::debug!(turn, tools = tools.len(), "Sending chat request");
            let has_tools = !tools.is_empty();
            let request = ChatRequest {
                model: self.model.clone(),
                max_tokens,
                messages,
                tools: has_tools.then_some(tools),
                tool_choice: has_tools.then_some("auto"),
            };

            let result = tokio::select! {
                biased;
                _ = self.handle.cancel.cancelled() => return self.cancelled(),
                result = self.provider.complete(&request) => result,
            };
            messages = request.messages;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Chat request failed: {e}");
                    self.emit(AgentEvent::Error(e.to_string()));
                    return Outcome::Failed(e.to_string());
                }
            };
            if let Some(usage) = &response.usage {
                total_usage.add(usage);
            }
            let Some(choice) = response.choices.into_iter().next() else {
                self.emit(AgentEvent::Error("No response.".into()));
                return Outcome::Failed("No response.".to_string());
            };

            let message = choice.message;
            if let Some(reasoning) = message.reasoning() {
                self.emit(AgentEvent::Reasoning(reasoning.to_string()));
            }

            if message.calls().is_some() {
                if !self.run_tool_calls(message, &mut messages).await {
                    return self.cancelled();
                }
            } else {
                let content = message.content.unwrap_or_default();
                let Some(command) = embedded_command(&content) else {
                    let undelivered = self.handle.pending();
                    if undelivered > 0 {
                        tracing::warn!(
                            undelivered,
                            "Interventions arrived after the final request; kept for the next run"
                        );
                    }
                    self.emit(AgentEvent::Done);
                    self.emit(AgentEvent::Usage(total_usage));
                    return Outcome::Answer(content);
                };
                tracing::debug!("Found command object in plain content");
                messages.push(ChatMessage::assistant(content.clone()));
                let output = self.execute_tool(COMMAND_TOOL, command).await;
                messages.push(ChatMessage::user(format!("Tool Output: {output}")));
            }
            turn += 1;
        }
    }

    /// Execute every call in `message` in order and append the results.
    ///
    /// Returns `false` if cancellation was observed between calls.
    async fn run_tool_calls(&self, message: ResponseMessage, messages: &mut Vec<ChatMessage>) -> bool {
        if let Some(thought) = message.content.as_deref().filter(|c| !c.is_empty()) {
            self.emit(AgentEvent::Thought(thought.to_string()));
        }
        let calls = message.calls().map(|c| c.to_vec()).unwrap_or_default();
        messages.push(message.into_history());

        for call in calls {
            if self.handle.is_cancelled() {
                return false;
            }
            let output = self.execute_tool(call.name(), call.arguments()).await;
            messages.push(ChatMessage::tool_result(call.id, output));
        }
        true
    }

    async fn execute_tool(&self, name: &str, arguments: &str) -> String {
        self.emit(AgentEvent::ToolStart {
            name: name.to_string(),
            arguments: arguments.to_string(),
        });
        let output = self.dispatcher.execute(name, arguments).await;
        self.emit(AgentEvent::ToolEnd {
            name: name.to_string(),
            preview: preview(&output, TOOL_PREVIEW_CHARS),
        });
        output
    }
}

/// First `{...}` in `content` that parses as JSON with a `command` key.
fn embedded_command(content: &str) -> Option<&str> {
    let found = EMBEDDED_COMMAND.find(content)?.as_str();
    let value: serde_json::Value = serde_json::from_str(found).ok()?;
    value.get("command").map(|_| found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_command_takes_first_object() {
        let text = r#"Run this: {"command": "id"} then {"command": "ls"}"#;
        assert_eq!(embedded_command(text), Some(r#"{"command": "id"}"#));
    }

    #[test]
    fn embedded_command_requires_valid_json() {
        assert_eq!(embedded_command(r#"{ "command" is what I need }"#), None);
        assert_eq!(embedded_command("no braces here"), None);
    }

    #[test]
    fn outcome_text() {
        assert_eq!(Outcome::Cancelled.into_text(), "Analysis cancelled.");
        assert_eq!(Outcome::Failed("boom".into()).into_text(), "Error: boom");
        assert_eq!(Outcome::Answer("ok".into()).into_text(), "ok");
    }

    #[test]
    fn handle_drains_fifo() {
        let handle = AgentHandle::default();
        handle.inject("first");
        handle.inject("second");
        assert_eq!(handle.drain(), vec!["first", "second"]);
        assert!(handle.drain().is_empty());
    }

    #[test]
    fn handle_clones_share_cancellation() {
        let handle = AgentHandle::default();
        let other = handle.clone();
        other.cancel();
        assert!(handle.is_cancelled());
    }
}
