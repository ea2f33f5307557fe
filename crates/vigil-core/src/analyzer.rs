//! Request/response analysis: fills the prompt template and picks single-shot
//! or chunked analysis by response size.

use crate::agent::{Agent, Outcome};
use crate::chunk::ChunkAnalyzer;

/// Placeholder replaced with the captured request.
pub const REQUEST_PLACEHOLDER: &str = "{REQUEST}";
/// Placeholder replaced with the captured response (or one window of it).
pub const RESPONSE_PLACEHOLDER: &str = "{RESPONSE}";

pub struct Analyzer<'a> {
    agent: &'a Agent,
    template: String,
    system_prompt: Option<String>,
    max_chunk_size: usize,
    max_tokens: u32,
}

impl<'a> Analyzer<'a> {
    pub fn new(agent: &'a Agent, template: impl Into<String>, max_chunk_size: usize, max_tokens: u32) -> Self {
        Self {
            agent,
            template: template.into(),
            system_prompt: None,
            max_chunk_size,
            max_tokens,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    fn fill(&self, request: &str, response: &str) -> String {
        self.template
            .replace(REQUEST_PLACEHOLDER, request)
            .replace(RESPONSE_PLACEHOLDER, response)
    }

    /// Analyze one request/response pair.
    pub async fn analyze(&self, request: &str, response: &str) -> Outcome {
        let system = self.system_prompt.as_deref();
        if response.chars().count() > self.max_chunk_size {
            ChunkAnalyzer::new(self.agent, system, self.max_tokens)
                .analyze_large(response, self.max_chunk_size, |window| self.fill(request, window))
                .await
        } else {
            let prompt = self.fill(request, response);
            self.agent.run(system, &prompt, self.max_tokens).await
        }
    }
}
