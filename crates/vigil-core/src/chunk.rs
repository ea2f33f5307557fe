//! Overlapping-window analysis of artifacts too large for one request.

use std::fmt::Write as _;

use vigil_types::tail_chars;

use crate::agent::{Agent, AgentEvent, INTERVENTION_TAG, Outcome};

/// Characters shared by consecutive windows.
pub const CHUNK_OVERLAP: usize = 500;

/// Longest summary carried into the next window, in characters.
pub const SUMMARY_CHARS: usize = 1500;

/// Summary used for the first window.
pub const FIRST_SUMMARY: &str = "None (Start of analysis)";

/// Split `text` into windows of `chunk_size` characters advancing by
/// `chunk_size - CHUNK_OVERLAP`. The last window ends at the end of `text`.
pub fn split_into_chunks(text: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let stride = if chunk_size > CHUNK_OVERLAP {
        chunk_size - CHUNK_OVERLAP
    } else {
        chunk_size
    };

    // Byte offset of every char boundary, including the end.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + chunk_size).min(len);
        chunks.push(&text[bounds[start]..bounds[end]]);
        if end == len {
            break;
        }
        start += stride;
    }
    chunks
}

/// Condense a window's result for the next window's prompt.
fn carry_summary(result: &str) -> String {
    let tail = tail_chars(result, SUMMARY_CHARS);
    if tail.len() == result.len() {
        result.to_string()
    } else {
        format!("...{tail}")
    }
}

/// Runs the agent once per window, carrying a summary between windows.
pub struct ChunkAnalyzer<'a> {
    agent: &'a Agent,
    system_prompt: Option<&'a str>,
    max_tokens: u32,
}

impl<'a> ChunkAnalyzer<'a> {
    pub fn new(agent: &'a Agent, system_prompt: Option<&'a str>, max_tokens: u32) -> Self {
        Self {
            agent,
            system_prompt,
            max_tokens,
        }
    }

    /// Analyze `artifact` window by window.
    ///
    /// `render` builds the task text for one window from its delimited
    /// content. The answer joins each window's result under a heading.
    pub async fn analyze_large<F>(&self, artifact: &str, chunk_size: usize, render: F) -> Outcome
    where
        F: Fn(&str) -> String,
    {
        let chunks = split_into_chunks(artifact, chunk_size);
        let total = chunks.len();
        tracing::info!(
            chars = artifact.chars().count(),
            total,
            "Splitting artifact into chunks"
        );

        let handle = self.agent.handle();
        let mut summary = FIRST_SUMMARY.to_string();
        let mut report = String::new();

        for (i, chunk) in chunks.into_iter().enumerate() {
            if handle.is_cancelled() {
                return self.agent.cancelled();
            }
            let part = i + 1;
            let label = format!("Part {part}/{total}");
            self.agent.emit(AgentEvent::ChunkStart { part, total });

            let mut prompt = format!(
                "You are analyzing a large file in chunks. This is {label}.\n\
                 === Context from Previous Analysis (Summary) ===\n{summary}\n\
                 ==============================================\n\n"
            );
            for note in handle.drain() {
                let _ = write!(prompt, "{INTERVENTION_TAG}{note}\n\n");
                self.agent.emit(AgentEvent::Intervention(note));
            }
            prompt.push_str(
                "Analyze the following chunk. If you find new vulnerabilities, list them. \
                 Also, please briefly summarize the key findings so far to be passed to the \
                 next chunk analysis.\n\n",
            );
            prompt.push_str(&render(&format!(
                "--- {label} ---\n{chunk}\n--- End of {label} ---"
            )));

            let result = match self
                .agent
                .run(self.system_prompt, &prompt, self.max_tokens)
                .await
            {
                Outcome::Cancelled => return Outcome::Cancelled,
                Outcome::Answer(text) => {
                    summary = carry_summary(&text);
                    text
                }
                // The previous summary stays in place for the next window.
                failed @ Outcome::Failed(_) => failed.into_text(),
            };

            if !report.is_empty() {
                report.push_str("\n\n");
            }
            let _ = write!(report, "=== Analysis for {label} ===\n{result}");
            self.agent.emit(AgentEvent::ChunkDone {
                part,
                total,
                result,
            });
        }
        Outcome::Answer(report)
    }
}
