//! Conversation engine, chunked analysis, and request/response analysis for Vigil.

mod agent;
mod analyzer;
mod chunk;

pub use agent::{Agent, AgentEvent, AgentHandle, INTERVENTION_TAG, Outcome, TOOL_PREVIEW_CHARS};
pub use analyzer::{Analyzer, REQUEST_PLACEHOLDER, RESPONSE_PLACEHOLDER};
pub use chunk::{CHUNK_OVERLAP, ChunkAnalyzer, FIRST_SUMMARY, SUMMARY_CHARS, split_into_chunks};
