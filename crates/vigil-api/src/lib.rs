//! OpenAI-compatible chat-completion client for Vigil.

mod client;
mod provider;
mod retry;

pub use client::{ChatClient, chat_endpoint};
pub use provider::OpenAiProvider;
pub use retry::RetryPolicy;
