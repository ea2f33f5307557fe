//! `ChatProvider` implementation backed by [`ChatClient`].

use crate::client::ChatClient;
use crate::retry::RetryPolicy;
use std::future::Future;
use std::pin::Pin;
use vigil_types::{ApiError, ChatProvider, ChatRequest, ChatResponse};

/// OpenAI-compatible provider. Retry logic stays in `ChatClient`.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: ChatClient,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            client: ChatClient::new(api_key, base_url)?,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.client = self.client.with_retry(retry);
        self
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }
}

impl ChatProvider for OpenAiProvider {
    fn complete<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatResponse, ApiError>> + Send + 'a>> {
        Box::pin(self.client.complete(request))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_resolves_endpoint() {
        let provider = OpenAiProvider::new("test-key", "https://api.example.com/v1").unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(
            provider.client().endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }
}
