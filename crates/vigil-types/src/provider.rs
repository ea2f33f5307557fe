//! Provider trait for chat-completion endpoints.

use crate::{ApiError, ChatRequest, ChatResponse};
use std::future::Future;
use std::pin::Pin;

/// Trait for chat-completion providers.
///
/// Dyn-compatible so the engine works with `Arc<dyn ChatProvider>`; tests
/// substitute scripted providers.
pub trait ChatProvider: Send + Sync {
    /// Send one non-streaming completion request.
    fn complete<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatResponse, ApiError>> + Send + 'a>>;

    /// Provider name for logging/display.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn provider_is_dyn_compatible() {
        fn _accept(_p: &dyn ChatProvider) {}
    }

    #[test]
    fn arc_provider_is_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Arc<dyn ChatProvider>>();
    }
}
