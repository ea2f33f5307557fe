//! Chat-completion HTTP client.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use vigil_types::{ApiError, ChatRequest, ChatResponse};

use crate::retry::RetryPolicy;

/// Connect and read timeout for every call.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

const COMPLETIONS_PATH: &str = "chat/completions";

/// Resolve the completions URL from a configured base.
///
/// A base without a scheme gets `https://`; one that already names the
/// completions path is used unchanged.
pub fn chat_endpoint(base_url: &str) -> String {
    let base = base_url.trim();
    let mut url = if base.starts_with("http://") || base.starts_with("https://") {
        base.to_string()
    } else {
        format!("https://{base}")
    };
    if url.trim_end_matches('/').ends_with(COMPLETIONS_PATH) {
        return url.trim_end_matches('/').to_string();
    }
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str(COMPLETIONS_PATH);
    url
}

/// Client for a `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    retry: RetryPolicy,
}

impl ChatClient {
    /// Create a new client for the given base URL.
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(HTTP_TIMEOUT)
            .read_timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: chat_endpoint(base_url),
            retry: RetryPolicy::default(),
        })
    }

    /// Set how transient failures (429, 5xx, network, timeout) are retried.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a completion request, retrying transient failures.
    ///
    /// Dropping the returned future aborts the in-flight HTTP call.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
                ApiError::Auth {
                    message: "Invalid API key format".into(),
                }
            })?,
        );

        let body = serde_json::to_string(request).map_err(|e| ApiError::BadRequest {
            message: format!("Failed to serialize request: {e}"),
        })?;

        let mut retry = 0;
        loop {
            tracing::debug!("POST {} (retry {retry})", self.endpoint);
            let err = match self.send_once(&headers, &body).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            let Some(wait) = self.retry.wait_after(retry, &err) else {
                return Err(err);
            };
            tracing::warn!("Chat endpoint failed: {err}. Resending in {}ms", wait.as_millis());
            tokio::time::sleep(wait).await;
            retry += 1;
        }
    }

    /// One HTTP round trip.
    async fn send_once(&self, headers: &HeaderMap, body: &str) -> Result<ChatResponse, ApiError> {
        let response = self
            .http
            .post(&self.endpoint)
            .headers(headers.clone())
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| network_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body_text, retry_after));
        }

        let text = response.text().await.map_err(|e| network_error(&e))?;
        serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

fn network_error(e: &reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

/// Parse the `retry-after` header value as seconds and convert to milliseconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64)
}

/// Classify an HTTP error response into a typed ApiError.
fn classify_error(status: u16, body: &str, retry_after: Option<u64>) -> ApiError {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }
    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => ApiError::Auth { message },
        400 | 404 | 422 => ApiError::BadRequest { message },
        429 => ApiError::RateLimited {
            retry_after_ms: retry_after,
        },
        _ => ApiError::Server { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_completions_path() {
        assert_eq!(
            chat_endpoint("https://api.openai.com/v1"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn endpoint_adds_missing_scheme() {
        assert_eq!(
            chat_endpoint("api.deepseek.com"),
            "https://api.deepseek.com/chat/completions"
        );
    }

    #[test]
    fn endpoint_keeps_full_path() {
        assert_eq!(
            chat_endpoint("http://localhost:8080/v1/chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn parse_retry_after_values() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert("retry-after", HeaderValue::from_static("1.5"));
        assert_eq!(parse_retry_after(&headers), Some(1500));
        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn classify_error_429_with_retry_after() {
        let err = classify_error(429, "{}", Some(3000));
        match err {
            ApiError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, Some(3000)),
            _ => panic!("Expected RateLimited, got {err:?}"),
        }
    }

    #[test]
    fn classify_error_uses_json_message() {
        let err = classify_error(500, r#"{"error":{"message":"boom"}}"#, None);
        match err {
            ApiError::Server { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            _ => panic!("Expected Server, got {err:?}"),
        }
    }

    #[test]
    fn classify_error_falls_back_to_raw_body() {
        let err = classify_error(401, "nope", None);
        match err {
            ApiError::Auth { message } => assert_eq!(message, "nope"),
            _ => panic!("Expected Auth, got {err:?}"),
        }
    }
}
