//! send_request: replays a raw HTTP request against a target service.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use vigil_types::{Provenance, Tool, ToolDescriptor, ToolError};

static CONTENT_LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Content-Length:\s*\d+").expect("valid regex"));

/// Where a raw request is sent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpTarget {
    pub host: String,
    pub port: u16,
    pub use_https: bool,
}

/// The host's request-sending capability.
pub trait RequestSender: Send + Sync {
    /// Send an already normalized raw request; resolve to the raw response.
    fn send<'a>(
        &'a self,
        target: &'a HttpTarget,
        raw_request: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;
}

/// Normalize a model-written raw request before sending.
///
/// Line endings become CRLF, the header block is terminated, and when a body
/// is present its `Content-Length` is set to the body's byte length.
pub fn prepare_raw_request(raw: &str) -> String {
    let mut request = raw.replace("\r\n", "\n").replace('\n', "\r\n");
    if !request.ends_with("\r\n\r\n") {
        request.push_str(if request.ends_with("\r\n") { "\r\n" } else { "\r\n\r\n" });
    }

    let Some((head, body)) = request.split_once("\r\n\r\n") else {
        return request;
    };
    if body.is_empty() {
        return request;
    }
    let length = format!("Content-Length: {}", body.len());
    let head = if CONTENT_LENGTH.is_match(head) {
        CONTENT_LENGTH.replace_all(head, length.as_str()).into_owned()
    } else {
        format!("{head}\r\n{length}")
    };
    format!("{head}\r\n\r\n{body}")
}

/// Parsed pieces of a raw request.
#[derive(Debug, PartialEq)]
struct RawRequest<'a> {
    method: &'a str,
    target: &'a str,
    headers: Vec<(&'a str, &'a str)>,
    body: &'a str,
}

fn parse_raw_request(raw: &str) -> Result<RawRequest<'_>, ToolError> {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(ToolError::ExecutionFailed(format!(
            "Malformed request line: {request_line}"
        )));
    };
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();
    Ok(RawRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Default sender: replays the request with reqwest.
///
/// Certificates are not verified and redirects are not followed, since the
/// target is usually a system under test.
pub struct ReqwestSender {
    http: reqwest::Client,
}

impl ReqwestSender {
    pub fn new() -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(Self { http })
    }

    async fn replay(&self, target: &HttpTarget, raw: &str) -> Result<String, ToolError> {
        let request = parse_raw_request(raw)?;
        let scheme = if target.use_https { "https" } else { "http" };
        let url = if request.target.starts_with("http://") || request.target.starts_with("https://") {
            request.target.to_string()
        } else {
            format!("{scheme}://{}:{}{}", target.host, target.port, request.target)
        };
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ToolError::ExecutionFailed(format!("Bad method: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            // Recomputed by the client from the actual body and connection
            if name.eq_ignore_ascii_case("content-length")
                || name.eq_ignore_ascii_case("transfer-encoding")
                || name.eq_ignore_ascii_case("connection")
            {
                continue;
            }
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(n, v);
            }
        }

        let response = self
            .http
            .request(method, &url)
            .headers(headers)
            .body(request.body.to_string())
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Error sending request: {e}")))?;

        let mut out = format!("{:?} {}\r\n", response.version(), response.status());
        for (name, value) in response.headers() {
            out.push_str(&format!(
                "{}: {}\r\n",
                name,
                String::from_utf8_lossy(value.as_bytes())
            ));
        }
        out.push_str("\r\n");
        let body = response
            .bytes()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Error reading response: {e}")))?;
        out.push_str(&String::from_utf8_lossy(&body));
        Ok(out)
    }
}

impl RequestSender for ReqwestSender {
    fn send<'a>(
        &'a self,
        target: &'a HttpTarget,
        raw_request: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>> {
        Box::pin(self.replay(target, raw_request))
    }
}

pub struct SendRequestTool {
    sender: Arc<dyn RequestSender>,
}

#[derive(Deserialize)]
struct SendInput {
    request: String,
    #[serde(flatten)]
    target: HttpTarget,
}

impl SendRequestTool {
    pub fn new(sender: Arc<dyn RequestSender>) -> Self {
        Self { sender }
    }
}

impl Tool for SendRequestTool {
    fn name(&self) -> &str {
        "send_request"
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "send_request".to_string(),
            description: "Send a custom HTTP request. Use this to test payloads or bypasses. \
                          Returns the full response."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "request": {"type": "string", "description": "The raw HTTP request to send."},
                    "host": {"type": "string", "description": "The target host (e.g. example.com)"},
                    "port": {"type": "integer", "description": "The target port (e.g. 443)"},
                    "use_https": {"type": "boolean", "description": "True for HTTPS, False for HTTP"}
                },
                "required": ["request", "host", "port", "use_https"]
            }),
            provenance: Provenance::Builtin,
        }
    }

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let input: SendInput =
                serde_json::from_value(input).map_err(|e| ToolError::InvalidInput {
                    tool: "send_request".into(),
                    message: e.to_string(),
                })?;
            let raw = prepare_raw_request(&input.request);
            tracing::debug!(
                "send_request to {}:{} (https={})",
                input.target.host,
                input.target.port,
                input.target.use_https
            );
            self.sender.send(&input.target, &raw).await
        })
    }
}
