//! # Provider Adapters
//!
//! Each provider family wraps the same question (instruction + image) in its own
//! request envelope and hides the answer text at its own JSON path. The
//! orchestrator only sees the [`ProviderAdapter`] capability and the
//! [`Transport`] seam, never the raw envelope shapes.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::error_logging;
use crate::extraction::ExtractionRequest;
use crate::scan_config::{AuthMethod, ProviderAttempt, ProviderFamily};

/// Outbound JSON POST, fully resolved (URL, headers, body)
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Raw provider answer
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures below the HTTP status level
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Timeout(Duration),
    Network(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout(limit) => {
                write!(f, "request timed out after {}ms", limit.as_millis())
            }
            TransportError::Network(msg) => write!(f, "network error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// Sends one JSON POST and hands back status and body text
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest::Client`
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        // Headers first: `json` only sets Content-Type when none is present
        let builder = builder.json(&request.body);

        let url = redact_url(&request.url);
        let network_error = |e: reqwest::Error| {
            error_logging::log_network_error(&e, "provider_post", Some(&url), None);
            TransportError::Network(e.to_string())
        };

        let call = async {
            let response = builder.send().await.map_err(network_error)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(network_error)?;
            Ok::<_, TransportError>(HttpResponse { status, body })
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

/// Per-family request building and answer extraction
pub trait ProviderAdapter: Send + Sync {
    fn family(&self) -> ProviderFamily;

    /// Wrap instruction and image in this family's envelope
    fn build_request(
        &self,
        attempt: &ProviderAttempt,
        credential: &str,
        instruction: &str,
        image: &ExtractionRequest,
    ) -> HttpRequest;

    /// Pull the model's answer text out of a raw success body
    fn parse_response_text(&self, raw_body: &str) -> Option<String>;
}

/// `generateContent` family: inline base64 parts, text in `candidates[0].content.parts[0].text`
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContentAdapter;

impl ProviderAdapter for InlineContentAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::InlineContent
    }

    fn build_request(
        &self,
        attempt: &ProviderAttempt,
        credential: &str,
        instruction: &str,
        image: &ExtractionRequest,
    ) -> HttpRequest {
        let url = format!(
            "{}/{}/models/{}:generateContent",
            attempt.provider_endpoint,
            attempt.effective_api_version(),
            attempt.model_identifier
        );
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": instruction },
                    { "inline_data": { "mime_type": image.mime_type, "data": image.base64() } }
                ]
            }]
        });
        authorize(attempt, credential, url, body)
    }

    fn parse_response_text(&self, raw_body: &str) -> Option<String> {
        let value: Value = serde_json::from_str(raw_body).ok()?;
        value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// `chat/completions` family: data-URL image part, text in `choices[0].message.content`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatCompletionAdapter;

impl ProviderAdapter for ChatCompletionAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::ChatCompletion
    }

    fn build_request(
        &self,
        attempt: &ProviderAttempt,
        credential: &str,
        instruction: &str,
        image: &ExtractionRequest,
    ) -> HttpRequest {
        let url = format!("{}/chat/completions", attempt.provider_endpoint);
        let body = json!({
            "model": attempt.model_identifier,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    { "type": "image_url", "image_url": { "url": image.data_url() } }
                ]
            }]
        });
        authorize(attempt, credential, url, body)
    }

    fn parse_response_text(&self, raw_body: &str) -> Option<String> {
        let value: Value = serde_json::from_str(raw_body).ok()?;
        value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

static INLINE_CONTENT: InlineContentAdapter = InlineContentAdapter;
static CHAT_COMPLETION: ChatCompletionAdapter = ChatCompletionAdapter;

/// The adapter serving a provider family
pub fn adapter_for(family: ProviderFamily) -> &'static dyn ProviderAdapter {
    match family {
        ProviderFamily::InlineContent => &INLINE_CONTENT,
        ProviderFamily::ChatCompletion => &CHAT_COMPLETION,
    }
}

fn authorize(attempt: &ProviderAttempt, credential: &str, url: String, body: Value) -> HttpRequest {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    let url = match attempt.auth_method {
        AuthMethod::QueryKey => format!("{}?key={}", url, credential),
        AuthMethod::Bearer => {
            headers.push(("Authorization".to_string(), format!("Bearer {}", credential)));
            url
        }
    };
    headers.extend(attempt.attribution_headers.iter().cloned());

    debug!(url = %redact_url(&url), model = %attempt.model_identifier, "Built provider request");
    HttpRequest { url, headers, body }
}

/// Hide a `key=` query value so URLs can be logged
pub fn redact_url(url: &str) -> String {
    match url.split_once("key=") {
        Some((prefix, rest)) => {
            let tail = rest.find('&').map(|i| &rest[i..]).unwrap_or("");
            format!("{}key=[REDACTED]{}", prefix, tail)
        }
        None => url.to_string(),
    }
}
