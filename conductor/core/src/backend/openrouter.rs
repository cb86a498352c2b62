//! OpenRouter Transport
//!
//! Streams chat completions from any OpenAI-compatible endpoint, OpenRouter
//! by default.
//!
//! # Wire format
//!
//! `POST {base_url}/chat/completions` with a bearer key and
//! `{"model", "messages", "temperature", "max_tokens", "stream": true}`. The
//! reply is a server-sent event stream of `data: {...}` lines closed by
//! `data: [DONE]`. The body is handed back untouched; parsing belongs to the
//! Conductor.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;

use super::traits::{ByteStream, CompletionRequest, CompletionTransport, TransportError};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Connection settings for [`OpenRouterTransport`]
#[derive(Clone, PartialEq, Eq)]
pub struct TransportSettings {
    /// API base URL, without the `/chat/completions` suffix
    pub base_url: String,
    /// Bearer key; requests are refused locally when absent
    pub api_key: Option<String>,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

// Keeps the key out of logs
impl std::fmt::Debug for TransportSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

impl<'a> From<&'a CompletionRequest> for WireRequest<'a> {
    fn from(request: &'a CompletionRequest) -> Self {
        let mut messages: Vec<WireMessage<'a>> = request
            .history
            .iter()
            .map(|entry| WireMessage {
                role: entry.role.as_str(),
                content: &entry.content,
            })
            .collect();
        messages.push(WireMessage {
            role: "user",
            content: &request.prompt,
        });

        Self {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        }
    }
}

/// OpenAI-compatible streaming client
#[derive(Clone, Debug)]
pub struct OpenRouterTransport {
    settings: TransportSettings,
    http_client: reqwest::Client,
}

impl OpenRouterTransport {
    /// Create a new transport
    ///
    /// No overall request timeout is set: a reply may legitimately stream for
    /// minutes. Only connecting is bounded.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (e.g. no TLS backend).
    pub fn new(settings: TransportSettings) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()?;
        Ok(Self {
            settings,
            http_client,
        })
    }

    /// Get the settings
    #[must_use]
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Get chat completions endpoint URL
    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CompletionTransport for OpenRouterTransport {
    fn name(&self) -> &'static str {
        "OpenRouter"
    }

    async fn open_stream(&self, request: &CompletionRequest) -> Result<ByteStream, TransportError> {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return Err(TransportError::Rejected("no API key configured".to_string()));
        };

        let url = self.completions_url();
        tracing::debug!(
            url = %url,
            model = %request.model,
            history = request.history.len(),
            "Opening completion stream"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&WireRequest::from(request))
            .send()
            .await?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from));

        Ok(Box::pin(stream))
    }
}
