//! Transport Traits
//!
//! The boundary between the Conductor and whatever service produces the
//! reply. The Conductor only needs one thing from a transport: given the
//! prompt and the prior history, hand back a byte stream. Framing, decoding
//! and assembly all happen on the Conductor side.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

use crate::conversation::HistoryEntry;

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.4;

/// Default reply length cap
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Raw response body, chunked however the network delivered it
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request could not be sent or the body could not be read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The transport refused the request before sending it
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The byte stream broke off
    #[error("stream interrupted: {0}")]
    Interrupted(String),
}

/// Everything a transport needs to open one reply stream
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model identifier (transport-specific)
    pub model: String,
    /// Finalized messages before the new prompt, in chat order
    pub history: Vec<HistoryEntry>,
    /// The new user text
    pub prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens in the reply
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Create a request with default sampling parameters and no history
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            history: Vec::new(),
            prompt: prompt.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Set prior history
    #[must_use]
    pub fn with_history(mut self, history: impl IntoIterator<Item = HistoryEntry>) -> Self {
        self.history = history.into_iter().collect();
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Completion transport trait
///
/// Implement this trait to connect the Conductor to a different provider.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Get the transport name (e.g., "OpenRouter")
    fn name(&self) -> &str;

    /// Send a request and return the raw response body as it arrives
    ///
    /// An `Err` here means the request was rejected outright; failures after
    /// the stream is returned surface as `Err` items in the stream.
    async fn open_stream(&self, request: &CompletionRequest) -> Result<ByteStream, TransportError>;
}
