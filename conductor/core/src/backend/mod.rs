//! Completion Transports
//!
//! This module provides abstracted access to completion services through a
//! common trait interface. A transport only opens the reply stream; the
//! Conductor reads and assembles it.
//!
//! # Available Transports
//!
//! - **OpenRouter**: any OpenAI-compatible streaming endpoint (default)
//! - **Scripted**: replays canned streams, for tests and offline surfaces
//!
//! # Usage
//!
//! ```ignore
//! use neura_conductor::backend::{CompletionRequest, CompletionTransport, OpenRouterTransport};
//!
//! let transport = OpenRouterTransport::new(settings)?;
//! let request = CompletionRequest::new("Hello!", "openai/gpt-oss-20b:free");
//! let stream = transport.open_stream(&request).await?;
//! ```

pub mod models;
mod openrouter;
mod scripted;
mod traits;

pub use models::{default_model, find_model, resolve_model, ModelInfo, MODEL_CATALOG};
pub use openrouter::{OpenRouterTransport, TransportSettings, DEFAULT_BASE_URL};
pub use scripted::{sse_body, ScriptedTransport};
pub use traits::{
    ByteStream, CompletionRequest, CompletionTransport, TransportError, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE,
};
