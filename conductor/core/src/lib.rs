//! Neura Conductor - Streaming Chat Core
//!
//! This crate assembles streamed model replies into a conversation,
//! independent of any UI framework. It can drive a terminal chat, a web
//! front end, or run headless for testing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         UI Surface                               │
//! │            SurfaceEvent (up)      ConductorMessage (down)        │
//! └───────────────────────────┬──────────────────────▲───────────────┘
//!                             │                      │
//! ┌───────────────────────────┼──────────────────────┼───────────────┐
//! │                    CONDUCTOR CORE                │               │
//! │  ┌────────────────────────▼──────────────────────┴────────────┐  │
//! │  │                      Conductor                              │  │
//! │  │  ┌────────────┐  ┌─────────────┐  ┌──────────────────────┐ │  │
//! │  │  │ Transport  │─►│  Streaming  │─►│  ConversationStore   │ │  │
//! │  │  │ (bytes)    │  │ decode/extr │  │  (publishes changes) │ │  │
//! │  │  └────────────┘  └─────────────┘  └──────────────────────┘ │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: drives one turn at a time through its state machine
//! - [`ConversationStore`]: ordered messages with the in-flight rules
//! - [`ConductorMessage`]: updates sent from Conductor to the UI surface
//! - [`SurfaceEvent`]: events sent from the UI surface to Conductor
//! - [`CompletionTransport`]: where the reply bytes come from
//!
//! # Quick Start
//!
//! ```
//! use neura_conductor::{Conductor, ConductorConfig, ConductorMessage, ScriptedTransport};
//! use tokio::sync::mpsc;
//!
//! # tokio_test::block_on(async {
//! let transport = ScriptedTransport::new();
//! transport.push_reply(&["Hel", "lo"]);
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let mut conductor = Conductor::new(transport, ConductorConfig::default(), tx);
//!
//! conductor.submit("Hi!").await.unwrap();
//! conductor.run_until_idle().await;
//!
//! assert_eq!(conductor.store().messages()[1].content, "Hello");
//! while let Ok(msg) = rx.try_recv() {
//!     // Render msg
//!     let _ = msg;
//! }
//! # });
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: completion transports and the model catalog
//! - [`config`]: layered TOML/env/CLI configuration
//! - [`conductor`]: the turn orchestrator
//! - [`conversation`]: the conversation store
//! - [`events`]: events from UI surfaces to Conductor
//! - [`messages`]: messages from Conductor to UI surfaces
//! - [`streaming`]: byte stream decoding and reply assembly

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod conversation;
pub mod events;
pub mod messages;
pub mod streaming;

// Re-exports for convenience
pub use backend::{
    CompletionRequest, CompletionTransport, ModelInfo, OpenRouterTransport, ScriptedTransport,
    TransportError, TransportSettings, MODEL_CATALOG,
};
pub use conductor::{Conductor, ConductorConfig, Rejection, DEFAULT_ERROR_TEXT};
pub use conversation::{ConversationError, ConversationStore, HistoryEntry, Message};
pub use events::SurfaceEvent;
pub use messages::{ConductorMessage, MessageId, MessageRole, MessageUpdate, TurnState};

// Streaming exports
pub use streaming::{
    DeltaExtractor, ExtractorSettings, LineDecoder, StreamEvent, TextFragment, TurnAccumulator,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, NeuraConfig, NeuraToml,
};
