//! Surface Events
//!
//! Events sent from a UI surface to the Conductor. A surface reports what the
//! user did; the Conductor decides whether that is allowed right now and
//! answers through the [`ConductorMessage`](crate::ConductorMessage) feed.

use serde::{Deserialize, Serialize};

use crate::messages::MessageId;

/// Events from UI Surface to Conductor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceEvent {
    /// User submitted a message
    UserMessage {
        /// The message content, untrimmed
        content: String,
    },

    /// User asked for a new answer in place of an existing one
    Regenerate {
        /// The assistant message to replace
        message_id: MessageId,
    },

    /// User asked for a new answer to the latest question
    RegenerateLast,

    /// User started a new conversation
    Clear,

    /// User picked another model for the following turns
    SelectModel {
        /// Model identifier or catalog display name
        model: String,
    },
}

impl SurfaceEvent {
    /// Create a user message event
    pub fn user_message(content: impl Into<String>) -> Self {
        Self::UserMessage {
            content: content.into(),
        }
    }

    /// Short name for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::Regenerate { .. } => "regenerate",
            Self::RegenerateLast => "regenerate_last",
            Self::Clear => "clear",
            Self::SelectModel { .. } => "select_model",
        }
    }
}
