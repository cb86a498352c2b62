//! Conductor Messages
//!
//! Messages sent from the Conductor to the display collaborator. A surface
//! never inspects conversation state directly; it renders the feed of
//! [`ConductorMessage`] values it receives.
//!
//! # Feed Contract
//!
//! - One [`ConductorMessage::Update`] per content change of any message, so at
//!   least one per appended fragment and one when a message is finalized
//! - One [`ConductorMessage::Removed`] whenever a message is deleted
//! - One [`ConductorMessage::State`] per orchestrator state transition

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Messages from Conductor to UI Surface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConductorMessage {
    /// A message was created or its content/in-flight flag changed
    Update(MessageUpdate),

    /// A message was deleted from the conversation
    Removed {
        /// The deleted message
        message_id: MessageId,
    },

    /// The whole conversation was reset
    Cleared,

    /// Orchestrator state change
    State {
        /// The new state
        state: TurnState,
    },
}

/// Snapshot of one message as published to the display sink
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdate {
    /// Message this update belongs to
    pub message_id: MessageId,
    /// Who authored the message
    pub role: MessageRole,
    /// Full content at the time of publication (never a delta)
    pub content: String,
    /// Whether the message is still receiving fragments
    pub in_flight: bool,
}

impl MessageUpdate {
    /// Whether this update is the last one the message will ever receive
    #[must_use]
    pub fn is_final(&self) -> bool {
        !self.in_flight
    }
}

/// Message identifier
///
/// Identifiers come from a process-wide counter, so ordering them gives
/// creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("msg_").unwrap_or(s);
        digits.parse().map(Self)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Model reply, or a synthetic error notice standing in for one
    Assistant,
}

impl MessageRole {
    /// Wire name used by chat completion APIs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Orchestrator states
///
/// `Idle → Submitting → Streaming → Finalizing → Idle`, with the error edge
/// `Submitting | Streaming → RollingBack → Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    /// No active turn
    #[default]
    Idle,
    /// Waiting for the transport to accept the request
    Submitting,
    /// Reading the response byte stream
    Streaming,
    /// Promoting the reply to an immutable message
    Finalizing,
    /// Discarding the placeholder after a transport failure
    RollingBack,
}

impl TurnState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::Submitting => "Sending...",
            Self::Streaming => "Responding...",
            Self::Finalizing => "Finishing...",
            Self::RollingBack => "Recovering...",
        }
    }

    /// Whether a new turn may start
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}
