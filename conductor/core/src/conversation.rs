//! Conversation Store
//!
//! The ordered, append-mostly list of messages for one chat session. The
//! store is the only shared mutable resource of a turn and enforces the
//! in-flight rules itself:
//!
//! - at most one message is in flight at any time
//! - an in-flight message always directly follows a user message
//! - in-flight content only ever grows, and a message leaves the in-flight
//!   state either by being finalized or by being removed entirely
//!
//! Every mutation is published to the attached display sink, so the surface
//! sees exactly what the store holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::messages::{ConductorMessage, MessageId, MessageRole, MessageUpdate};

/// Errors raised when an operation would break a store invariant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    /// No message with this ID exists
    #[error("message {0} not found")]
    NotFound(MessageId),

    /// The message is not receiving fragments
    #[error("message {0} is not in flight")]
    NotInFlight(MessageId),

    /// Another message is already in flight
    #[error("message {0} is already in flight")]
    AlreadyInFlight(MessageId),

    /// A placeholder must directly follow a user message
    #[error("a placeholder must follow a user message")]
    NoPrecedingUser,

    /// The message exists but is not a user message
    #[error("message {0} is not a user message")]
    NotUser(MessageId),

    /// New content does not extend the published content
    #[error("content update for {0} does not extend the current content")]
    NotAnExtension(MessageId),
}

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
    /// Whether the message is still being streamed
    pub in_flight: bool,
}

impl Message {
    fn finalized(role: MessageRole, content: String) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content,
            created_at: Utc::now(),
            in_flight: false,
        }
    }

    fn placeholder() -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            in_flight: true,
        }
    }

    fn snapshot(&self) -> MessageUpdate {
        MessageUpdate {
            message_id: self.id,
            role: self.role,
            content: self.content.clone(),
            in_flight: self.in_flight,
        }
    }
}

/// One prior turn entry as sent to the transport
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Author of the entry
    pub role: MessageRole,
    /// Finalized content
    pub content: String,
}

impl From<(MessageRole, &str)> for HistoryEntry {
    fn from((role, content): (MessageRole, &str)) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }
}

/// Lazy view over the finalized messages of a store
///
/// A clone continues from the same position; calling
/// [`ConversationStore::history`] again starts a fresh pass.
#[derive(Clone, Debug)]
pub struct History<'a> {
    inner: std::slice::Iter<'a, Message>,
}

impl<'a> Iterator for History<'a> {
    type Item = (MessageRole, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .by_ref()
            .find(|m| !m.in_flight)
            .map(|m| (m.role, m.content.as_str()))
    }
}

/// In-memory conversation store
#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
    /// Display sink (optional so the store can be used headless)
    sink: Option<mpsc::UnboundedSender<ConductorMessage>>,
}

impl ConversationStore {
    /// Create an empty store with no display sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that publishes every mutation to `sink`
    #[must_use]
    pub fn with_sink(sink: mpsc::UnboundedSender<ConductorMessage>) -> Self {
        Self {
            messages: Vec::new(),
            sink: Some(sink),
        }
    }

    /// Append an immutable user message
    pub fn append_user(&mut self, text: impl Into<String>) -> MessageId {
        self.push(Message::finalized(MessageRole::User, text.into()))
    }

    /// Append an immutable assistant message that did not come from a stream
    ///
    /// Used for the synthetic error message that replaces a failed reply.
    pub fn append_notice(&mut self, text: impl Into<String>) -> MessageId {
        self.push(Message::finalized(MessageRole::Assistant, text.into()))
    }

    /// Append an empty in-flight assistant message
    ///
    /// # Errors
    ///
    /// - [`ConversationError::AlreadyInFlight`] if another message is in flight
    /// - [`ConversationError::NoPrecedingUser`] if the last message is not a user message
    pub fn append_placeholder(&mut self) -> Result<MessageId, ConversationError> {
        if let Some(id) = self.in_flight_id() {
            return Err(ConversationError::AlreadyInFlight(id));
        }
        match self.messages.last() {
            Some(last) if last.role == MessageRole::User => {}
            _ => return Err(ConversationError::NoPrecedingUser),
        }
        Ok(self.push(Message::placeholder()))
    }

    /// Replace the content of the in-flight message `id`
    ///
    /// # Errors
    ///
    /// Fails if the message is unknown, not in flight, or if `text` does not
    /// start with the current content.
    pub fn update_content(&mut self, id: MessageId, text: String) -> Result<(), ConversationError> {
        let msg = self.in_flight_mut(id)?;
        if !text.starts_with(msg.content.as_str()) {
            return Err(ConversationError::NotAnExtension(id));
        }
        msg.content = text;
        let update = msg.snapshot();
        self.publish(ConductorMessage::Update(update));
        Ok(())
    }

    /// Mark the in-flight message `id` immutable
    ///
    /// # Errors
    ///
    /// Fails if the message is unknown or not in flight.
    pub fn finalize(&mut self, id: MessageId) -> Result<(), ConversationError> {
        let msg = self.in_flight_mut(id)?;
        msg.in_flight = false;
        let update = msg.snapshot();
        self.publish(ConductorMessage::Update(update));
        Ok(())
    }

    /// Delete a message
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::NotFound`] if no such message exists.
    pub fn remove(&mut self, id: MessageId) -> Result<Message, ConversationError> {
        let idx = self.position(id).ok_or(ConversationError::NotFound(id))?;
        let removed = self.messages.remove(idx);
        self.publish(ConductorMessage::Removed { message_id: id });
        Ok(removed)
    }

    /// Remove every message after the user message `user_id`
    ///
    /// The user message itself stays; its content is returned so the turn can
    /// be replayed.
    ///
    /// # Errors
    ///
    /// Fails if the message is unknown or not a user message.
    pub fn truncate_after(&mut self, user_id: MessageId) -> Result<String, ConversationError> {
        let idx = self
            .position(user_id)
            .ok_or(ConversationError::NotFound(user_id))?;
        if self.messages[idx].role != MessageRole::User {
            return Err(ConversationError::NotUser(user_id));
        }

        let removed: Vec<Message> = self.messages.drain(idx + 1..).collect();
        for msg in &removed {
            self.publish(ConductorMessage::Removed { message_id: msg.id });
        }
        tracing::debug!(
            user_id = %user_id,
            removed = removed.len(),
            "Truncated conversation"
        );

        Ok(self.messages[idx].content.clone())
    }

    /// Finalized `(role, content)` pairs in chat order
    ///
    /// In-flight messages are skipped, so a model never receives its own
    /// unfinished output as context.
    #[must_use]
    pub fn history(&self) -> History<'_> {
        History {
            inner: self.messages.iter(),
        }
    }

    /// Like [`Self::history`], limited to the messages before `id`
    ///
    /// Yields the whole history when `id` is unknown.
    #[must_use]
    pub fn history_before(&self, id: MessageId) -> History<'_> {
        let end = self.position(id).unwrap_or(self.messages.len());
        History {
            inner: self.messages[..end].iter(),
        }
    }

    /// Reset to an empty conversation
    pub fn clear(&mut self) {
        self.messages.clear();
        self.publish(ConductorMessage::Cleared);
    }

    /// Get message by ID
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// The message directly before `id`
    #[must_use]
    pub fn predecessor(&self, id: MessageId) -> Option<&Message> {
        let idx = self.position(id)?;
        idx.checked_sub(1).map(|i| &self.messages[i])
    }

    /// Get all messages
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The in-flight message, if any
    #[must_use]
    pub fn in_flight_id(&self) -> Option<MessageId> {
        self.messages.iter().find(|m| m.in_flight).map(|m| m.id)
    }

    /// The most recent assistant message that is not in flight
    #[must_use]
    pub fn last_assistant_id(&self) -> Option<MessageId> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant && !m.in_flight)
            .map(|m| m.id)
    }

    /// Get current message count
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation holds no messages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, msg: Message) -> MessageId {
        let id = msg.id;
        let update = msg.snapshot();
        self.messages.push(msg);
        self.publish(ConductorMessage::Update(update));
        id
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    fn in_flight_mut(&mut self, id: MessageId) -> Result<&mut Message, ConversationError> {
        let msg = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(ConversationError::NotFound(id))?;
        if msg.in_flight {
            Ok(msg)
        } else {
            Err(ConversationError::NotInFlight(id))
        }
    }

    fn publish(&self, msg: ConductorMessage) {
        if let Some(ref sink) = self.sink {
            if sink.send(msg).is_err() {
                tracing::trace!("Display sink closed, dropping update");
            }
        }
    }
}
