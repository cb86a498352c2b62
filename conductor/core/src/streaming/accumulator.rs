//! Turn Accumulator
//!
//! The single writer of an in-flight assistant message. It exists from the
//! moment the placeholder is created until the message is either finalized or
//! aborted, and both of those consume it.

use crate::conversation::{ConversationError, ConversationStore};
use crate::messages::MessageId;
use crate::streaming::TextFragment;

/// Accumulates fragments into the owned placeholder message
#[derive(Debug)]
pub struct TurnAccumulator {
    message_id: MessageId,
    content: String,
    fragments: usize,
}

impl TurnAccumulator {
    /// Create the placeholder message and take ownership of it
    ///
    /// # Errors
    ///
    /// Propagates the store's refusal when another message is in flight or
    /// the last message is not a user message.
    pub fn begin(store: &mut ConversationStore) -> Result<Self, ConversationError> {
        let message_id = store.append_placeholder()?;
        tracing::debug!(message_id = %message_id, "Placeholder created");
        Ok(Self {
            message_id,
            content: String::new(),
            fragments: 0,
        })
    }

    /// The message being written
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Content assembled so far
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Fragments appended so far
    #[must_use]
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Append a fragment and publish the grown content
    ///
    /// # Errors
    ///
    /// Fails if the message was removed from the store behind our back.
    pub fn append(
        &mut self,
        store: &mut ConversationStore,
        fragment: TextFragment,
    ) -> Result<(), ConversationError> {
        self.content.push_str(fragment.as_str());
        self.fragments += 1;
        store.update_content(self.message_id, self.content.clone())
    }

    /// Make the message immutable, returning its final content
    ///
    /// # Errors
    ///
    /// Fails if the message is no longer in flight.
    pub fn finalize(self, store: &mut ConversationStore) -> Result<String, ConversationError> {
        store.finalize(self.message_id)?;
        Ok(self.content)
    }

    /// Delete the message with all its partial content
    ///
    /// # Errors
    ///
    /// Fails if the message no longer exists.
    pub fn abort(self, store: &mut ConversationStore) -> Result<(), ConversationError> {
        store.remove(self.message_id)?;
        tracing::debug!(
            message_id = %self.message_id,
            discarded = self.content.len(),
            "Placeholder removed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ConductorMessage, MessageRole};
    use crate::streaming::{DeltaExtractor, StreamEvent};
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn fragment(extractor: &DeltaExtractor, text: &str) -> TextFragment {
        let line = format!("data: {}", serde_json::json!({ "delta": text }));
        match extractor.extract(&line) {
            Some(StreamEvent::Fragment(f)) => f,
            other => panic!("expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn test_begin_requires_user_message() {
        let mut store = ConversationStore::new();
        assert_eq!(
            TurnAccumulator::begin(&mut store).unwrap_err(),
            ConversationError::NoPrecedingUser
        );
    }

    #[test]
    fn test_append_in_order_and_finalize() {
        let extractor = DeltaExtractor::default();
        let mut store = ConversationStore::new();
        store.append_user("q");

        let mut acc = TurnAccumulator::begin(&mut store).unwrap();
        let id = acc.message_id();
        for text in ["Hel", "lo", ", ", "world"] {
            acc.append(&mut store, fragment(&extractor, text)).unwrap();
        }
        assert_eq!(acc.content(), "Hello, world");
        assert_eq!(acc.fragments(), 4);

        let content = acc.finalize(&mut store).unwrap();
        assert_eq!(content, "Hello, world");

        let msg = store.get(id).unwrap();
        assert_eq!(msg.content, "Hello, world");
        assert_eq!(msg.role, MessageRole::Assistant);
        assert!(!msg.in_flight);
    }

    #[test]
    fn test_published_values_grow_monotonically() {
        let extractor = DeltaExtractor::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut store = ConversationStore::with_sink(tx);
        store.append_user("q");

        let mut acc = TurnAccumulator::begin(&mut store).unwrap();
        let id = acc.message_id();
        for text in ["a", "bc", "d", "ef"] {
            acc.append(&mut store, fragment(&extractor, text)).unwrap();
        }
        acc.finalize(&mut store).unwrap();

        let mut published = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let ConductorMessage::Update(u) = msg {
                if u.message_id == id {
                    published.push(u);
                }
            }
        }

        // placeholder, four appends, finalize
        assert_eq!(published.len(), 6);
        for pair in published.windows(2) {
            assert!(pair[1].content.starts_with(&pair[0].content));
        }
        assert_eq!(published.iter().filter(|u| u.is_final()).count(), 1);
        assert!(published.last().unwrap().is_final());
    }

    #[test]
    fn test_abort_removes_message() {
        let extractor = DeltaExtractor::default();
        let mut store = ConversationStore::new();
        store.append_user("q");

        let mut acc = TurnAccumulator::begin(&mut store).unwrap();
        let id = acc.message_id();
        acc.append(&mut store, fragment(&extractor, "partial")).unwrap();
        acc.abort(&mut store).unwrap();

        assert!(store.get(id).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.in_flight_id().is_none());
    }
}
