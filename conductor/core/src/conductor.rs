//! Conductor - The Turn Orchestrator
//!
//! The Conductor drives one turn at a time through
//! `Idle → Submitting → Streaming → Finalizing → Idle`, falling back through
//! `RollingBack` whenever the transport fails.
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. It communicates through:
//! - `ConductorMessage`: updates sent TO the UI surface
//! - `SurfaceEvent`: events received FROM the UI surface
//!
//! All turn state lives on one task. A turn suspends only while the
//! transport opens the stream and while the next chunk is awaited; each
//! chunk is decoded, extracted and accumulated without interruption. That,
//! together with `&mut self` on every operation, is what keeps the
//! single in-flight rule without locks.

use std::time::Instant;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::backend::{
    default_model, resolve_model, ByteStream, CompletionRequest, CompletionTransport,
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
use crate::conversation::{ConversationError, ConversationStore, History, HistoryEntry};
use crate::events::SurfaceEvent;
use crate::messages::{ConductorMessage, MessageId, MessageRole, TurnState};
use crate::streaming::{
    DeltaExtractor, ExtractorSettings, LineDecoder, StreamEvent, TurnAccumulator,
};

/// Text of the message that replaces a failed reply
pub const DEFAULT_ERROR_TEXT: &str = "**Error**: Sorry, I encountered an error. Please try again.";

/// Conductor configuration
#[derive(Clone, Debug, PartialEq)]
pub struct ConductorConfig {
    /// Model to use
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens per reply
    pub max_tokens: u32,
    /// Prior messages sent as context (0 = all)
    pub max_context_messages: usize,
    /// Text of the message that replaces a failed reply
    pub error_text: String,
    /// Wire format of the reply stream
    pub extractor: ExtractorSettings,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            model: default_model().id.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_context_messages: 0,
            error_text: DEFAULT_ERROR_TEXT.to_string(),
            extractor: ExtractorSettings::default(),
        }
    }
}

/// Why an operation was refused
///
/// A rejected operation leaves the conversation and the state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Input was empty or only whitespace
    #[error("message is empty")]
    EmptyInput,

    /// Another turn is still running
    #[error("busy: {}", .0.description())]
    Busy(TurnState),

    /// No message with this ID exists
    #[error("message {0} not found")]
    UnknownMessage(MessageId),

    /// Only assistant messages can be regenerated
    #[error("message {0} is not an assistant message")]
    NotAssistant(MessageId),

    /// The message does not answer a user message
    #[error("message {0} does not follow a user message")]
    NoPrecedingUser(MessageId),

    /// There is no assistant message to regenerate
    #[error("nothing to regenerate")]
    NothingToRegenerate,

    /// The store refused a mutation
    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

/// Per-turn streaming state, present only while `Streaming`
struct ActiveTurn {
    accumulator: TurnAccumulator,
    decoder: LineDecoder,
    stream: ByteStream,
    started: Instant,
}

/// Rolls a turn back if dropped while the transport is still connecting
///
/// Holds the parts of the Conductor a rollback touches, leaving the
/// transport free to be borrowed for `open_stream`.
struct PendingTurn<'a> {
    accumulator: Option<TurnAccumulator>,
    store: &'a mut ConversationStore,
    state: &'a mut TurnState,
    tx: &'a mpsc::UnboundedSender<ConductorMessage>,
    error_text: &'a str,
}

impl PendingTurn<'_> {
    /// The connect attempt finished; hand the accumulator back
    fn connected(mut self) -> Option<TurnAccumulator> {
        self.accumulator.take()
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if let Some(accumulator) = self.accumulator.take() {
            tracing::warn!(
                message_id = %accumulator.message_id(),
                "Connect abandoned, rolling back"
            );
            roll_back(self.store, self.state, self.tx, self.error_text, accumulator);
        }
    }
}

/// Move to `next`, publishing the change
fn transition(
    state: &mut TurnState,
    tx: &mpsc::UnboundedSender<ConductorMessage>,
    next: TurnState,
) {
    if *state == next {
        return;
    }
    tracing::debug!(from = ?state, to = ?next, "Turn state");
    *state = next;
    if tx.send(ConductorMessage::State { state: next }).is_err() {
        tracing::trace!("Display sink closed, dropping state change");
    }
}

/// Replace the placeholder with the error message and return to `Idle`
fn roll_back(
    store: &mut ConversationStore,
    state: &mut TurnState,
    tx: &mpsc::UnboundedSender<ConductorMessage>,
    error_text: &str,
    accumulator: TurnAccumulator,
) {
    transition(state, tx, TurnState::RollingBack);

    if let Err(e) = accumulator.abort(store) {
        tracing::error!(error = %e, "Failed to remove placeholder");
    }
    store.append_notice(error_text);

    transition(state, tx, TurnState::Idle);
}

/// The Conductor - headless orchestration core
pub struct Conductor<T: CompletionTransport> {
    /// Configuration
    config: ConductorConfig,
    /// Completion transport
    transport: T,
    /// The conversation (publishes every change to the surface)
    store: ConversationStore,
    /// Line interpreter for the reply stream
    extractor: DeltaExtractor,
    /// Current turn state
    state: TurnState,
    /// The turn being streamed, if any
    turn: Option<ActiveTurn>,
    /// Channel to send messages to UI surface
    tx: mpsc::UnboundedSender<ConductorMessage>,
}

impl<T: CompletionTransport> Conductor<T> {
    /// Create a new Conductor with the given transport
    pub fn new(
        transport: T,
        config: ConductorConfig,
        tx: mpsc::UnboundedSender<ConductorMessage>,
    ) -> Self {
        let extractor = DeltaExtractor::new(config.extractor.clone());
        Self {
            config,
            transport,
            store: ConversationStore::with_sink(tx.clone()),
            extractor,
            state: TurnState::Idle,
            turn: None,
            tx,
        }
    }

    /// Get current state
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Whether a new turn may start
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Get the conversation
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Get the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get configuration
    pub fn config(&self) -> &ConductorConfig {
        &self.config
    }

    /// Model used for the next turn
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Handle an event from the UI surface
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] of the underlying operation.
    pub async fn handle_event(&mut self, event: SurfaceEvent) -> Result<(), Rejection> {
        tracing::debug!(event = event.kind(), state = ?self.state, "Surface event");
        match event {
            SurfaceEvent::UserMessage { content } => self.submit(&content).await,
            SurfaceEvent::Regenerate { message_id } => self.regenerate(message_id).await,
            SurfaceEvent::RegenerateLast => self.regenerate_last().await,
            SurfaceEvent::Clear => self.clear(),
            SurfaceEvent::SelectModel { model } => self.select_model(&model).map(|_| ()),
        }
    }

    /// Start a turn for `text`
    ///
    /// Appends the trimmed user message and an empty in-flight reply, then
    /// asks the transport for a stream. A transport rejection is not an error
    /// here: the reply is replaced by the error message and the Conductor is
    /// back to `Idle` when this returns. Dropping the future while the
    /// transport is connecting rolls the turn back the same way.
    ///
    /// # Errors
    ///
    /// - [`Rejection::EmptyInput`] for blank input
    /// - [`Rejection::Busy`] while another turn runs (the input is not queued)
    pub async fn submit(&mut self, text: &str) -> Result<(), Rejection> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Rejection::EmptyInput);
        }
        self.ensure_idle()?;

        let history = self.context(self.store.history());
        self.store.append_user(text);
        self.start_turn(text.to_string(), history).await
    }

    /// Replace the assistant message `message_id` with a fresh answer
    ///
    /// Everything from `message_id` on is removed. The user message before it
    /// stays and is sent again with the history that preceded it; the new
    /// reply gets a new ID.
    ///
    /// # Errors
    ///
    /// Rejected unless `Idle` and `message_id` is a finalized assistant
    /// message directly following a user message.
    pub async fn regenerate(&mut self, message_id: MessageId) -> Result<(), Rejection> {
        self.ensure_idle()?;

        let target = self
            .store
            .get(message_id)
            .ok_or(Rejection::UnknownMessage(message_id))?;
        if target.role != MessageRole::Assistant {
            return Err(Rejection::NotAssistant(message_id));
        }
        let user_id = match self.store.predecessor(message_id) {
            Some(prev) if prev.role == MessageRole::User => prev.id,
            _ => return Err(Rejection::NoPrecedingUser(message_id)),
        };

        let history = self.context(self.store.history_before(user_id));
        let prompt = self.store.truncate_after(user_id)?;
        tracing::debug!(
            replaced = %message_id,
            user_id = %user_id,
            "Regenerating response"
        );

        self.start_turn(prompt, history).await
    }

    /// Regenerate the most recent assistant message
    ///
    /// # Errors
    ///
    /// As [`Self::regenerate`], or [`Rejection::NothingToRegenerate`] when the
    /// conversation has no assistant message.
    pub async fn regenerate_last(&mut self) -> Result<(), Rejection> {
        self.ensure_idle()?;
        let id = self
            .store
            .last_assistant_id()
            .ok_or(Rejection::NothingToRegenerate)?;
        self.regenerate(id).await
    }

    /// Start a new, empty conversation
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::Busy`] while a turn runs.
    pub fn clear(&mut self) -> Result<(), Rejection> {
        self.ensure_idle()?;
        let removed = self.store.len();
        self.store.clear();
        tracing::info!(removed, "Conversation cleared");
        Ok(())
    }

    /// Use another model from the next turn on
    ///
    /// Catalog display names are mapped to their identifiers. A running turn
    /// keeps the model it was started with. Returns the identifier in use.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::EmptyInput`] for a blank name.
    pub fn select_model(&mut self, model: &str) -> Result<&str, Rejection> {
        if model.trim().is_empty() {
            return Err(Rejection::EmptyInput);
        }
        self.config.model = resolve_model(model);
        tracing::info!(model = %self.config.model, "Model selected");
        Ok(&self.config.model)
    }

    /// Read and process the next chunk of the reply
    ///
    /// Returns `false` when no turn is streaming. Cancel-safe: the only await
    /// is on the stream itself, so this can sit in a `tokio::select!` next to
    /// user input without losing data.
    pub async fn poll_streaming(&mut self) -> bool {
        let Some(turn) = self.turn.as_mut() else {
            return false;
        };

        let next = turn.stream.next().await;
        match next {
            Some(Ok(chunk)) => self.process_chunk(&chunk),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Response stream failed");
                self.fail_turn();
            }
            None => {
                let dropped = turn.decoder.finish();
                tracing::warn!(
                    dropped_bytes = dropped,
                    "Response stream ended without terminal sentinel"
                );
                self.fail_turn();
            }
        }

        true
    }

    /// Drive the current turn, if any, to completion
    ///
    /// Never returns while the transport keeps the stream open without
    /// sending anything.
    pub async fn run_until_idle(&mut self) {
        while self.poll_streaming().await {}
    }

    /// Decode, extract and accumulate one chunk
    fn process_chunk(&mut self, chunk: &[u8]) {
        let Some(mut turn) = self.turn.take() else {
            return;
        };

        turn.decoder.push(chunk);
        while let Some(line) = turn.decoder.next_line() {
            match self.extractor.extract(&line) {
                Some(StreamEvent::Fragment(fragment)) => {
                    if let Err(e) = turn.accumulator.append(&mut self.store, fragment) {
                        tracing::error!(error = %e, "Lost the in-flight message");
                        self.roll_back(turn.accumulator);
                        return;
                    }
                }
                Some(StreamEvent::Done) => {
                    self.finish_turn(turn);
                    return;
                }
                None => {}
            }
        }

        self.turn = Some(turn);
    }

    /// Create the placeholder and open the reply stream
    async fn start_turn(
        &mut self,
        prompt: String,
        history: Vec<HistoryEntry>,
    ) -> Result<(), Rejection> {
        let accumulator = TurnAccumulator::begin(&mut self.store)?;
        self.set_state(TurnState::Submitting);

        let request = CompletionRequest::new(prompt, self.config.model.clone())
            .with_history(history)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let pending = PendingTurn {
            accumulator: Some(accumulator),
            store: &mut self.store,
            state: &mut self.state,
            tx: &self.tx,
            error_text: &self.config.error_text,
        };
        let opened = self.transport.open_stream(&request).await;
        let Some(accumulator) = pending.connected() else {
            return Ok(());
        };

        match opened {
            Ok(stream) => {
                self.turn = Some(ActiveTurn {
                    accumulator,
                    decoder: LineDecoder::new(),
                    stream,
                    started: Instant::now(),
                });
                self.set_state(TurnState::Streaming);
            }
            Err(e) => {
                tracing::warn!(
                    transport = self.transport.name(),
                    error = %e,
                    "Transport rejected request"
                );
                self.roll_back(accumulator);
            }
        }

        Ok(())
    }

    /// Terminal sentinel seen: promote the reply and return to `Idle`
    fn finish_turn(&mut self, turn: ActiveTurn) {
        self.set_state(TurnState::Finalizing);

        let ActiveTurn {
            accumulator,
            stream,
            started,
            ..
        } = turn;
        drop(stream);

        let message_id = accumulator.message_id();
        let fragments = accumulator.fragments();
        match accumulator.finalize(&mut self.store) {
            Ok(content) => tracing::info!(
                message_id = %message_id,
                fragments,
                chars = content.chars().count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Response complete"
            ),
            Err(e) => tracing::error!(error = %e, "Failed to finalize response"),
        }

        self.set_state(TurnState::Idle);
    }

    /// Mid-stream failure: discard the partial reply
    fn fail_turn(&mut self) {
        if let Some(turn) = self.turn.take() {
            self.roll_back(turn.accumulator);
        }
    }

    fn roll_back(&mut self, accumulator: TurnAccumulator) {
        roll_back(
            &mut self.store,
            &mut self.state,
            &self.tx,
            &self.config.error_text,
            accumulator,
        );
    }

    /// Prior history for a request, limited to the configured window
    fn context(&self, history: History<'_>) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = history.map(HistoryEntry::from).collect();
        let max = self.config.max_context_messages;
        if max > 0 && entries.len() > max {
            entries.drain(..entries.len() - max);
        }
        entries
    }

    fn ensure_idle(&self) -> Result<(), Rejection> {
        if self.state.is_idle() {
            Ok(())
        } else {
            Err(Rejection::Busy(self.state))
        }
    }

    fn set_state(&mut self, state: TurnState) {
        transition(&mut self.state, &self.tx, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{sse_body, ScriptedTransport};
    use pretty_assertions::assert_eq;

    fn conductor(
        transport: ScriptedTransport,
    ) -> (
        Conductor<ScriptedTransport>,
        mpsc::UnboundedReceiver<ConductorMessage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Conductor::new(transport, ConductorConfig::default(), tx),
            rx,
        )
    }

    fn states(rx: &mut mpsc::UnboundedReceiver<ConductorMessage>) -> Vec<TurnState> {
        let mut states = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let ConductorMessage::State { state } = msg {
                states.push(state);
            }
        }
        states
    }

    #[tokio::test]
    async fn test_conductor_creation() {
        let (conductor, _rx) = conductor(ScriptedTransport::new());
        assert_eq!(conductor.state(), TurnState::Idle);
        assert!(conductor.store().is_empty());
        assert_eq!(conductor.model(), "openai/gpt-oss-20b:free");
    }

    #[tokio::test]
    async fn test_successful_turn_states() {
        let transport = ScriptedTransport::new();
        transport.push_reply(&["Hi", " there"]);
        let (mut conductor, mut rx) = conductor(transport);

        conductor.submit("  hello  ").await.unwrap();
        assert_eq!(conductor.state(), TurnState::Streaming);
        conductor.run_until_idle().await;

        assert_eq!(
            states(&mut rx),
            vec![
                TurnState::Submitting,
                TurnState::Streaming,
                TurnState::Finalizing,
                TurnState::Idle,
            ]
        );

        let messages = conductor.store().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].content, "Hi there");
        assert!(!messages[1].in_flight);
    }

    #[tokio::test]
    async fn test_rejected_turn_states() {
        let transport = ScriptedTransport::new();
        transport.push_reject("offline");
        let (mut conductor, mut rx) = conductor(transport);

        conductor.submit("hello").await.unwrap();

        assert_eq!(
            states(&mut rx),
            vec![
                TurnState::Submitting,
                TurnState::RollingBack,
                TurnState::Idle,
            ]
        );
        let messages = conductor.store().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, DEFAULT_ERROR_TEXT);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (mut conductor, mut rx) = conductor(ScriptedTransport::new());
        assert_eq!(conductor.submit("   \n\t").await, Err(Rejection::EmptyInput));
        assert!(conductor.store().is_empty());
        assert!(rx.try_recv().is_err());
        assert!(conductor.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn test_history_excludes_new_prompt() {
        let transport = ScriptedTransport::new();
        transport.push_reply(&["one"]).push_reply(&["two"]);
        let (mut conductor, _rx) = conductor(transport);

        conductor.submit("first").await.unwrap();
        conductor.run_until_idle().await;
        conductor.submit("second").await.unwrap();
        conductor.run_until_idle().await;

        let requests = conductor.transport().requests();
        assert!(requests[0].history.is_empty());
        assert_eq!(requests[1].prompt, "second");
        assert_eq!(
            requests[1].history,
            vec![
                HistoryEntry::from((MessageRole::User, "first")),
                HistoryEntry::from((MessageRole::Assistant, "one")),
            ]
        );
    }

    #[tokio::test]
    async fn test_context_window() {
        let transport = ScriptedTransport::new();
        transport
            .push_reply(&["a1"])
            .push_reply(&["a2"])
            .push_reply(&["a3"]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = ConductorConfig {
            max_context_messages: 2,
            ..Default::default()
        };
        let mut conductor = Conductor::new(transport, config, tx);

        for q in ["q1", "q2", "q3"] {
            conductor.submit(q).await.unwrap();
            conductor.run_until_idle().await;
        }

        let last = conductor.transport().requests().pop().unwrap();
        assert_eq!(
            last.history,
            vec![
                HistoryEntry::from((MessageRole::User, "q2")),
                HistoryEntry::from((MessageRole::Assistant, "a2")),
            ]
        );
    }

    #[tokio::test]
    async fn test_lines_after_done_are_ignored() {
        let transport = ScriptedTransport::new();
        transport.push_chunks([
            "data: {\"delta\":\"ok\"}\ndata: [DONE]\ndata: {\"delta\":\"late\"}\n",
        ]);
        let (mut conductor, _rx) = conductor(transport);

        conductor.submit("q").await.unwrap();
        conductor.run_until_idle().await;

        assert_eq!(conductor.store().messages()[1].content, "ok");
        assert!(conductor.is_idle());
    }

    #[tokio::test]
    async fn test_request_parameters() {
        let transport = ScriptedTransport::new();
        transport.push_chunks(sse_body(&[], true));
        let (mut conductor, _rx) = conductor(transport);
        conductor.select_model("Neura Code").unwrap();

        conductor.submit("q").await.unwrap();
        conductor.run_until_idle().await;

        let requests = conductor.transport().requests();
        let request = &requests[0];
        assert_eq!(request.model, "moonshotai/kimi-k2:free");
        assert_eq!(request.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
        // An empty reply still finalizes
        assert_eq!(conductor.store().messages()[1].content, "");
        assert!(!conductor.store().messages()[1].in_flight);
    }

    #[tokio::test]
    async fn test_clear_only_when_idle() {
        let transport = ScriptedTransport::new();
        transport.push_stalled(sse_body(&["partial"], false));
        let (mut conductor, _rx) = conductor(transport);

        conductor.submit("q").await.unwrap();
        assert!(conductor.poll_streaming().await);
        assert_eq!(
            conductor.clear(),
            Err(Rejection::Busy(TurnState::Streaming))
        );
        assert_eq!(conductor.store().len(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let transport = ScriptedTransport::new();
        transport.push_reply(&["a"]);
        let (mut conductor, _rx) = conductor(transport);

        conductor.submit("q").await.unwrap();
        conductor.run_until_idle().await;
        conductor.clear().unwrap();
        assert!(conductor.store().is_empty());
    }

    #[tokio::test]
    async fn test_select_model_passthrough() {
        let (mut conductor, _rx) = conductor(ScriptedTransport::new());
        assert_eq!(conductor.select_model(" "), Err(Rejection::EmptyInput));
        assert_eq!(
            conductor.select_model("vendor/custom-model").unwrap(),
            "vendor/custom-model"
        );
    }

    #[tokio::test]
    async fn test_handle_event_routes() {
        let transport = ScriptedTransport::new();
        transport.push_reply(&["a"]);
        let (mut conductor, _rx) = conductor(transport);

        conductor
            .handle_event(SurfaceEvent::user_message("hi"))
            .await
            .unwrap();
        conductor.run_until_idle().await;
        assert_eq!(conductor.store().len(), 2);

        conductor.handle_event(SurfaceEvent::Clear).await.unwrap();
        assert!(conductor.store().is_empty());

        assert_eq!(
            conductor.handle_event(SurfaceEvent::RegenerateLast).await,
            Err(Rejection::NothingToRegenerate)
        );
    }
}
