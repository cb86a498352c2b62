//! Delta Extractor
//!
//! Interprets one decoded line of the response stream. A line is either a
//! payload carrying a piece of the reply, the terminal sentinel, or noise
//! (blank keep-alives, `:` comments, `event:`/`id:` fields, malformed JSON).

use serde_json::Value;

/// Default payload line prefix
pub const DEFAULT_EVENT_PREFIX: &str = "data:";

/// Default payload value marking the end of a reply
pub const DEFAULT_DONE_SENTINEL: &str = "[DONE]";

/// Default JSON pointers tried, in order, to find the incremental text
pub const DEFAULT_DELTA_PATHS: &[&str] = &["/choices/0/delta/content", "/delta"];

/// A piece of reply text, always non-empty
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextFragment(String);

impl TextFragment {
    /// Borrow the fragment text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the fragment text
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for TextFragment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What a single line means for the turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// More reply text
    Fragment(TextFragment),
    /// The reply is complete; stop reading
    Done,
}

/// Wire format settings for the extractor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractorSettings {
    /// Prefix identifying payload lines
    pub event_prefix: String,
    /// Payload that terminates the stream
    pub done_sentinel: String,
    /// JSON pointers to the incremental text, tried in order
    pub delta_paths: Vec<String>,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            event_prefix: DEFAULT_EVENT_PREFIX.to_string(),
            done_sentinel: DEFAULT_DONE_SENTINEL.to_string(),
            delta_paths: DEFAULT_DELTA_PATHS.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

/// Stateless line interpreter
#[derive(Clone, Debug, Default)]
pub struct DeltaExtractor {
    settings: ExtractorSettings,
}

impl DeltaExtractor {
    /// Create an extractor for the given wire format
    #[must_use]
    pub fn new(settings: ExtractorSettings) -> Self {
        Self { settings }
    }

    /// Get the wire format settings
    #[must_use]
    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Interpret one line
    ///
    /// Returns `None` for anything that carries no reply text. Malformed
    /// payloads are dropped here and never reach the conversation.
    #[must_use]
    pub fn extract(&self, line: &str) -> Option<StreamEvent> {
        let payload = line.strip_prefix(self.settings.event_prefix.as_str())?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        if payload.trim_end() == self.settings.done_sentinel {
            return Some(StreamEvent::Done);
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::trace!(error = %e, "Skipping malformed payload");
                return None;
            }
        };

        let text = self
            .settings
            .delta_paths
            .iter()
            .filter_map(|path| value.pointer(path))
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty());

        match text {
            Some(text) => Some(StreamEvent::Fragment(TextFragment(text.to_string()))),
            None => {
                tracing::trace!("Payload carries no text");
                None
            }
        }
    }
}
