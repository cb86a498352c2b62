//! Scripted Transport
//!
//! A transport that replays canned byte streams instead of talking to a
//! network. Used by the test suites and handy for driving a surface without
//! an API key.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{ByteStream, CompletionRequest, CompletionTransport, TransportError};

/// One canned reply
#[derive(Clone, Debug)]
enum Script {
    /// Refuse to open the stream
    Reject(String),
    /// Never finish connecting
    Hang,
    /// Deliver these chunks; an `Err` item interrupts the stream
    Chunks {
        chunks: Vec<Result<Vec<u8>, String>>,
        hold_open: bool,
    },
}

/// Transport replaying queued scripts, one per `open_stream` call
///
/// When the queue runs dry every further request is rejected.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedTransport {
    /// Create a transport with nothing queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a rejection
    pub fn push_reject(&self, reason: impl Into<String>) -> &Self {
        self.scripts.lock().push_back(Script::Reject(reason.into()));
        self
    }

    /// Queue a connection attempt that never completes
    pub fn push_hung(&self) -> &Self {
        self.scripts.lock().push_back(Script::Hang);
        self
    }

    /// Queue a stream delivering `chunks` and then ending
    pub fn push_chunks<I, C>(&self, chunks: I) -> &Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        self.push(chunks.into_iter().map(|c| Ok(c.into())).collect(), false)
    }

    /// Queue a stream delivering `chunks` and then failing with `error`
    pub fn push_interrupted<I, C>(&self, chunks: I, error: impl Into<String>) -> &Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let mut items: Vec<Result<Vec<u8>, String>> = chunks.into_iter().map(|c| Ok(c.into())).collect();
        items.push(Err(error.into()));
        self.push(items, false)
    }

    /// Queue a stream delivering `chunks` and then never producing again
    pub fn push_stalled<I, C>(&self, chunks: I) -> &Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        self.push(chunks.into_iter().map(|c| Ok(c.into())).collect(), true)
    }

    /// Queue a well-formed reply: one `data:` line per fragment, then `[DONE]`
    pub fn push_reply(&self, fragments: &[&str]) -> &Self {
        self.push_chunks(sse_body(fragments, true))
    }

    /// Requests received so far, oldest first
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Scripts still queued
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.scripts.lock().len()
    }

    fn push(&self, chunks: Vec<Result<Vec<u8>, String>>, hold_open: bool) -> &Self {
        self.scripts
            .lock()
            .push_back(Script::Chunks { chunks, hold_open });
        self
    }
}

/// Encode fragments as server-sent event lines, one chunk per line
#[must_use]
pub fn sse_body(fragments: &[&str], done: bool) -> Vec<Vec<u8>> {
    let mut lines: Vec<Vec<u8>> = fragments
        .iter()
        .map(|text| format!("data: {}\n", serde_json::json!({ "delta": text })).into_bytes())
        .collect();
    if done {
        lines.push(b"data: [DONE]\n".to_vec());
    }
    lines
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    async fn open_stream(&self, request: &CompletionRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().push(request.clone());

        let script = self.scripts.lock().pop_front();
        match script {
            None => Err(TransportError::Rejected("no scripted reply left".to_string())),
            Some(Script::Reject(reason)) => Err(TransportError::Rejected(reason)),
            Some(Script::Hang) => futures::future::pending().await,
            Some(Script::Chunks { chunks, hold_open }) => {
                use futures::StreamExt;

                let items = futures::stream::iter(
                    chunks
                        .into_iter()
                        .map(|c| c.map_err(TransportError::Interrupted)),
                );
                if hold_open {
                    Ok(Box::pin(items.chain(futures::stream::pending())))
                } else {
                    Ok(Box::pin(items))
                }
            }
        }
    }
}
