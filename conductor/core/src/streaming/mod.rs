//! Streaming Response Assembly
//!
//! Turns the transport's byte stream into a growing assistant message.
//!
//! # Pipeline
//!
//! ```text
//! bytes ──► LineDecoder ──► lines ──► DeltaExtractor ──► StreamEvent
//!                                                          │
//!                         Fragment ◄───────────────────────┤
//!                            │                             │
//!                            ▼                            Done
//!                     TurnAccumulator ──► ConversationStore ──► sink
//! ```
//!
//! Each stage is synchronous. The only suspension point of a turn is reading
//! the next chunk, which the [`Conductor`](crate::Conductor) does; everything
//! here runs to completion on the chunk it is given.
//!
//! # Example
//!
//! ```
//! use neura_conductor::streaming::{DeltaExtractor, LineDecoder, StreamEvent};
//!
//! let mut decoder = LineDecoder::new();
//! let extractor = DeltaExtractor::default();
//!
//! decoder.push(b"data: {\"delta\":\"He");
//! decoder.push(b"llo\"}\ndata: [DONE]\n");
//!
//! let events: Vec<_> = decoder.lines().filter_map(|l| extractor.extract(&l)).collect();
//! assert_eq!(events.len(), 2);
//! assert_eq!(events[1], StreamEvent::Done);
//! ```

mod accumulator;
mod decoder;
mod extractor;

pub use accumulator::TurnAccumulator;
pub use decoder::{LineDecoder, Lines};
pub use extractor::{
    DeltaExtractor, ExtractorSettings, StreamEvent, TextFragment, DEFAULT_DELTA_PATHS,
    DEFAULT_DONE_SENTINEL, DEFAULT_EVENT_PREFIX,
};
