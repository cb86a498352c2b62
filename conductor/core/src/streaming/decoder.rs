//! Line Decoder
//!
//! Turns raw byte chunks from the transport into complete text lines.
//!
//! Chunks carry no framing guarantees: a chunk may be empty, a line may span
//! any number of chunks, and a multi-byte character may be split between two
//! chunks. The decoder carries both the incomplete UTF-8 tail and the partial
//! line over to the next [`LineDecoder::push`].

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Decoder state machine for streaming line parsing
///
/// Buffers incoming bytes and yields complete lines.
#[derive(Debug)]
pub struct LineDecoder {
    /// Decoded text not yet handed out as lines
    buffer: String,
    /// Position where we've consumed up to
    read_pos: usize,
    /// Bytes of an unfinished UTF-8 sequence from the previous chunk
    pending: Vec<u8>,
    /// Malformed sequences replaced with U+FFFD so far
    replaced: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            pending: Vec::new(),
            replaced: 0,
        }
    }

    /// Decode a chunk and append it to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos == self.buffer.len() {
            self.buffer.clear();
            self.read_pos = 0;
        } else if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }

        let joined;
        let input: &[u8] = if self.pending.is_empty() {
            data
        } else {
            self.pending.extend_from_slice(data);
            joined = std::mem::take(&mut self.pending);
            &joined
        };

        self.replaced += decode_utf8(input, &mut self.buffer, &mut self.pending);
    }

    /// Try to take the next complete line
    ///
    /// The terminating `\n` (and a `\r` before it) is not part of the line.
    /// Returns `None` when only a partial line is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        let rest = &self.buffer[self.read_pos..];
        let newline = rest.find('\n')?;

        let raw = &rest[..newline];
        let line = raw.strip_suffix('\r').unwrap_or(raw).to_string();
        self.read_pos += newline + 1;
        Some(line)
    }

    /// Iterate over the complete lines currently buffered
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { decoder: self }
    }

    /// Get the number of decoded bytes waiting for a newline
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Number of malformed byte sequences replaced so far
    #[must_use]
    pub fn replaced(&self) -> usize {
        self.replaced
    }

    /// End of stream: discard the unterminated tail
    ///
    /// Returns how many bytes were dropped. A partial line is never delivered
    /// as if it were complete.
    pub fn finish(&mut self) -> usize {
        let dropped = self.available() + self.pending.len();
        self.clear();
        dropped
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
        self.pending.clear();
    }
}

/// Lazy iterator over complete lines, see [`LineDecoder::lines`]
#[derive(Debug)]
pub struct Lines<'a> {
    decoder: &'a mut LineDecoder,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.decoder.next_line()
    }
}

/// Decode `input` into `out`, replacing malformed sequences
///
/// An incomplete sequence at the very end of `input` is moved to `carry`
/// instead of being replaced. Returns the number of replacements made.
fn decode_utf8(mut input: &[u8], out: &mut String, carry: &mut Vec<u8>) -> usize {
    let mut replaced = 0;

    loop {
        match std::str::from_utf8(input) {
            Ok(text) => {
                out.push_str(text);
                return replaced;
            }
            Err(e) => {
                let (valid, rest) = input.split_at(e.valid_up_to());
                out.push_str(&String::from_utf8_lossy(valid));

                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        replaced += 1;
                        input = &rest[len..];
                    }
                    None => {
                        carry.extend_from_slice(rest);
                        return replaced;
                    }
                }
            }
        }
    }
}
