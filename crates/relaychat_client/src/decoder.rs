//! Incremental decoding of a streamed generation body.
//!
//! Network reads split the body at arbitrary byte offsets, including inside
//! a line or inside a multi-byte UTF-8 sequence. The decoder accumulates raw
//! bytes and only interprets complete lines, so what it yields does not
//! depend on how the body was chunked.

use relaychat_core::StreamRecord;
use tracing::trace;

/// Where the decoder is in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecoderState {
    /// Collecting bytes of the current line.
    #[default]
    AccumulatingLine,
    /// The end-of-stream sentinel was seen; further input is ignored.
    Done,
}

/// Line-reassembling decoder turning body chunks into [`StreamRecord`]s.
///
/// # Examples
///
/// ```
/// use relaychat_client::RecordDecoder;
/// use relaychat_core::StreamRecord;
///
/// let mut decoder = RecordDecoder::new();
/// assert!(decoder.push(b"data: {\"tok").is_empty());
/// assert_eq!(
///     decoder.push(b"en\": \"Hi\"}\ndata: [DONE]\n"),
///     vec![StreamRecord::Token("Hi".to_string()), StreamRecord::Done]
/// );
/// assert!(decoder.is_done());
/// ```
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buffer: Vec<u8>,
    state: DecoderState,
}

impl RecordDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Whether the end-of-stream sentinel has been decoded.
    pub fn is_done(&self) -> bool {
        self.state == DecoderState::Done
    }

    /// Bytes of an incomplete trailing line.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one chunk and return the records completed by it, in order.
    ///
    /// Nothing is returned after [`StreamRecord::Done`].
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamRecord> {
        let mut records = Vec::new();
        if self.is_done() {
            return records;
        }

        let mut start = 0;
        while let Some(offset) = chunk[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            self.buffer.extend_from_slice(&chunk[start..end]);
            start = end + 1;

            let line = std::mem::take(&mut self.buffer);
            if self.dispatch(&line, &mut records) {
                return records;
            }
        }
        self.buffer.extend_from_slice(&chunk[start..]);
        records
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<StreamRecord> {
        if self.is_done() || self.buffer.is_empty() {
            self.buffer.clear();
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        let mut records = Vec::with_capacity(1);
        self.dispatch(&line, &mut records);
        records.pop()
    }

    /// Interpret one complete line. Returns `true` once the stream is done.
    fn dispatch(&mut self, line: &[u8], records: &mut Vec<StreamRecord>) -> bool {
        // '\n' never occurs inside a multi-byte sequence, so a complete line of
        // a valid UTF-8 body is valid UTF-8 on its own.
        let line = String::from_utf8_lossy(line);
        let Some(record) = StreamRecord::parse_line(&line) else {
            return false;
        };
        trace!(?record, "Decoded stream record");
        let done = record == StreamRecord::Done;
        records.push(record);
        if done {
            self.state = DecoderState::Done;
            self.buffer.clear();
        }
        done
    }
}
