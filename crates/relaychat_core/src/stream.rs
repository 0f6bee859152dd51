//! Framing of streamed generation output.
//!
//! A stream is a sequence of newline-terminated records. Records starting with
//! [`EVENT_PREFIX`] carry a payload that is either the [`DONE_SENTINEL`] or a
//! JSON object such as `{"token": "..."}`. Everything else (blank separator
//! lines, comments, other SSE fields) carries no payload.

use serde::{Deserialize, Serialize};

/// Prefix marking a record that carries a payload.
pub const EVENT_PREFIX: &str = "data:";

/// Payload that terminates a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded stream record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamRecord {
    /// Incremental text to append.
    Token(String),
    /// End of stream.
    Done,
    /// Well-formed payload without text, such as token usage.
    Other,
    /// Payload that is not valid JSON; carries the raw payload.
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct RecordPayload {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Payload emitted by a producer for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Incremental text
    pub token: String,
}

impl StreamRecord {
    /// Parses one complete line (without its terminator).
    ///
    /// Returns `None` for lines that carry no payload.
    ///
    /// # Examples
    ///
    /// ```
    /// use relaychat_core::StreamRecord;
    ///
    /// assert_eq!(
    ///     StreamRecord::parse_line(r#"data: {"token":"Hi"}"#),
    ///     Some(StreamRecord::Token("Hi".to_string()))
    /// );
    /// assert_eq!(StreamRecord::parse_line("data: [DONE]"), Some(StreamRecord::Done));
    /// assert_eq!(StreamRecord::parse_line(""), None);
    /// ```
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let payload = line.strip_prefix(EVENT_PREFIX)?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        if payload.trim() == DONE_SENTINEL {
            return Some(StreamRecord::Done);
        }

        match serde_json::from_str::<RecordPayload>(payload) {
            Ok(RecordPayload {
                token: Some(token), ..
            }) => Some(StreamRecord::Token(token)),
            Ok(RecordPayload {
                content: Some(content),
                ..
            }) => Some(StreamRecord::Token(content)),
            Ok(_) => Some(StreamRecord::Other),
            Err(_) => Some(StreamRecord::Malformed(payload.to_string())),
        }
    }

    /// Encodes the record as a framed line, terminator included.
    ///
    /// `Other` and `Malformed` records encode to their literal payloads so
    /// producers and test fixtures can emit them too.
    pub fn to_frame(&self) -> String {
        match self {
            StreamRecord::Token(token) => {
                let payload = TokenPayload {
                    token: token.clone(),
                };
                // Serializing a struct of one String cannot fail.
                let json = serde_json::to_string(&payload).unwrap_or_default();
                format!("{} {}\n", EVENT_PREFIX, json)
            }
            StreamRecord::Done => format!("{} {}\n", EVENT_PREFIX, DONE_SENTINEL),
            StreamRecord::Other => format!("{} {{}}\n", EVENT_PREFIX),
            StreamRecord::Malformed(raw) => format!("{} {}\n", EVENT_PREFIX, raw),
        }
    }
}
