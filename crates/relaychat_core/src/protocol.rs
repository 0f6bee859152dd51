//! HTTP-level conventions shared by the relay and its clients.

/// Request header carrying a client-chosen buffered deadline, in seconds.
///
/// The relay clamps the value to its configured maximum.
pub const TIMEOUT_HEADER: &str = "x-relay-timeout-secs";

/// How a generation response is delivered, decided by its content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseMode {
    /// A single JSON document.
    Buffered,
    /// An incrementally delivered body.
    Stream,
}

impl ResponseMode {
    /// Classify a response from its `Content-Type` header.
    ///
    /// JSON media types (`application/json`, `*+json`) are buffered; anything
    /// else, including a missing header, is streamed through untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use relaychat_core::ResponseMode;
    ///
    /// assert_eq!(
    ///     ResponseMode::from_content_type(Some("application/json; charset=utf-8")),
    ///     ResponseMode::Buffered
    /// );
    /// assert_eq!(
    ///     ResponseMode::from_content_type(Some("text/event-stream")),
    ///     ResponseMode::Stream
    /// );
    /// ```
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let essence = content_type
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase());
        match essence {
            Some(mime) if mime == "application/json" || mime.ends_with("+json") => {
                ResponseMode::Buffered
            }
            _ => ResponseMode::Stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_content_type_streams() {
        assert_eq!(ResponseMode::from_content_type(None), ResponseMode::Stream);
    }

    #[test]
    fn test_problem_json_is_buffered() {
        assert_eq!(
            ResponseMode::from_content_type(Some("application/problem+json")),
            ResponseMode::Buffered
        );
    }

    #[test]
    fn test_plain_text_streams() {
        assert_eq!(
            ResponseMode::from_content_type(Some("text/plain; charset=utf-8")),
            ResponseMode::Stream
        );
    }
}
