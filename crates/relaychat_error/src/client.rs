//! Client-side error types.

/// Specific error conditions for the chat client pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ClientErrorKind {
    /// Network-level failure talking to the relay
    #[display("HTTP error: {}", _0)]
    Http(String),
    /// Relay answered with a non-success status
    #[display("Server error (status {}): {}", status, message)]
    Status {
        /// HTTP status code
        status: u16,
        /// Error message from the response body
        message: String,
    },
    /// Relay reported that the backend timed out
    #[display("Request timed out: {}", _0)]
    Timeout(String),
    /// Relay reported that the backend is unreachable
    #[display("Backend unavailable: {}", _0)]
    BackendUnavailable(String),
    /// Response body could not be interpreted
    #[display("Invalid response: {}", _0)]
    InvalidResponse(String),
    /// A single stream record could not be decoded
    #[display("Malformed stream record: {}", _0)]
    StreamParse(String),
    /// More files were offered than the queue accepts
    #[display("Upload limit of {} files exceeded, {} file(s) not queued", limit, rejected)]
    UploadCountExceeded {
        /// Maximum number of queued files
        limit: usize,
        /// Number of files dropped
        rejected: usize,
    },
    /// File exceeds the per-file size cap
    #[display("{} is {} bytes, exceeding the {} byte limit", name, size, limit)]
    FileTooLarge {
        /// File name
        name: String,
        /// File size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },
    /// Attachments are still uploading
    #[display("{} upload(s) still pending", _0)]
    UploadsPending(usize),
    /// A single file upload failed
    #[display("Upload of {} failed: {}", name, message)]
    Upload {
        /// File name
        name: String,
        /// Failure description
        message: String,
    },
    /// Nothing to send
    #[display("Message is empty")]
    EmptyMessage,
    /// Request was abandoned by the caller
    #[display("Request cancelled")]
    Cancelled,
    /// Local file access failed
    #[display("I/O error: {}", _0)]
    Io(String),
}

impl ClientErrorKind {
    /// Whether this kind is a soft error that must not abort a stream.
    pub fn is_soft(&self) -> bool {
        matches!(self, ClientErrorKind::StreamParse(_))
    }
}

/// Client error with location tracking.
///
/// # Examples
///
/// ```
/// use relaychat_error::{ClientError, ClientErrorKind};
///
/// let err = ClientError::new(ClientErrorKind::UploadsPending(2));
/// assert!(format!("{}", err).contains("2 upload(s)"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Client Error: {} at {}:{}", kind, file, line)]
pub struct ClientError {
    /// The specific error kind.
    pub kind: ClientErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// File where error occurred.
    pub file: &'static str,
}

impl ClientError {
    /// Creates a new error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ClientErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<ClientErrorKind> for ClientError {
    #[track_caller]
    fn from(kind: ClientErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
