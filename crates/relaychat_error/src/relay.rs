//! Relay error types.

/// Kinds of relay errors.
///
/// Every kind maps to exactly one HTTP status so the relay can always answer
/// with an explicit error instead of an empty success.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum RelayErrorKind {
    /// Upload request carried no file part
    #[display("No file found in upload request")]
    MissingFile,
    /// Local storage write or read failed
    #[display("I/O error: {}", _0)]
    Io(String),
    /// Backend could not be reached or failed at the transport level
    #[display("Backend unavailable: {}", _0)]
    BackendUnavailable(String),
    /// Buffered backend call exceeded its deadline (seconds)
    #[display("Backend did not answer within {}s", _0)]
    Timeout(u64),
    /// Client request could not be interpreted
    #[display("Invalid request: {}", _0)]
    InvalidRequest(String),
    /// Backend answered with a body the relay could not interpret
    #[display("Invalid backend response: {}", _0)]
    InvalidBackendResponse(String),
    /// Request body exceeded the configured transport cap
    #[display("Payload too large: {}", _0)]
    PayloadTooLarge(String),
    /// Relay configuration is invalid
    #[display("Configuration error: {}", _0)]
    Config(String),
}

impl RelayErrorKind {
    /// HTTP status code reported to the caller for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayErrorKind::MissingFile => 400,
            RelayErrorKind::InvalidRequest(_) => 400,
            RelayErrorKind::PayloadTooLarge(_) => 413,
            RelayErrorKind::Io(_) => 500,
            RelayErrorKind::BackendUnavailable(_) => 500,
            RelayErrorKind::Config(_) => 500,
            RelayErrorKind::InvalidBackendResponse(_) => 502,
            RelayErrorKind::Timeout(_) => 504,
        }
    }

    /// Stable machine-readable name, used as the `kind` field of error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RelayErrorKind::MissingFile => "missing_file",
            RelayErrorKind::Io(_) => "io_error",
            RelayErrorKind::BackendUnavailable(_) => "backend_unavailable",
            RelayErrorKind::Timeout(_) => "timeout",
            RelayErrorKind::InvalidRequest(_) => "invalid_request",
            RelayErrorKind::InvalidBackendResponse(_) => "invalid_backend_response",
            RelayErrorKind::PayloadTooLarge(_) => "payload_too_large",
            RelayErrorKind::Config(_) => "config_error",
        }
    }
}

/// Relay error with location tracking.
///
/// # Examples
///
/// ```
/// use relaychat_error::{RelayError, RelayErrorKind};
///
/// let err = RelayError::new(RelayErrorKind::MissingFile);
/// assert_eq!(err.kind.status_code(), 400);
/// assert!(format!("{}", err).contains("No file"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Relay Error: {} at line {} in {}", kind, line, file)]
pub struct RelayError {
    /// The kind of error that occurred
    pub kind: RelayErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl RelayError {
    /// Create a new relay error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RelayErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Message shown to callers, without the source location.
    pub fn public_message(&self) -> String {
        self.kind.to_string()
    }
}

impl From<RelayErrorKind> for RelayError {
    #[track_caller]
    fn from(kind: RelayErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
