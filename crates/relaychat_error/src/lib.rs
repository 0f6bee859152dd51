//! Error types for the relaychat workspace.
//!
//! Each concern gets its own kind enum and a location-tracked error struct.
//! [`RelayChatError`] unifies them for binaries that touch several layers.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod config;
mod relay;
mod store;

pub use client::{ClientError, ClientErrorKind, ClientResult};
pub use config::ConfigError;
pub use relay::{RelayError, RelayErrorKind, RelayResult};
pub use store::{StoreError, StoreErrorKind, StoreResult};

/// Crate-level error variants.
#[derive(Debug, derive_more::From)]
pub enum RelayChatErrorKind {
    /// Relay error
    Relay(RelayError),
    /// Client pipeline error
    Client(ClientError),
    /// Configuration error
    Config(ConfigError),
    /// Conversation store error
    Store(StoreError),
}

impl std::fmt::Display for RelayChatErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayChatErrorKind::Relay(e) => write!(f, "{}", e),
            RelayChatErrorKind::Client(e) => write!(f, "{}", e),
            RelayChatErrorKind::Config(e) => write!(f, "{}", e),
            RelayChatErrorKind::Store(e) => write!(f, "{}", e),
        }
    }
}

/// Relaychat error with kind discrimination.
#[derive(Debug)]
pub struct RelayChatError(Box<RelayChatErrorKind>);

impl RelayChatError {
    /// Create a new error from a kind.
    pub fn new(kind: RelayChatErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &RelayChatErrorKind {
        &self.0
    }
}

impl std::fmt::Display for RelayChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Relaychat Error: {}", self.0)
    }
}

impl std::error::Error for RelayChatError {}

impl<T> From<T> for RelayChatError
where
    T: Into<RelayChatErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for relaychat operations.
pub type RelayChatResult<T> = std::result::Result<T, RelayChatError>;
