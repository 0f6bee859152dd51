//! Transcript messages.

use crate::{Part, Role};
use serde::{Deserialize, Serialize};

/// Unique identifier of a transcript message.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generates a fresh identifier of the form `msg_<millis>_<random>`.
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("msg_{}_{}", millis, &random[..9]))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Delivery state of a message.
///
/// Only assistant placeholders ever leave `Complete`; every other message is
/// created complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Tokens are still arriving.
    Streaming,
    /// The message is final.
    #[default]
    Complete,
    /// The request was abandoned before completion.
    Cancelled,
    /// The stream failed part-way.
    Interrupted,
}

impl MessageStatus {
    /// Whether the message no longer accepts tokens.
    pub fn is_final(&self) -> bool {
        !matches!(self, MessageStatus::Streaming)
    }
}

/// A transcript entry.
///
/// # Examples
///
/// ```
/// use relaychat_core::{Message, Part, Role};
///
/// let message = Message::new(Role::User, vec![Part::text("Hello!")]);
///
/// assert_eq!(*message.role(), Role::User);
/// assert_eq!(message.text(), "Hello!");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Message {
    /// Unique identifier
    id: MessageId,
    /// The role of the message sender
    role: Role,
    /// Ordered content parts
    content: Vec<Part>,
    /// Delivery state
    #[serde(default)]
    status: MessageStatus,
}

impl Message {
    /// Creates a complete message with a fresh identifier.
    pub fn new(role: Role, content: Vec<Part>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content,
            status: MessageStatus::Complete,
        }
    }

    /// Creates an empty assistant placeholder awaiting stream tokens.
    pub fn placeholder() -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::Assistant,
            content: Vec::new(),
            status: MessageStatus::Streaming,
        }
    }

    /// Creates a complete assistant message holding a single text part.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Part::text(text)])
    }

    /// Creates an error entry.
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Role::Error, vec![Part::text(text)])
    }

    /// Concatenated text of all text parts, in order.
    pub fn text(&self) -> String {
        self.content.iter().filter_map(Part::as_text).collect()
    }

    /// Appends a token to the trailing text part, creating one if needed.
    ///
    /// Returns `false` without changing anything when the message is final.
    pub fn append_token(&mut self, token: &str) -> bool {
        if self.status.is_final() {
            return false;
        }
        match self.content.last_mut() {
            Some(Part::Text { text }) => text.push_str(token),
            _ => self.content.push(Part::text(token)),
        }
        true
    }

    /// Moves a streaming message into a final state.
    ///
    /// Returns `false` if the message was already final.
    pub fn finish(&mut self, status: MessageStatus) -> bool {
        if self.status.is_final() || !status.is_final() {
            return false;
        }
        self.status = status;
        true
    }
}
