//! Conversations and the conversation index.

use crate::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation and its ordered messages.
///
/// Conversations live only in client-side persistence; the relay never sees a
/// conversation identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Conversation {
    /// Conversation identifier
    conversation_id: String,
    /// Messages in transcript order
    messages: Vec<Message>,
}

impl Conversation {
    /// Creates a conversation from its parts.
    pub fn new(conversation_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages,
        }
    }

    /// Consumes the conversation and returns its messages.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// Entry of the conversation index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation identifier
    pub conversation_id: String,
    /// Display name
    #[serde(default)]
    pub alias: String,
    /// Whether the user starred the conversation
    #[serde(default)]
    pub starred: bool,
    /// When the conversation was starred
    #[serde(default)]
    pub starred_at: Option<DateTime<Utc>>,
}

impl ConversationSummary {
    /// Creates an unstarred summary.
    pub fn new(conversation_id: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            alias: alias.into(),
            starred: false,
            starred_at: None,
        }
    }

    /// Generates a fresh conversation identifier.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Stars or unstars the conversation, stamping the time when starring.
    pub fn set_starred(&mut self, starred: bool) {
        self.starred = starred;
        self.starred_at = starred.then(Utc::now);
    }
}
