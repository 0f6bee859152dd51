//! The ordered list of messages of one conversation.

use relaychat_core::{Message, MessageId, MessageStatus};

/// Ordered messages, addressed by id.
///
/// Messages are only ever appended, mutated in place or removed; a placeholder
/// keeps its position while tokens stream into it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes a transcript from stored messages.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consumes the transcript and returns its messages.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript has no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Looks up a message.
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id() == id)
    }

    /// Appends a message and returns its id.
    pub fn push(&mut self, message: Message) -> MessageId {
        let id = message.id().clone();
        self.messages.push(message);
        id
    }

    /// Appends an error entry.
    pub fn push_error(&mut self, text: impl Into<String>) -> MessageId {
        self.push(Message::error(text))
    }

    /// Appends a token to a streaming message.
    ///
    /// Returns `false` if the message is gone or no longer streaming.
    pub fn append_token(&mut self, id: &MessageId, token: &str) -> bool {
        self.get_mut(id)
            .is_some_and(|message| message.append_token(token))
    }

    /// Moves a streaming message into a final state.
    ///
    /// Returns `false` if the message is gone or already final.
    pub fn finish(&mut self, id: &MessageId, status: MessageStatus) -> bool {
        self.get_mut(id)
            .is_some_and(|message| message.finish(status))
    }

    /// Removes a message.
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id() == id)?;
        Some(self.messages.remove(index))
    }

    /// Drops the message at `index` and everything after it.
    pub fn truncate_from(&mut self, index: usize) {
        self.messages.truncate(index);
    }
}
