//! Conversations command handler.

use super::chat::io_error;
use relaychat_client::ConversationStore;
use relaychat_error::{RelayChatResult, StoreError, StoreErrorKind};
use std::io::Write;

/// Prints the conversation index, newest first.
pub async fn handle_conversations_command<W: Write>(
    store: &dyn ConversationStore,
    json: bool,
    out: &mut W,
) -> RelayChatResult<()> {
    let index = store.list().await?;

    if json {
        let rendered = serde_json::to_string_pretty(&index)
            .map_err(|e| StoreError::new(StoreErrorKind::Serialization(e.to_string())))?;
        writeln!(out, "{}", rendered).map_err(io_error)?;
        return Ok(());
    }

    if index.is_empty() {
        writeln!(out, "No saved conversations").map_err(io_error)?;
    }
    for entry in index {
        let star = if entry.starred { "*" } else { " " };
        writeln!(out, "{} {}  {}", star, entry.conversation_id, entry.alias).map_err(io_error)?;
    }
    Ok(())
}
