//! Conversation persistence.
//!
//! The store keeps an index of [`ConversationSummary`] entries, newest first,
//! and one message list per conversation.

use async_trait::async_trait;
use relaychat_core::{ConversationSummary, Message};
use relaychat_error::{StoreError, StoreErrorKind, StoreResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

const INDEX_FILE: &str = "conversations.json";

/// Persistence for conversations and their messages.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The index, newest first.
    async fn list(&self) -> StoreResult<Vec<ConversationSummary>>;

    /// Put a conversation at the top of the index, replacing an entry with
    /// the same id.
    async fn add(&self, summary: ConversationSummary) -> StoreResult<()>;

    /// Change a conversation's display name.
    async fn rename(&self, conversation_id: &str, alias: &str) -> StoreResult<()>;

    /// Star or unstar a conversation.
    async fn set_starred(&self, conversation_id: &str, starred: bool) -> StoreResult<()>;

    /// Remove a conversation and its messages. Unknown ids are not an error.
    async fn delete(&self, conversation_id: &str) -> StoreResult<()>;

    /// Remove every conversation.
    async fn delete_all(&self) -> StoreResult<()>;

    /// Messages of a conversation; empty if none were saved.
    async fn load_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>>;

    /// Replace the messages of a conversation.
    async fn save_messages(&self, conversation_id: &str, messages: &[Message]) -> StoreResult<()>;

    /// Drop the message at `index` and everything after it.
    async fn truncate_messages(&self, conversation_id: &str, index: usize) -> StoreResult<()> {
        let mut messages = self.load_messages(conversation_id).await?;
        messages.truncate(index);
        self.save_messages(conversation_id, &messages).await
    }
}

fn not_found(conversation_id: &str) -> StoreError {
    StoreError::new(StoreErrorKind::NotFound(conversation_id.to_string()))
}

fn upsert(index: &mut Vec<ConversationSummary>, summary: ConversationSummary) {
    index.retain(|entry| entry.conversation_id != summary.conversation_id);
    index.insert(0, summary);
}

fn find_mut<'a>(
    index: &'a mut [ConversationSummary],
    conversation_id: &str,
) -> StoreResult<&'a mut ConversationSummary> {
    index
        .iter_mut()
        .find(|entry| entry.conversation_id == conversation_id)
        .ok_or_else(|| not_found(conversation_id))
}

#[derive(Debug, Default)]
struct MemoryState {
    index: Vec<ConversationSummary>,
    messages: HashMap<String, Vec<Message>>,
}

/// Store held in memory, for tests and throwaway sessions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn list(&self) -> StoreResult<Vec<ConversationSummary>> {
        Ok(self.state.read().await.index.clone())
    }

    async fn add(&self, summary: ConversationSummary) -> StoreResult<()> {
        upsert(&mut self.state.write().await.index, summary);
        Ok(())
    }

    async fn rename(&self, conversation_id: &str, alias: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        find_mut(&mut state.index, conversation_id)?.alias = alias.to_string();
        Ok(())
    }

    async fn set_starred(&self, conversation_id: &str, starred: bool) -> StoreResult<()> {
        let mut state = self.state.write().await;
        find_mut(&mut state.index, conversation_id)?.set_starred(starred);
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .index
            .retain(|entry| entry.conversation_id != conversation_id);
        state.messages.remove(conversation_id);
        Ok(())
    }

    async fn delete_all(&self) -> StoreResult<()> {
        *self.state.write().await = MemoryState::default();
        Ok(())
    }

    async fn load_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_messages(&self, conversation_id: &str, messages: &[Message]) -> StoreResult<()> {
        self.state
            .write()
            .await
            .messages
            .insert(conversation_id.to_string(), messages.to_vec());
        Ok(())
    }
}

/// Store backed by a directory of JSON files.
///
/// The index lives in `conversations.json`; each conversation's messages in
/// `chat_<id>.json`. Files are replaced atomically through a temporary file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    index_lock: Arc<RwLock<()>>,
}

impl JsonFileStore {
    /// Opens a store rooted at `dir`, which is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index_lock: Arc::new(RwLock::new(())),
        }
    }

    /// Platform data directory for the store.
    pub fn default_location() -> StoreResult<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join("relaychat"))
            .ok_or_else(|| {
                StoreError::new(StoreErrorKind::Io(
                    "Could not determine data directory".to_string(),
                ))
            })
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn messages_path(&self, conversation_id: &str) -> StoreResult<PathBuf> {
        let valid = !conversation_id.is_empty()
            && conversation_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::new(StoreErrorKind::Io(format!(
                "Invalid conversation id: {:?}",
                conversation_id
            ))));
        }
        Ok(self.dir.join(format!("chat_{}.json", conversation_id)))
    }

    async fn read_json<T>(&self, path: &Path) -> StoreResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path, e)),
        };
        serde_json::from_slice(&content).map(Some).map_err(|e| {
            StoreError::new(StoreErrorKind::Serialization(format!(
                "{}: {}",
                path.display(),
                e
            )))
        })
    }

    async fn write_json<T>(&self, path: &Path, value: &T) -> StoreResult<()>
    where
        T: serde::Serialize + ?Sized,
    {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| StoreError::new(StoreErrorKind::Serialization(e.to_string())))?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| io_error(path, e))?;
        debug!(path = %path.display(), "Wrote store file");
        Ok(())
    }

    async fn read_index(&self) -> StoreResult<Vec<ConversationSummary>> {
        Ok(self
            .read_json(&self.dir.join(INDEX_FILE))
            .await?
            .unwrap_or_default())
    }

    async fn write_index(&self, index: &[ConversationSummary]) -> StoreResult<()> {
        self.write_json(&self.dir.join(INDEX_FILE), index).await
    }

    async fn update_index<F>(&self, update: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Vec<ConversationSummary>) -> StoreResult<()> + Send,
    {
        let _guard = self.index_lock.write().await;
        let mut index = self.read_index().await?;
        update(&mut index)?;
        self.write_index(&index).await
    }
}

#[track_caller]
fn io_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::new(StoreErrorKind::Io(format!("{}: {}", path.display(), err)))
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn list(&self) -> StoreResult<Vec<ConversationSummary>> {
        let _guard = self.index_lock.read().await;
        self.read_index().await
    }

    #[instrument(skip(self, summary), fields(conversation = %summary.conversation_id))]
    async fn add(&self, summary: ConversationSummary) -> StoreResult<()> {
        self.messages_path(&summary.conversation_id)?;
        self.update_index(|index| {
            upsert(index, summary);
            Ok(())
        })
        .await
    }

    async fn rename(&self, conversation_id: &str, alias: &str) -> StoreResult<()> {
        self.update_index(|index| {
            find_mut(index, conversation_id)?.alias = alias.to_string();
            Ok(())
        })
        .await
    }

    async fn set_starred(&self, conversation_id: &str, starred: bool) -> StoreResult<()> {
        self.update_index(|index| {
            find_mut(index, conversation_id)?.set_starred(starred);
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, conversation_id: &str) -> StoreResult<()> {
        let path = self.messages_path(conversation_id)?;
        self.update_index(|index| {
            index.retain(|entry| entry.conversation_id != conversation_id);
            Ok(())
        })
        .await?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    #[instrument(skip(self))]
    async fn delete_all(&self) -> StoreResult<()> {
        let _guard = self.index_lock.write().await;
        let index = self.read_index().await?;
        for entry in &index {
            let path = self.messages_path(&entry.conversation_id)?;
            match tokio::fs::remove_file(&path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(io_error(&path, e));
                }
                _ => {}
            }
        }
        self.write_index(&[]).await
    }

    async fn load_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let path = self.messages_path(conversation_id)?;
        Ok(self.read_json(&path).await?.unwrap_or_default())
    }

    #[instrument(skip(self, messages), fields(count = messages.len()))]
    async fn save_messages(&self, conversation_id: &str, messages: &[Message]) -> StoreResult<()> {
        let path = self.messages_path(conversation_id)?;
        self.write_json(&path, messages).await
    }
}
