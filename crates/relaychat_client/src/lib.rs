//! Client pipeline for the relaychat relay.
//!
//! [`ChatSession`] sends a message through [`RelayClient`] and folds the reply
//! into a [`Transcript`]: a buffered reply becomes one assistant message, a
//! streamed reply is decoded by [`RecordDecoder`] into a placeholder token by
//! token. Attachments go through an [`UploadQueue`] first, and finished
//! transcripts are kept by a [`ConversationStore`].
//!
//! # Example
//!
//! ```no_run
//! use relaychat_client::{ChatSession, ClientConfig, RelayClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let session = ChatSession::new(RelayClient::new(&config)?, *config.generation());
//! session.send("Describe this scan", Vec::new()).await?;
//! for message in session.messages().await {
//!     println!("{:?}: {}", message.role(), message.text());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod decoder;
mod file;
mod http;
mod session;
mod store;
mod transcript;
mod upload_queue;

pub use config::{ClientConfig, ClientConfigBuilder, ClientConfigBuilderError};
pub use decoder::{DecoderState, RecordDecoder};
pub use file::PickedFile;
pub use http::{FileUploader, GenerationReply, RelayClient, ReplyStream};
pub use session::{ChatSession, SendOutcome, TranscriptEvent};
pub use store::{ConversationStore, InMemoryStore, JsonFileStore};
pub use transcript::Transcript;
pub use upload_queue::{
    AddOutcome, FileId, QueueNotice, ResolvedFile, UploadEntry, UploadEvent, UploadQueue,
    UploadState,
};
