//! Core data types for relaychat.
//!
//! This crate provides the wire types exchanged between client, relay and
//! backend, and the transcript types the client mutates while a response
//! streams in.

mod conversation;
mod message;
mod observability;
mod part;
mod protocol;
mod request;
mod role;
mod stream;
mod upload;

pub use conversation::{Conversation, ConversationSummary};
pub use message::{Message, MessageId, MessageStatus};
pub use observability::{LogFormat, MetricsGuard, init_cli_tracing, init_metrics, init_tracing};
pub use part::Part;
pub use protocol::{ResponseMode, TIMEOUT_HEADER};
pub use request::{
    BufferedResponse, GenerationOptions, GenerationRequest, GenerationRequestBuilder,
    GenerationRequestBuilderError,
};
pub use role::Role;
pub use stream::{DONE_SENTINEL, EVENT_PREFIX, StreamRecord, TokenPayload};
pub use upload::UploadReceipt;
