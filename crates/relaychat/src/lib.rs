//! Multimodal chat over a streaming relay.
//!
//! This crate re-exports the workspace crates under one name and hosts the
//! `relaychat` command-line client.
//!
//! - [`relaychat_core`]: wire and transcript types
//! - [`relaychat_client`]: relay client, stream decoder, chat session,
//!   upload queue and conversation store
//! - [`relaychat_server`] (feature `server`): the relay itself
//! - [`relaychat_error`]: error types

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;

pub use relaychat_client::*;
pub use relaychat_core::*;
pub use relaychat_error::*;

/// The relay server.
#[cfg(feature = "server")]
pub mod server {
    pub use relaychat_server::*;
}
