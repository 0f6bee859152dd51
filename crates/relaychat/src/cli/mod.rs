//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the
//! relaychat binary. Handlers write program output to the writer they are
//! given so they can be driven from tests.

mod chat;
mod commands;
mod conversations;
mod health;
mod upload;

pub use chat::{ChatArgs, ChatReport, handle_chat_command};
pub use commands::{Cli, Commands};
pub use conversations::handle_conversations_command;
pub use health::handle_health_command;
pub use upload::handle_upload_command;
