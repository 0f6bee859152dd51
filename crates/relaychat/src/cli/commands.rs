//! CLI argument definitions.

use clap::{Parser, Subcommand};
use relaychat_core::LogFormat;
use std::path::PathBuf;

/// Relaychat command-line client.
#[derive(Parser, Debug)]
#[command(name = "relaychat")]
#[command(about = "Chat with a multimodal model through a relaychat relay", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Client configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "RELAYCHAT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Relay base URL, overriding the configuration
    #[arg(short, long, env = "RELAYCHAT_RELAY_URL", global = true)]
    pub relay_url: Option<String>,

    /// Directory holding saved conversations
    #[arg(long, env = "RELAYCHAT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log line format (logs go to stderr)
    #[arg(long, global = true, default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the relay and its backend are up
    Health,

    /// Upload a file and print its stored reference
    Upload {
        /// File to upload
        file: PathBuf,
    },

    /// Send a message and print the reply as it arrives
    Chat {
        /// Continue a saved conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Attach a file (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Do not save the conversation
        #[arg(long)]
        no_save: bool,

        /// Message text
        prompt: Vec<String>,
    },

    /// List saved conversations
    Conversations {
        /// Print the index as JSON
        #[arg(long)]
        json: bool,
    },
}
