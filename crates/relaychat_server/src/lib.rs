//! HTTP relay between the relaychat client and a model-serving backend.
//!
//! The relay stores uploaded files and hands back references, forwards
//! generation requests to the backend unmodified, and returns the backend's
//! answer either as one JSON document or as a live byte stream, depending on
//! the content type the backend responds with.
//!
//! # Example
//!
//! ```no_run
//! use relaychat_server::{RelayConfig, serve};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::load(None)?;
//! serve(config).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod api;
mod backend;
mod config;
mod handlers;
mod metrics;
mod upload;

pub use api::{ApiError, AppState, create_router, serve};
pub use backend::{BackendByteStream, BackendClient, BackendReply, Passthrough};
pub use config::{
    DEFAULT_CONFIG_FILE, ReferenceStyle, RelayConfig, RelayConfigBuilder, RelayConfigBuilderError,
};
pub use handlers::deadline_for;
pub use metrics::RelayMetrics;
pub use upload::{PendingUpload, StoredUpload, UploadStore, sanitize_file_name, stored_name_for};
