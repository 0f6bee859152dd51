//! Health command handler.

use super::chat::io_error;
use relaychat_client::{ClientConfig, RelayClient};
use relaychat_error::RelayChatResult;
use std::io::Write;

/// Prints the backend health reported through the relay.
#[tracing::instrument(skip_all, fields(relay = %config.relay_url()))]
pub async fn handle_health_command<W: Write>(
    config: &ClientConfig,
    out: &mut W,
) -> RelayChatResult<()> {
    let health = RelayClient::new(config)?.health().await?;
    let pretty = serde_json::to_string_pretty(&health).unwrap_or_else(|_| health.to_string());
    writeln!(out, "{}", pretty).map_err(io_error)?;
    Ok(())
}
