//! Upload command handler.

use super::chat::io_error;
use relaychat_client::{ClientConfig, PickedFile, RelayClient};
use relaychat_core::UploadReceipt;
use relaychat_error::{ClientError, ClientErrorKind, RelayChatResult};
use std::io::Write;
use std::path::Path;

/// Uploads one file and prints the reference to cite in a chat.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub async fn handle_upload_command<W: Write>(
    config: &ClientConfig,
    path: &Path,
    out: &mut W,
) -> RelayChatResult<UploadReceipt> {
    let file = PickedFile::from_path(path).await?;
    if file.size() > *config.max_file_bytes() {
        return Err(ClientError::new(ClientErrorKind::FileTooLarge {
            name: file.name().to_string(),
            size: file.size(),
            limit: *config.max_file_bytes(),
        })
        .into());
    }

    let receipt = RelayClient::new(config)?.upload_file(&file).await?;
    writeln!(out, "{}", receipt.path()).map_err(io_error)?;
    Ok(receipt)
}
