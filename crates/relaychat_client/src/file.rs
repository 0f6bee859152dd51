//! Files picked for upload.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use relaychat_error::{ClientError, ClientErrorKind, ClientResult};
use std::path::{Path, PathBuf};

/// A file chosen by the user, held in memory until it is uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedFile {
    name: String,
    bytes: Bytes,
    source: Option<PathBuf>,
}

impl PickedFile {
    /// Wraps in-memory content, e.g. a pasted image.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            source: None,
        }
    }

    /// Reads a file from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ClientError::new(ClientErrorKind::Io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        })?;
        let source = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self {
            name,
            bytes: Bytes::from(bytes),
            source: Some(source),
        })
    }

    /// File name shown to the user and sent to the relay.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File content.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Media type guessed from the file extension.
    pub fn mime_type(&self) -> &'static str {
        let extension = Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("bmp") => "image/bmp",
            Some("dcm") => "application/dicom",
            _ => "application/octet-stream",
        }
    }

    /// Local preview available before the upload finishes.
    ///
    /// Files read from disk preview as a `file://` URL; in-memory content as a
    /// `data:` URI.
    pub fn preview(&self) -> String {
        match &self.source {
            Some(path) => format!("file://{}", path.display()),
            None => format!(
                "data:{};base64,{}",
                self.mime_type(),
                STANDARD.encode(&self.bytes)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_preview_is_data_uri() {
        let file = PickedFile::from_bytes("paste.PNG", vec![1u8, 2, 3]);
        assert_eq!(file.preview(), "data:image/png;base64,AQID");
        assert_eq!(file.size(), 3);
    }

    #[tokio::test]
    async fn test_path_preview_is_file_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.jpg");
        std::fs::write(&path, b"jpeg").expect("write");

        let file = PickedFile::from_path(&path).await.expect("read");
        assert_eq!(file.name(), "scan.jpg");
        assert!(file.preview().starts_with("file://"));
        assert!(file.preview().ends_with("scan.jpg"));
        assert_eq!(file.mime_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_missing_path_is_io_error() {
        let err = PickedFile::from_path("/definitely/not/here.png")
            .await
            .expect_err("should fail");
        assert!(matches!(err.kind, ClientErrorKind::Io(_)));
    }
}
