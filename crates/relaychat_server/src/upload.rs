//! On-disk storage of uploaded files.
//!
//! The upload directory is an append-only namespace shared by concurrent
//! requests. Every write targets a fresh name built from a nanosecond
//! timestamp, a random component and the sanitized original name, so no
//! locking is needed.

use crate::ReferenceStyle;
use relaychat_core::UploadReceipt;
use relaychat_error::{RelayError, RelayErrorKind, RelayResult};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

const MAX_NAME_LEN: usize = 128;

/// Upload directory plus the reference convention handed back to clients.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    style: ReferenceStyle,
    public_prefix: String,
    max_bytes: Option<u64>,
}

/// A stored upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Name of the file inside the upload directory
    pub stored_name: String,
    /// Name supplied by the client
    pub original_name: String,
    /// Reference returned to the client
    pub reference: String,
    /// Bytes written
    pub size: u64,
}

impl StoredUpload {
    /// Wire form of the stored upload.
    pub fn receipt(&self) -> UploadReceipt {
        UploadReceipt::new(
            self.reference.clone(),
            Some(self.original_name.clone()),
            Some(self.size),
        )
    }
}

/// An upload being written.
///
/// Either [`PendingUpload::finish`] or [`PendingUpload::discard`] must be
/// called; a dropped pending upload leaves a partial file behind.
#[derive(Debug)]
pub struct PendingUpload {
    file: File,
    path: PathBuf,
    stored_name: String,
    original_name: String,
    size: u64,
    max_bytes: Option<u64>,
    style: ReferenceStyle,
    public_prefix: String,
}

impl UploadStore {
    /// Creates a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>, style: ReferenceStyle, public_prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            style,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
            max_bytes: None,
        }
    }

    /// Caps the file bytes of each upload.
    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Upload directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reference convention of this store.
    pub fn style(&self) -> ReferenceStyle {
        self.style
    }

    /// Start writing a new upload named after `original_name`.
    #[instrument(skip(self), fields(dir = ?self.dir))]
    pub async fn begin(&self, original_name: &str) -> RelayResult<PendingUpload> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            RelayError::new(RelayErrorKind::Io(format!(
                "Failed to create upload directory {}: {}",
                self.dir.display(),
                e
            )))
        })?;

        let stored_name = stored_name_for(original_name);
        let path = self.dir.join(&stored_name);
        let file = File::create_new(&path).await.map_err(|e| {
            RelayError::new(RelayErrorKind::Io(format!(
                "Failed to create {}: {}",
                path.display(),
                e
            )))
        })?;
        debug!(stored_name = %stored_name, "Upload started");

        Ok(PendingUpload {
            file,
            path,
            stored_name,
            original_name: original_name.to_string(),
            size: 0,
            max_bytes: self.max_bytes,
            style: self.style,
            public_prefix: self.public_prefix.clone(),
        })
    }
}

impl PendingUpload {
    /// Append a chunk to the file.
    ///
    /// Fails with [`RelayErrorKind::PayloadTooLarge`] once the file would
    /// exceed the store's cap; the caller should then [`discard`](Self::discard).
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> RelayResult<()> {
        let size = self.size + chunk.len() as u64;
        if let Some(limit) = self.max_bytes {
            if size > limit {
                return Err(RelayError::new(RelayErrorKind::PayloadTooLarge(format!(
                    "File exceeds the {} byte upload limit",
                    limit
                ))));
            }
        }
        self.file.write_all(chunk).await.map_err(|e| {
            RelayError::new(RelayErrorKind::Io(format!(
                "Failed to write {}: {}",
                self.path.display(),
                e
            )))
        })?;
        self.size = size;
        Ok(())
    }

    /// Flush the file and compute its reference.
    #[instrument(skip(self), fields(stored_name = %self.stored_name, size = self.size))]
    pub async fn finish(mut self) -> RelayResult<StoredUpload> {
        self.file.flush().await.map_err(|e| {
            RelayError::new(RelayErrorKind::Io(format!(
                "Failed to flush {}: {}",
                self.path.display(),
                e
            )))
        })?;

        let reference = match self.style {
            ReferenceStyle::Url => format!("{}/{}", self.public_prefix, self.stored_name),
            ReferenceStyle::AbsolutePath => fs::canonicalize(&self.path)
                .await
                .map_err(|e| {
                    RelayError::new(RelayErrorKind::Io(format!(
                        "Failed to resolve {}: {}",
                        self.path.display(),
                        e
                    )))
                })?
                .to_string_lossy()
                .into_owned(),
        };
        debug!(reference = %reference, "Upload stored");

        Ok(StoredUpload {
            stored_name: self.stored_name,
            original_name: self.original_name,
            reference,
            size: self.size,
        })
    }

    /// Remove the partially written file.
    pub async fn discard(self) {
        drop(self.file);
        if let Err(e) = fs::remove_file(&self.path).await {
            warn!(path = ?self.path, error = %e, "Failed to remove partial upload");
        }
    }
}

/// Collision-resistant stored name for an upload.
///
/// # Examples
///
/// ```
/// use relaychat_server::stored_name_for;
///
/// let name = stored_name_for("../../etc/chest x-ray.png");
/// assert!(name.ends_with("-chest_x-ray.png"));
/// assert!(!name.contains('/'));
/// ```
pub fn stored_name_for(original_name: &str) -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| chrono::Utc::now().timestamp_micros().saturating_mul(1000));
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", nanos, &random[..8], sanitize_file_name(original_name))
}

/// Reduce a client-supplied file name to a safe single path component.
pub fn sanitize_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned: String = cleaned.chars().take(MAX_NAME_LEN).collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
