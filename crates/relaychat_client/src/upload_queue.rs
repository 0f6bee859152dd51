//! Files attached to the message being composed.
//!
//! Each accepted file gets a preview immediately and uploads in its own task.
//! Tasks report back over a channel with the entry's id; the queue applies
//! those reports by id, so an entry removed mid-upload simply ignores its
//! late result.

use crate::{FileUploader, PickedFile};
use relaychat_core::UploadReceipt;
use relaychat_error::{ClientError, ClientErrorKind, ClientResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Identifier of a queued file, unique for the queue's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("file-{}", _0)]
pub struct FileId(u64);

/// Lifecycle of a queued file.
///
/// A [`PickedFile`] enters the queue as `Previewing`, with its preview
/// already built, and moves to `Uploading` once its upload task reports in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    /// Local preview available, upload not yet started.
    Previewing,
    /// Upload in progress.
    Uploading,
    /// Stored by the relay.
    Resolved {
        /// Stored reference
        reference: String,
    },
}

impl UploadState {
    /// Whether the entry still waits on the network.
    pub fn is_pending(&self) -> bool {
        !matches!(self, UploadState::Resolved { .. })
    }
}

/// One queued file.
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct UploadEntry {
    /// Queue identifier
    id: FileId,
    /// File name
    name: String,
    /// Size in bytes
    size: u64,
    /// Local preview, kept after the upload resolves
    preview: String,
    /// Lifecycle state
    state: UploadState,
}

impl UploadEntry {
    /// Stored reference once resolved.
    pub fn server_reference(&self) -> Option<&str> {
        match &self.state {
            UploadState::Resolved { reference } => Some(reference),
            _ => None,
        }
    }
}

/// A resolved file handed to a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// File name
    pub name: String,
    /// Stored reference to cite in the generation request
    pub reference: String,
    /// Local preview
    pub preview: String,
}

impl ResolvedFile {
    /// Wraps an upload receipt.
    pub fn from_receipt(receipt: &UploadReceipt, preview: impl Into<String>) -> Self {
        Self {
            name: receipt.name().clone().unwrap_or_default(),
            reference: receipt.path().clone(),
            preview: preview.into(),
        }
    }
}

/// Progress report of an upload task.
#[derive(Debug)]
pub enum UploadEvent {
    /// The request to the relay is under way.
    Started {
        /// Entry
        id: FileId,
    },
    /// The relay stored the file.
    Resolved {
        /// Entry
        id: FileId,
        /// Relay receipt
        receipt: UploadReceipt,
    },
    /// The upload failed.
    Failed {
        /// Entry
        id: FileId,
        /// Cause
        error: ClientError,
    },
}

impl UploadEvent {
    /// Entry the event belongs to.
    pub fn id(&self) -> FileId {
        match self {
            UploadEvent::Started { id }
            | UploadEvent::Resolved { id, .. }
            | UploadEvent::Failed { id, .. } => *id,
        }
    }
}

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueNotice {
    /// Files beyond the cap were not queued.
    UploadCountExceeded {
        /// Cap
        limit: usize,
        /// Files dropped
        rejected: usize,
    },
    /// A file exceeded the size cap and was not queued.
    FileTooLarge {
        /// File name
        name: String,
        /// File size
        size: u64,
        /// Cap
        limit: u64,
    },
    /// An upload failed and its entry was removed.
    UploadFailed {
        /// File name
        name: String,
        /// Failure description
        message: String,
    },
}

impl QueueNotice {
    /// The notice as a client error.
    pub fn to_error(&self) -> ClientError {
        let kind = match self {
            QueueNotice::UploadCountExceeded { limit, rejected } => {
                ClientErrorKind::UploadCountExceeded {
                    limit: *limit,
                    rejected: *rejected,
                }
            }
            QueueNotice::FileTooLarge { name, size, limit } => ClientErrorKind::FileTooLarge {
                name: name.clone(),
                size: *size,
                limit: *limit,
            },
            QueueNotice::UploadFailed { name, message } => ClientErrorKind::Upload {
                name: name.clone(),
                message: message.clone(),
            },
        };
        ClientError::new(kind)
    }
}

/// Result of offering files to the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    /// Entries created, in offer order
    pub accepted: Vec<FileId>,
    /// Rejections
    pub notices: Vec<QueueNotice>,
}

/// Attachment queue of the message being composed.
///
/// Must be used from within a Tokio runtime; uploads run as spawned tasks.
pub struct UploadQueue {
    uploader: Arc<dyn FileUploader>,
    max_files: usize,
    max_file_bytes: u64,
    entries: HashMap<FileId, UploadEntry>,
    order: Vec<FileId>,
    tasks: HashMap<FileId, JoinHandle<()>>,
    next_id: u64,
    tx: mpsc::UnboundedSender<UploadEvent>,
    rx: mpsc::UnboundedReceiver<UploadEvent>,
}

impl std::fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadQueue")
            .field("max_files", &self.max_files)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("entries", &self.entries.len())
            .field("uploading", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl UploadQueue {
    /// Creates an empty queue.
    pub fn new(uploader: Arc<dyn FileUploader>, max_files: usize, max_file_bytes: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            uploader,
            max_files,
            max_file_bytes,
            entries: HashMap::new(),
            order: Vec::new(),
            tasks: HashMap::new(),
            next_id: 0,
            tx,
            rx,
        }
    }

    /// Entries in the order they were added.
    pub fn entries(&self) -> Vec<&UploadEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .collect()
    }

    /// Looks up an entry.
    pub fn get(&self, id: FileId) -> Option<&UploadEntry> {
        self.entries.get(&id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries still uploading.
    pub fn pending(&self) -> usize {
        self.entries.values().filter(|e| e.state.is_pending()).count()
    }

    /// Offer files. Each accepted file is previewed and starts uploading.
    ///
    /// Files over the size cap get a `FileTooLarge` notice each; files over
    /// the count cap are dropped with a single `UploadCountExceeded` notice.
    #[instrument(skip(self, files), fields(offered = files.len(), queued = self.entries.len()))]
    pub fn add_files(&mut self, files: Vec<PickedFile>) -> AddOutcome {
        let mut outcome = AddOutcome::default();
        let mut rejected = 0;

        for file in files {
            if file.size() > self.max_file_bytes {
                warn!(name = %file.name(), size = file.size(), "File too large");
                outcome.notices.push(QueueNotice::FileTooLarge {
                    name: file.name().to_string(),
                    size: file.size(),
                    limit: self.max_file_bytes,
                });
                continue;
            }
            if self.entries.len() >= self.max_files {
                rejected += 1;
                continue;
            }
            outcome.accepted.push(self.enqueue(file));
        }

        if rejected > 0 {
            warn!(limit = self.max_files, rejected, "Upload count exceeded");
            outcome.notices.push(QueueNotice::UploadCountExceeded {
                limit: self.max_files,
                rejected,
            });
        }
        outcome
    }

    fn enqueue(&mut self, file: PickedFile) -> FileId {
        let id = FileId(self.next_id);
        self.next_id += 1;

        let entry = UploadEntry {
            id,
            name: file.name().to_string(),
            size: file.size(),
            preview: file.preview(),
            state: UploadState::Previewing,
        };
        self.order.push(id);

        let uploader = self.uploader.clone();
        let tx = self.tx.clone();
        // Send failures mean the queue is gone already.
        let task = tokio::spawn(async move {
            let _ = tx.send(UploadEvent::Started { id });
            let event = match uploader.upload(&file).await {
                Ok(receipt) => UploadEvent::Resolved { id, receipt },
                Err(error) => UploadEvent::Failed { id, error },
            };
            let _ = tx.send(event);
        });
        debug!(%id, name = %entry.name, "Upload queued");
        self.entries.insert(id, entry);
        self.tasks.insert(id, task);
        id
    }

    /// Apply an upload report.
    ///
    /// Reports for removed entries are ignored. A failure removes the entry
    /// and returns the notice to surface.
    pub fn apply(&mut self, event: UploadEvent) -> Option<QueueNotice> {
        let id = event.id();
        if !matches!(event, UploadEvent::Started { .. }) {
            self.tasks.remove(&id);
        }
        let Some(entry) = self.entries.get_mut(&id) else {
            debug!(%id, "Ignoring report for removed entry");
            return None;
        };

        match event {
            UploadEvent::Started { .. } => {
                if entry.state == UploadState::Previewing {
                    entry.state = UploadState::Uploading;
                    debug!(%id, "Upload started");
                }
                None
            }
            UploadEvent::Resolved { receipt, .. } => {
                info!(%id, reference = %receipt.path(), "Upload resolved");
                entry.state = UploadState::Resolved {
                    reference: receipt.path().clone(),
                };
                None
            }
            UploadEvent::Failed { error, .. } => {
                let name = entry.name.clone();
                self.remove(id);
                warn!(%id, name = %name, error = %error, "Upload failed");
                Some(QueueNotice::UploadFailed {
                    name,
                    message: error.kind.to_string(),
                })
            }
        }
    }

    /// Wait for the next upload report and apply it.
    ///
    /// Returns `None` when nothing is uploading.
    pub async fn next_event(&mut self) -> Option<Option<QueueNotice>> {
        if self.tasks.is_empty() {
            return None;
        }
        let event = self.rx.recv().await?;
        Some(self.apply(event))
    }

    /// Wait until every entry is resolved or removed.
    pub async fn wait_settled(&mut self) -> Vec<QueueNotice> {
        let mut notices = Vec::new();
        while self.pending() > 0 {
            match self.next_event().await {
                Some(Some(notice)) => notices.push(notice),
                Some(None) => {}
                None => break,
            }
        }
        notices
    }

    /// Remove an entry at any stage, aborting its upload.
    ///
    /// Returns `false` if the entry was already gone.
    pub fn remove(&mut self, id: FileId) -> bool {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
        self.order.retain(|queued| *queued != id);
        let removed = self.entries.remove(&id).is_some();
        if removed {
            debug!(%id, "Entry removed");
        }
        removed
    }

    /// Hand all entries to a send and empty the queue.
    ///
    /// # Errors
    ///
    /// `UploadsPending` while any entry is still uploading; the queue is left
    /// untouched.
    pub fn take_for_send(&mut self) -> ClientResult<Vec<ResolvedFile>> {
        let pending = self.pending();
        if pending > 0 {
            return Err(ClientError::new(ClientErrorKind::UploadsPending(pending)));
        }
        let files = self
            .order
            .drain(..)
            .filter_map(|id| self.entries.remove(&id))
            .filter_map(|entry| {
                let reference = entry.server_reference()?.to_string();
                Some(ResolvedFile {
                    name: entry.name,
                    reference,
                    preview: entry.preview,
                })
            })
            .collect();
        Ok(files)
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}
