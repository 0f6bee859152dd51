//! Upload wire types.

use serde::{Deserialize, Serialize};

/// Body returned by `POST /upload`.
///
/// `path` is the stored reference to cite in later generation requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_getters::Getters)]
pub struct UploadReceipt {
    /// Stored reference (relay URL path or absolute filesystem path)
    path: String,
    /// Original file name
    #[serde(default)]
    name: Option<String>,
    /// Stored size in bytes
    #[serde(default)]
    size: Option<u64>,
}

impl UploadReceipt {
    /// Creates a receipt.
    pub fn new(path: impl Into<String>, name: Option<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            name,
            size,
        }
    }
}
