use serde::{Deserialize, Serialize};

use crate::constants::TIMESTAMP_FORMAT;

// ---------------------------------------------------------------------------
// Unary payloads
// ---------------------------------------------------------------------------

/// Greeting request used for connectivity smoke tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloRequest {
    pub name: String,
}

/// Greeting reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloReply {
    pub message: String,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Snapshot of the server root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    pub files: Vec<FileInfo>,
}

// ---------------------------------------------------------------------------
// Stream payloads
// ---------------------------------------------------------------------------

/// Out-of-band description of a chunk stream.
///
/// Sent once per transfer: as the `upload_open` payload for uploads and
/// as the `download_header` payload for downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// Base name of the file, no path separators.
    pub filename: String,
    /// Declared size in bytes.
    pub size: u64,
    pub timestamp: String,
}

impl TransferMetadata {
    /// Builds metadata stamped with the current local time.
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
            timestamp: now_timestamp(),
        }
    }
}

/// Formats the current local time with [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Starts a download of a file in the server root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub name: String,
}

/// Outcome of an upload as judged by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    Ok,
    Failed,
}

/// Sent exactly once at the end of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatus {
    pub code: StatusCode,
}

impl TransferStatus {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
        }
    }

    pub fn failed() -> Self {
        Self {
            code: StatusCode::Failed,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}
