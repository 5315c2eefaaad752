//! Chunked streaming transfer pipelines.
//!
//! A file moves as an ordered sequence of bounded-size chunks preceded by a
//! single [`TransferMetadata`](fileferry_protocol::TransferMetadata) record.
//! The pipelines here are transport-agnostic: they talk to the wire through
//! the [`ChunkSink`] and [`ChunkSource`] traits.

mod chunked;
mod download;
mod state;
mod stream;
mod upload;
mod validation;

pub use chunked::{ChunkReader, ChunkWriter};
pub use download::{DownloadReport, drive_download, receive_download};
pub use state::{TransferState, TransferTracker};
pub use stream::{
    ChannelSink, ChannelSource, ChunkFuture, ChunkSink, ChunkSource, DownloadSink, StreamItem,
    chunk_channel,
};
pub use upload::{UploadReport, UploadSource, receive_upload, send_chunks};
pub use validation::{resolve_in_root, upload_file_name, validate_file_name};

use fileferry_protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_TRANSFER_SIZE};

/// Tunables passed into every pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Upper bound for a single chunk in bytes.
    pub chunk_size: usize,
    /// Upper bound for a whole file in bytes.
    pub max_transfer_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_transfer_size: DEFAULT_MAX_TRANSFER_SIZE,
        }
    }
}

/// Errors produced by the transfer pipelines.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("transfer metadata missing: {0}")]
    MetadataMissing(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("size mismatch: declared {declared} bytes, received {received}")]
    SizeMismatch { declared: u64, received: u64 },

    #[error("transfer too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("stream closed")]
    Closed,
}
