use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default upper bound for a single file transfer: 8 GiB.
pub const DEFAULT_MAX_TRANSFER_SIZE: u64 = 8 * 1024 * 1024 * 1024;

/// Room reserved on top of the chunk size for the binary frame header
/// and for JSON envelopes (listings can get large).
pub const FRAME_OVERHEAD: usize = 64 * 1024;

/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 50051;

/// Time to wait for any incoming traffic before a peer is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send keepalive pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(10);

/// Default timeout for unary calls and stream handshakes.
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Layout of [`TransferMetadata::timestamp`](crate::messages::TransferMetadata),
/// e.g. `Jan  2 15:04:05.000000000`.
pub const TIMESTAMP_FORMAT: &str = "%b %e %H:%M:%S%.9f";

/// Maximum WebSocket message size for a given chunk size.
pub fn max_message_size(chunk_size: usize) -> usize {
    chunk_size.saturating_add(FRAME_OVERHEAD)
}

/// WebSocket message type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Unary calls
    #[serde(rename = "hello")]
    Hello,
    #[serde(rename = "hello_reply")]
    HelloReply,
    #[serde(rename = "list")]
    List,
    #[serde(rename = "list_response")]
    ListResponse,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,

    // Upload stream (client -> server)
    #[serde(rename = "upload_open")]
    UploadOpen,
    #[serde(rename = "upload_close")]
    UploadClose,
    #[serde(rename = "upload_abort")]
    UploadAbort,
    #[serde(rename = "upload_status")]
    UploadStatus,

    // Download stream (server -> client)
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "download_header")]
    DownloadHeader,
    #[serde(rename = "download_end")]
    DownloadEnd,

    #[serde(rename = "error")]
    Error,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

/// Common error codes carried in [`WsError`](crate::envelope::WsError).
pub const WS_ERR_CODE_BAD_REQUEST: i32 = 400;
pub const WS_ERR_CODE_NOT_FOUND: i32 = 404;
pub const WS_ERR_CODE_PROTOCOL_VIOLATION: i32 = 409;
pub const WS_ERR_CODE_TOO_LARGE: i32 = 413;
pub const WS_ERR_CODE_DATA_LOSS: i32 = 422;
pub const WS_ERR_CODE_INTERNAL: i32 = 500;
pub const WS_ERR_CODE_NOT_IMPLEMENTED: i32 = 501;
