//! Shared client types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fileferry_protocol::Message;
use fileferry_protocol::constants::{DEFAULT_PORT, WS_REQUEST_TIMEOUT};
use fileferry_transfer::TransferConfig;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL, e.g. `ws://127.0.0.1:50051`.
    pub address: String,
    /// Where downloads are written.
    pub download_dir: PathBuf,
    /// Bounds unary calls, the download header wait and the upload status
    /// wait. Chunk streaming itself is never timed out.
    pub request_timeout: Duration,
    /// `chunk_size` must not exceed the server's: the server sizes its
    /// frame limit from its own chunk size and drops larger frames.
    pub transfer: TransferConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: format!("ws://127.0.0.1:{DEFAULT_PORT}"),
            download_dir: PathBuf::from("./"),
            request_timeout: WS_REQUEST_TIMEOUT,
            transfer: TransferConfig::default(),
        }
    }
}

/// Something that arrived for an open stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// A text message carrying the stream id (header, status, end, error).
    Message(Message),
    /// One binary chunk.
    Chunk(Vec<u8>),
}

/// A frame queued for the write pump.
pub(crate) struct Outbound {
    pub(crate) frame: tungstenite::Message,
    /// Fired once the frame has been flushed to the socket.
    pub(crate) flushed: Option<oneshot::Sender<()>>,
}

impl Outbound {
    pub(crate) fn frame(frame: tungstenite::Message) -> Self {
        Self {
            frame,
            flushed: None,
        }
    }

    /// Wraps `frame` and returns the receiver that resolves once it is
    /// on the wire. A dropped receiver end means the pump gave up.
    pub(crate) fn tracked(frame: tungstenite::Message) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                frame,
                flushed: Some(tx),
            },
            rx,
        )
    }
}

/// Outbound queue depth. Chunk frames wait for their flush, so this
/// holds control messages plus at most one chunk per open stream.
pub(crate) const WRITE_QUEUE_DEPTH: usize = 32;

/// Per-stream event queue depth.
pub(crate) const STREAM_QUEUE_DEPTH: usize = 8;

pub(crate) type WriteTx = mpsc::Sender<Outbound>;
pub(crate) type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>;
pub(crate) type StreamMap = Arc<Mutex<HashMap<String, mpsc::Sender<StreamEvent>>>>;
