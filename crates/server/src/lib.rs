//! WebSocket file server.
//!
//! Accepts any number of client connections, dispatches JSON and binary
//! frames to a [`Handler`], and manages each connection's lifecycle
//! (ping/pong, idle timeout, graceful shutdown). [`FileService`] is the
//! handler that serves a root directory.

mod connection;
mod handler;
mod server;
mod service;

pub use connection::{Connection, SendError, Sender};
pub use handler::{Handler, HandlerFuture};
pub use server::{FileServer, ServerConfig};
pub use service::{FileService, error_code};

/// Send buffer capacity per connection.
///
/// Senders wait for room instead of dropping. Chunk frames also wait for
/// their flush, so the buffer holds control replies plus at most one chunk
/// per active download.
pub const SEND_BUFFER_SIZE: usize = 64;

/// Chunks queued between the read pump and an upload receiver.
pub const UPLOAD_QUEUE_DEPTH: usize = 4;

/// Errors produced by the file server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
