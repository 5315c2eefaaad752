//! WebSocket client for client-to-server communication.
//!
//! Implements the request-response pattern with UUID correlation,
//! ping/pong keepalive, and per-stream routing of chunk frames.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;

use fileferry_protocol::constants::{MessageType, max_message_size};
use fileferry_protocol::messages::DownloadRequest;
use fileferry_protocol::{Message, TransferMetadata};
use fileferry_transfer::TransferError;

use crate::streams::{DownloadStream, UploadStream};
use crate::types::{
    ClientConfig, Outbound, PendingMap, STREAM_QUEUE_DEPTH, StreamMap, WRITE_QUEUE_DEPTH, WriteTx,
};

/// Errors from the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },

    #[error("unexpected message: {0:?}")]
    UnexpectedMessage(MessageType),
}

impl ClientError {
    /// Converts an error reply into [`ClientError::Server`].
    pub(crate) fn from_reply(msg: &Message) -> Option<Self> {
        msg.error.as_ref().map(|err| ClientError::Server {
            code: err.code,
            message: err.message.clone(),
        })
    }
}

/// WebSocket client connected to one server.
pub struct WsClient {
    write_tx: WriteTx,
    pending: PendingMap,
    streams: StreamMap,
    request_timeout: Duration,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    cancel: tokio_util::sync::CancellationToken,
}

impl WsClient {
    /// Connects to the server at `config.address`.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let limit = max_message_size(config.transfer.chunk_size);
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(limit);
        ws_config.max_frame_size = Some(limit);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(config.address.as_str(), Some(ws_config), false)
                .await?;
        let (write, read) = ws_stream.split();
        tracing::info!(address = %config.address, "connected");

        let (write_tx, write_rx) = mpsc::channel::<Outbound>(WRITE_QUEUE_DEPTH);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let streams: StreamMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = tokio_util::sync::CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let pending = pending.clone();
            let streams = streams.clone();
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read, pending, streams, write_tx, cancel,
            ))
        };

        Ok(Self {
            write_tx,
            pending,
            streams,
            request_timeout: config.request_timeout,
            _read_handle: read_handle,
            _write_handle: write_handle,
            cancel,
        })
    }

    /// Sends a request and waits for the response.
    pub async fn send_request<T: serde::Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Message, ClientError> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(&id, msg_type, payload)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if let Err(e) = self.send_text(&msg).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let result = tokio::time::timeout(self.request_timeout, rx).await;

        // Clean up pending entry on any exit path.
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(resp)) => match ClientError::from_reply(&resp) {
                Some(err) => Err(err),
                None => Ok(resp),
            },
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Opens an upload stream, sending `metadata` with the initiation.
    pub async fn open_upload(&self, metadata: &TransferMetadata) -> Result<UploadStream, ClientError> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(&id, MessageType::UploadOpen, Some(metadata))?;
        let events = self.register_stream(&id).await;

        if let Err(e) = self.send_text(&msg).await {
            self.streams.lock().await.remove(&id);
            return Err(e);
        }
        tracing::debug!(stream = %id, file = %metadata.filename, size = metadata.size, "upload opened");

        Ok(UploadStream::new(
            id,
            self.write_tx.clone(),
            events,
            self.request_timeout,
        ))
    }

    /// Requests `name` and returns the stream; read its header next.
    pub async fn open_download(&self, name: &str) -> Result<DownloadStream, ClientError> {
        let id = uuid::Uuid::new_v4().to_string();
        let request = DownloadRequest {
            name: name.to_string(),
        };
        let msg = Message::new(&id, MessageType::Download, Some(&request))?;
        let events = self.register_stream(&id).await;

        if let Err(e) = self.send_text(&msg).await {
            self.streams.lock().await.remove(&id);
            return Err(e);
        }
        tracing::debug!(stream = %id, file = %name, "download requested");

        Ok(DownloadStream::new(id, events, self.request_timeout))
    }

    /// Returns `true` while the connection's pumps are running.
    pub fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Gracefully closes the connection.
    ///
    /// The write pump sends the close frame on its way out.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    async fn register_stream(&self, id: &str) -> mpsc::Receiver<crate::types::StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_QUEUE_DEPTH);
        self.streams.lock().await.insert(id.to_string(), tx);
        rx
    }

    async fn send_text(&self, msg: &Message) -> Result<(), ClientError> {
        let json = msg.to_text()?;
        self.write_tx
            .send(Outbound::frame(tungstenite::Message::Text(json.into())))
            .await
            .map_err(|_| ClientError::Closed)
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
    }
}
