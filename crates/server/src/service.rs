//! [`Handler`] that serves one root directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fileferry_file_ops::list_directory;
use fileferry_protocol::constants::{
    MessageType, WS_ERR_CODE_BAD_REQUEST, WS_ERR_CODE_DATA_LOSS, WS_ERR_CODE_INTERNAL,
    WS_ERR_CODE_NOT_FOUND, WS_ERR_CODE_PROTOCOL_VIOLATION, WS_ERR_CODE_TOO_LARGE,
};
use fileferry_protocol::messages::{DownloadRequest, HelloReply, HelloRequest, ListResponse};
use fileferry_protocol::{Message, TransferMetadata, TransferStatus};
use fileferry_transfer::{
    ChannelSink, ChunkFuture, ChunkSink, DownloadSink, StreamItem, TransferConfig, TransferError,
    chunk_channel, drive_download, receive_upload,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::UPLOAD_QUEUE_DEPTH;
use crate::connection::Sender;
use crate::handler::{Handler, HandlerFuture};

/// Maps a transfer error to a wire error code.
pub fn error_code(err: &TransferError) -> i32 {
    match err {
        TransferError::InvalidPath(_) => WS_ERR_CODE_BAD_REQUEST,
        TransferError::MetadataMissing(_) => WS_ERR_CODE_DATA_LOSS,
        TransferError::ProtocolViolation(_) => WS_ERR_CODE_PROTOCOL_VIOLATION,
        TransferError::TooLarge { .. } => WS_ERR_CODE_TOO_LARGE,
        TransferError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => WS_ERR_CODE_NOT_FOUND,
        _ => WS_ERR_CODE_INTERNAL,
    }
}

/// Upload streams are scoped to the connection that opened them.
type StreamKey = (String, String);

enum UploadSlot {
    /// Receiver running; chunks go into the channel.
    Active(ChannelSink),
    /// Stream failed or was never opened; further chunks are dropped.
    Rejected,
}

type UploadMap = Arc<Mutex<HashMap<StreamKey, UploadSlot>>>;

/// Serves `list`, `upload_*` and `download` against a root directory.
pub struct FileService {
    root: PathBuf,
    transfer: TransferConfig,
    uploads: UploadMap,
}

impl FileService {
    pub fn new(root: impl Into<PathBuf>, transfer: TransferConfig) -> Self {
        Self {
            root: root.into(),
            transfer,
            uploads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of upload streams currently tracked, across all connections.
    pub async fn open_uploads(&self) -> usize {
        self.uploads.lock().await.len()
    }
}

fn key(sender: &Sender, stream_id: &str) -> StreamKey {
    (sender.connection_id().to_string(), stream_id.to_string())
}

impl Handler for FileService {
    fn on_hello(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let name = match msg.parse_payload::<HelloRequest>() {
                Ok(Some(req)) => req.name,
                Ok(None) => String::new(),
                Err(e) => {
                    let _ = sender
                        .send_error(&msg, WS_ERR_CODE_BAD_REQUEST, &e.to_string())
                        .await;
                    return;
                }
            };
            info!(name = %name, "hello");

            let reply = HelloReply {
                message: format!("Hello {name}"),
            };
            if let Ok(resp) = msg.reply(MessageType::HelloReply, Some(&reply)) {
                let _ = sender.send_msg(resp).await;
            }
        })
    }

    fn on_list(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            match list_directory(&self.root).await {
                Ok(files) => {
                    debug!(entries = files.len(), "listing root");
                    let resp = ListResponse { files };
                    match msg.reply(MessageType::ListResponse, Some(&resp)) {
                        Ok(reply) => {
                            let _ = sender.send_msg(reply).await;
                        }
                        Err(e) => {
                            let _ = sender
                                .send_error(&msg, WS_ERR_CODE_INTERNAL, &e.to_string())
                                .await;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "listing failed");
                    let _ = sender
                        .send_error(&msg, WS_ERR_CODE_INTERNAL, &e.to_string())
                        .await;
                }
            }
        })
    }

    fn on_upload_open(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let stream_key = key(&sender, &msg.id);

            let (sink, mut source) = chunk_channel(UPLOAD_QUEUE_DEPTH);
            let metadata = {
                let mut uploads = self.uploads.lock().await;
                // A reused id never touches the stream that owns it.
                if uploads.contains_key(&stream_key) {
                    drop(uploads);
                    let _ = sender
                        .send_error(
                            &msg,
                            WS_ERR_CODE_PROTOCOL_VIOLATION,
                            "stream id already in use",
                        )
                        .await;
                    return;
                }

                match msg.parse_payload::<TransferMetadata>() {
                    Ok(metadata) => {
                        uploads.insert(stream_key.clone(), UploadSlot::Active(sink));
                        metadata
                    }
                    Err(e) => {
                        uploads.insert(stream_key, UploadSlot::Rejected);
                        drop(uploads);
                        let _ = sender
                            .send_error(&msg, WS_ERR_CODE_BAD_REQUEST, &e.to_string())
                            .await;
                        return;
                    }
                }
            };
            debug!(stream = %msg.id, "upload stream opened");

            let root = self.root.clone();
            let config = self.transfer;
            let uploads = Arc::clone(&self.uploads);
            tokio::spawn(async move {
                match receive_upload(&root, metadata, &mut source, &config).await {
                    Ok(report) => {
                        let status = TransferStatus { code: report.status };
                        if let Ok(reply) = msg.reply(MessageType::UploadStatus, Some(&status)) {
                            let _ = sender.send_msg(reply).await;
                        }
                    }
                    Err(e) => {
                        warn!(stream = %msg.id, error = %e, "upload failed");
                        if let Some(slot) = uploads.lock().await.get_mut(&stream_key) {
                            *slot = UploadSlot::Rejected;
                        }
                        let _ = sender.send_error(&msg, error_code(&e), &e.to_string()).await;
                    }
                }
            });
        })
    }

    fn on_binary_chunk(
        &self,
        sender: Sender,
        stream_id: String,
        chunk: Vec<u8>,
    ) -> HandlerFuture<'_> {
        Box::pin(async move {
            let stream_key = key(&sender, &stream_id);
            let sink = {
                let mut uploads = self.uploads.lock().await;
                match uploads.get(&stream_key) {
                    Some(UploadSlot::Active(sink)) => sink.clone(),
                    Some(UploadSlot::Rejected) => {
                        debug!(stream = %stream_id, "dropping chunk for rejected stream");
                        return;
                    }
                    None => {
                        uploads.insert(stream_key, UploadSlot::Rejected);
                        drop(uploads);
                        warn!(stream = %stream_id, "chunk for unknown stream");
                        let msg = Message::error(
                            stream_id,
                            WS_ERR_CODE_PROTOCOL_VIOLATION,
                            "chunk received before upload_open",
                        );
                        let _ = sender.send_msg(msg).await;
                        return;
                    }
                }
            };

            // Waiting here holds back the read pump until the receiver
            // catches up. A closed channel means the receiver already
            // failed and reported it.
            let _ = sink.push(StreamItem::Chunk(chunk)).await;
        })
    }

    fn on_upload_close(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let slot = self.uploads.lock().await.remove(&key(&sender, &msg.id));
            match slot {
                Some(UploadSlot::Active(sink)) => {
                    let _ = sink.finish().await;
                }
                Some(UploadSlot::Rejected) => {}
                None => {
                    let _ = sender
                        .send_error(&msg, WS_ERR_CODE_PROTOCOL_VIOLATION, "unknown upload stream")
                        .await;
                }
            }
        })
    }

    fn on_upload_abort(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let slot = self.uploads.lock().await.remove(&key(&sender, &msg.id));
            if let Some(UploadSlot::Active(sink)) = slot {
                info!(stream = %msg.id, "upload aborted by client");
                let _ = sink.abort("aborted by client").await;
            }
        })
    }

    fn on_download(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let name = match msg.parse_payload::<DownloadRequest>() {
                Ok(Some(req)) => req.name,
                Ok(None) => {
                    let _ = sender
                        .send_error(&msg, WS_ERR_CODE_BAD_REQUEST, "missing file name")
                        .await;
                    return;
                }
                Err(e) => {
                    let _ = sender
                        .send_error(&msg, WS_ERR_CODE_BAD_REQUEST, &e.to_string())
                        .await;
                    return;
                }
            };

            let root = self.root.clone();
            let config = self.transfer;
            tokio::spawn(async move {
                let mut sink = WsDownloadSink {
                    sender: sender.clone(),
                    stream_id: msg.id.clone(),
                };
                match drive_download(&root, &name, &mut sink, &config).await {
                    Ok(_) => {
                        let _ = sender
                            .send_msg(Message::empty(&msg.id, MessageType::DownloadEnd))
                            .await;
                    }
                    Err(e) => {
                        warn!(stream = %msg.id, file = %name, error = %e, "download failed");
                        let _ = sender.send_error(&msg, error_code(&e), &e.to_string()).await;
                    }
                }
            });
        })
    }

    fn on_disconnected(&self, sender: Sender) -> HandlerFuture<'_> {
        Box::pin(async move {
            let mut uploads = self.uploads.lock().await;
            let before = uploads.len();
            // Dropping an active sink ends its receiver with a non-clean close.
            uploads.retain(|(conn, _), _| conn != sender.connection_id());
            let dropped = before - uploads.len();
            if dropped > 0 {
                info!(conn = %sender.connection_id(), streams = dropped, "aborted open uploads");
            }
        })
    }
}

/// Download stream over a connection: header as text, chunks as binary.
struct WsDownloadSink {
    sender: Sender,
    stream_id: String,
}

impl ChunkSink for WsDownloadSink {
    fn send_chunk(&mut self, chunk: Vec<u8>) -> ChunkFuture<'_, ()> {
        Box::pin(async move {
            self.sender
                .send_chunk(&self.stream_id, &chunk)
                .await
                .map_err(|_| TransferError::Closed)
        })
    }
}

impl DownloadSink for WsDownloadSink {
    fn send_header(&mut self, metadata: TransferMetadata) -> ChunkFuture<'_, ()> {
        Box::pin(async move {
            let msg = Message::new(&self.stream_id, MessageType::DownloadHeader, Some(&metadata))
                .map_err(|e| TransferError::Stream(e.to_string()))?;
            self.sender
                .send_msg(msg)
                .await
                .map_err(|_| TransferError::Closed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_follow_error_kind() {
        assert_eq!(
            error_code(&TransferError::InvalidPath("x".into())),
            WS_ERR_CODE_BAD_REQUEST
        );
        assert_eq!(
            error_code(&TransferError::MetadataMissing("x".into())),
            WS_ERR_CODE_DATA_LOSS
        );
        assert_eq!(
            error_code(&TransferError::TooLarge { size: 2, limit: 1 }),
            WS_ERR_CODE_TOO_LARGE
        );
        assert_eq!(
            error_code(&TransferError::Io(std::io::Error::from(
                std::io::ErrorKind::NotFound
            ))),
            WS_ERR_CODE_NOT_FOUND
        );
        assert_eq!(
            error_code(&TransferError::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied
            ))),
            WS_ERR_CODE_INTERNAL
        );
        assert_eq!(error_code(&TransferError::Closed), WS_ERR_CODE_INTERNAL);
    }

    #[test]
    fn new_keeps_root() {
        let service = FileService::new("/srv/files", TransferConfig::default());
        assert_eq!(service.root(), Path::new("/srv/files"));
    }
}
