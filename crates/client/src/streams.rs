//! Client ends of upload and download streams.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use fileferry_protocol::constants::MessageType;
use fileferry_protocol::{Message, TransferMetadata, TransferStatus, WsError, encode_chunk_frame};
use fileferry_transfer::{ChunkFuture, ChunkSink, ChunkSource, TransferError};

use crate::types::{Outbound, StreamEvent, WriteTx};
use crate::ws_client::ClientError;

fn remote_failure(err: &WsError) -> TransferError {
    TransferError::Stream(format!("server error {}: {}", err.code, err.message))
}

// ---------------------------------------------------------------------------
// UploadStream
// ---------------------------------------------------------------------------

/// Client end of an upload: a [`ChunkSink`] plus the final status.
pub struct UploadStream {
    id: String,
    write_tx: WriteTx,
    events: mpsc::Receiver<StreamEvent>,
    timeout: Duration,
    rejection: Option<WsError>,
}

impl UploadStream {
    pub(crate) fn new(
        id: String,
        write_tx: WriteTx,
        events: mpsc::Receiver<StreamEvent>,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            write_tx,
            events,
            timeout,
            rejection: None,
        }
    }

    /// Stream id shared by every frame of this upload.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The error the server sent if it gave up on the stream early.
    pub fn rejection(&self) -> Option<ClientError> {
        self.rejection.as_ref().map(|err| ClientError::Server {
            code: err.code,
            message: err.message.clone(),
        })
    }

    /// Closes the send side and waits for the single status reply.
    ///
    /// Every chunk has already been flushed by the time this runs, so the
    /// request timeout only covers the server's final verdict.
    pub async fn close_and_recv(mut self) -> Result<TransferStatus, ClientError> {
        if let Some(err) = self.rejection() {
            return Err(err);
        }
        self.send_control(MessageType::UploadClose).await?;

        let event = tokio::time::timeout(self.timeout, self.events.recv())
            .await
            .map_err(|_| ClientError::Timeout)?;
        match event {
            Some(StreamEvent::Message(msg)) => {
                if let Some(err) = ClientError::from_reply(&msg) {
                    return Err(err);
                }
                if msg.msg_type != MessageType::UploadStatus {
                    return Err(ClientError::UnexpectedMessage(msg.msg_type));
                }
                msg.parse_payload::<TransferStatus>()?
                    .ok_or(ClientError::UnexpectedMessage(MessageType::UploadStatus))
            }
            Some(StreamEvent::Chunk(_)) => Err(ClientError::Transfer(
                TransferError::ProtocolViolation("chunk received on an upload stream".into()),
            )),
            None => Err(ClientError::Closed),
        }
    }

    /// Tells the server to discard the stream.
    pub async fn abort(self) -> Result<(), ClientError> {
        self.send_control(MessageType::UploadAbort).await
    }

    async fn send_control(&self, msg_type: MessageType) -> Result<(), ClientError> {
        let json = Message::empty(&self.id, msg_type).to_text()?;
        self.write_tx
            .send(Outbound::frame(tungstenite::Message::Text(json.into())))
            .await
            .map_err(|_| ClientError::Closed)
    }
}

impl ChunkSink for UploadStream {
    fn send_chunk(&mut self, chunk: Vec<u8>) -> ChunkFuture<'_, ()> {
        Box::pin(async move {
            // Anything arriving before close is the server giving up.
            if let Ok(StreamEvent::Message(msg)) = self.events.try_recv() {
                if let Some(err) = msg.error {
                    let failure = remote_failure(&err);
                    self.rejection = Some(err);
                    return Err(failure);
                }
            }
            if let Some(err) = &self.rejection {
                return Err(remote_failure(err));
            }

            let frame = encode_chunk_frame(&self.id, &chunk)
                .map_err(|e| TransferError::Stream(e.to_string()))?;
            let (outbound, flushed) = Outbound::tracked(tungstenite::Message::Binary(frame.into()));
            self.write_tx
                .send(outbound)
                .await
                .map_err(|_| TransferError::Closed)?;
            // One chunk in flight: the next read waits for this one to
            // reach the socket.
            flushed.await.map_err(|_| TransferError::Closed)
        })
    }
}

// ---------------------------------------------------------------------------
// DownloadStream
// ---------------------------------------------------------------------------

/// Client end of a download: header first, then a [`ChunkSource`].
pub struct DownloadStream {
    id: String,
    events: mpsc::Receiver<StreamEvent>,
    timeout: Duration,
    header: Option<TransferMetadata>,
    ended: bool,
}

impl DownloadStream {
    pub(crate) fn new(id: String, events: mpsc::Receiver<StreamEvent>, timeout: Duration) -> Self {
        Self {
            id,
            events,
            timeout,
            header: None,
            ended: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the stream header.
    ///
    /// Bounded by the request timeout. Calling it again returns the
    /// header already received.
    pub async fn header(&mut self) -> Result<TransferMetadata, ClientError> {
        if let Some(header) = &self.header {
            return Ok(header.clone());
        }

        let event = tokio::time::timeout(self.timeout, self.events.recv())
            .await
            .map_err(|_| ClientError::Timeout)?;
        match event {
            Some(StreamEvent::Message(msg)) => {
                if let Some(err) = ClientError::from_reply(&msg) {
                    return Err(err);
                }
                if msg.msg_type != MessageType::DownloadHeader {
                    return Err(ClientError::UnexpectedMessage(msg.msg_type));
                }
                let header = msg.parse_payload::<TransferMetadata>()?.ok_or_else(|| {
                    TransferError::MetadataMissing("download header without metadata".into())
                })?;
                self.header = Some(header.clone());
                Ok(header)
            }
            Some(StreamEvent::Chunk(_)) => Err(ClientError::Transfer(
                TransferError::ProtocolViolation("chunk received before header".into()),
            )),
            None => Err(ClientError::Closed),
        }
    }
}

impl ChunkSource for DownloadStream {
    fn next_chunk(&mut self) -> ChunkFuture<'_, Option<Vec<u8>>> {
        Box::pin(async move {
            if self.ended {
                return Ok(None);
            }
            if self.header.is_none() {
                return Err(TransferError::ProtocolViolation(
                    "chunks requested before the header".into(),
                ));
            }

            match self.events.recv().await {
                Some(StreamEvent::Chunk(chunk)) => Ok(Some(chunk)),
                Some(StreamEvent::Message(msg)) => {
                    if let Some(err) = &msg.error {
                        return Err(remote_failure(err));
                    }
                    match msg.msg_type {
                        MessageType::DownloadEnd => {
                            self.ended = true;
                            Ok(None)
                        }
                        other => Err(TransferError::ProtocolViolation(format!(
                            "unexpected {other:?} in download stream"
                        ))),
                    }
                }
                None => Err(TransferError::Closed),
            }
        })
    }
}
