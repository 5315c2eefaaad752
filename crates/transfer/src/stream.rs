//! Transport seams for chunk streams.
//!
//! The pipelines only see [`ChunkSink`] and [`ChunkSource`]. The server and
//! client crates implement them over WebSocket frames; [`chunk_channel`]
//! implements them over an in-process mpsc channel.

use std::future::Future;
use std::pin::Pin;

use fileferry_protocol::TransferMetadata;
use tokio::sync::mpsc;

use crate::TransferError;

/// A boxed future returned by sink and source methods.
pub type ChunkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// Outgoing side of a chunk stream.
pub trait ChunkSink: Send {
    /// Sends one chunk. Chunks arrive at the peer in call order.
    fn send_chunk(&mut self, chunk: Vec<u8>) -> ChunkFuture<'_, ()>;
}

/// Outgoing side of a download: header first, then chunks.
pub trait DownloadSink: ChunkSink {
    /// Sends the transfer metadata. Called exactly once, before any chunk.
    fn send_header(&mut self, metadata: TransferMetadata) -> ChunkFuture<'_, ()>;
}

/// Incoming side of a chunk stream.
pub trait ChunkSource: Send {
    /// Returns the next chunk, `Ok(None)` on a clean end of stream, or an
    /// error when the peer aborted or the transport went away.
    fn next_chunk(&mut self) -> ChunkFuture<'_, Option<Vec<u8>>>;
}

// ---------------------------------------------------------------------------
// Channel implementation
// ---------------------------------------------------------------------------

/// Item carried by the in-process chunk channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Chunk(Vec<u8>),
    /// Clean end of stream.
    End,
    /// Sender gave up; the string is the reason.
    Abort(String),
}

/// Creates a bounded chunk channel holding at most `capacity` items.
pub fn chunk_channel(capacity: usize) -> (ChannelSink, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink { tx }, ChannelSource { rx, done: false })
}

/// Sending half of [`chunk_channel`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<StreamItem>,
}

impl ChannelSink {
    /// Pushes a raw item, waiting for capacity.
    pub async fn push(&self, item: StreamItem) -> Result<(), TransferError> {
        self.tx.send(item).await.map_err(|_| TransferError::Closed)
    }

    /// Signals a clean end of stream.
    pub async fn finish(&self) -> Result<(), TransferError> {
        self.push(StreamItem::End).await
    }

    /// Signals that the stream was abandoned.
    pub async fn abort(&self, reason: impl Into<String>) -> Result<(), TransferError> {
        self.push(StreamItem::Abort(reason.into())).await
    }
}

impl ChunkSink for ChannelSink {
    fn send_chunk(&mut self, chunk: Vec<u8>) -> ChunkFuture<'_, ()> {
        Box::pin(async move { self.push(StreamItem::Chunk(chunk)).await })
    }
}

/// Receiving half of [`chunk_channel`].
///
/// A channel whose senders all drop without [`StreamItem::End`] yields
/// [`TransferError::Closed`], never a clean end.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<StreamItem>,
    done: bool,
}

impl ChunkSource for ChannelSource {
    fn next_chunk(&mut self) -> ChunkFuture<'_, Option<Vec<u8>>> {
        Box::pin(async move {
            if self.done {
                return Ok(None);
            }
            match self.rx.recv().await {
                Some(StreamItem::Chunk(chunk)) => Ok(Some(chunk)),
                Some(StreamItem::End) => {
                    self.done = true;
                    Ok(None)
                }
                Some(StreamItem::Abort(reason)) => Err(TransferError::Stream(reason)),
                None => Err(TransferError::Closed),
            }
        })
    }
}
