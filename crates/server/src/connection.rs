//! Client connection management: read/write pumps, ping/pong, send buffering.

use std::sync::Arc;

use fileferry_protocol::constants::{MessageType, WS_PING_PERIOD, WS_PONG_WAIT};
use fileferry_protocol::{Message, encode_chunk_frame, parse_chunk_frame};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::SEND_BUFFER_SIZE;
use crate::handler::Handler;

/// A frame queued for the write pump.
struct Outbound {
    frame: WsMessage,
    /// Fired once the frame has been flushed to the socket.
    flushed: Option<oneshot::Sender<()>>,
}

/// Handle for sending frames to one connected client.
///
/// Cloneable and cheap: wraps an `mpsc::Sender`. Sends wait for buffer
/// space, so a slow socket slows the producer down instead of losing
/// frames. Chunk sends additionally wait for the flush, which keeps at
/// most one chunk per stream between a producer and the socket.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<Outbound>,
    connection_id: Arc<str>,
}

impl Sender {
    /// Sends a protocol [`Message`] as JSON text.
    ///
    /// Returns `Err` only if the connection is gone.
    pub async fn send_msg(&self, msg: Message) -> Result<(), SendError> {
        let json = msg.to_text().map_err(|_| SendError)?;
        self.send_frame(WsMessage::Text(json.into())).await
    }

    /// Sends an error response for the given request message.
    pub async fn send_error(&self, req: &Message, code: i32, message: &str) -> Result<(), SendError> {
        self.send_msg(req.reply_error(code, message)).await
    }

    /// Sends one chunk of `stream_id` as a binary chunk frame.
    ///
    /// Returns once the frame has been flushed to the socket.
    pub async fn send_chunk(&self, stream_id: &str, chunk: &[u8]) -> Result<(), SendError> {
        let frame = encode_chunk_frame(stream_id, chunk).map_err(|_| SendError)?;
        let (tx, flushed) = oneshot::channel();
        self.tx
            .send(Outbound {
                frame: WsMessage::Binary(frame.into()),
                flushed: Some(tx),
            })
            .await
            .map_err(|_| SendError)?;
        flushed.await.map_err(|_| SendError)
    }

    async fn send_frame(&self, frame: WsMessage) -> Result<(), SendError> {
        self.tx
            .send(Outbound {
                frame,
                flushed: None,
            })
            .await
            .map_err(|_| SendError)
    }

    /// Returns `true` if the send channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Identifier of the connection this sender writes to.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }
}

/// Error returned when the connection is closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: connection closed")]
pub struct SendError;

/// Active connection to a client.
///
/// Owns the read pump task; the handler receives the connection's
/// [`Sender`] with every message.
pub struct Connection {
    pub remote_addr: String,
    sender: Sender,
    read_handle: JoinHandle<()>,
}

impl Connection {
    pub fn id(&self) -> &str {
        self.sender.connection_id()
    }

    /// Waits until the read pump and the disconnect hook have finished.
    ///
    /// The connection ends when the peer leaves, the idle timeout fires or
    /// the server token is cancelled.
    pub async fn closed(self) {
        let _ = self.read_handle.await;
    }
}

/// Runs the read and write pumps for a WebSocket connection.
///
/// Returns the [`Connection`] handle. The pumps run as background tokio
/// tasks and stop when the peer goes away or the cancel token fires.
pub fn spawn_connection<S, H>(
    ws_stream: S,
    remote_addr: String,
    handler: Arc<H>,
    server_cancel: CancellationToken,
) -> Connection
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
    H: Handler,
{
    let (tx, rx) = mpsc::channel::<Outbound>(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();
    let sender = Sender {
        tx,
        connection_id: uuid::Uuid::new_v4().to_string().into(),
    };

    let (ws_sink, ws_stream) = ws_stream.split();

    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    let read_cancel = cancel;
    let read_sender = sender.clone();
    let addr = remote_addr.clone();
    let read_handle = tokio::spawn(async move {
        read_pump(ws_stream, read_sender.clone(), handler.clone(), read_cancel.clone()).await;
        // When the read pump exits, stop the write pump too.
        read_cancel.cancel();
        handler.on_disconnected(read_sender).await;
        tracing::info!(peer = %addr, "client disconnected");
    });

    Connection {
        remote_addr,
        sender,
        read_handle,
    }
}

/// Write pump: drains the send channel and sends WS pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<Outbound>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(Outbound { frame, flushed }) => {
                        if let Err(e) = sink.send(frame).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                        if let Some(flushed) = flushed {
                            let _ = flushed.send(());
                        }
                    }
                    None => break, // Channel closed.
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: reads WS frames and dispatches to the handler.
///
/// Any incoming frame counts as liveness; a connection silent for
/// [`WS_PONG_WAIT`] is dropped.
async fn read_pump<S, H>(mut stream: S, sender: Sender, handler: Arc<H>, cancel: CancellationToken)
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
    H: Handler,
{
    let mut idle_deadline = tokio::time::interval(WS_PONG_WAIT);
    idle_deadline.reset();
    let mut seen_traffic = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = idle_deadline.tick() => {
                if !seen_traffic {
                    tracing::warn!(conn = %sender.connection_id(), "idle timeout, closing connection");
                    break;
                }
                seen_traffic = false;
            }

            frame = stream.next() => {
                let ws_msg = match frame {
                    Some(Ok(ws_msg)) => ws_msg,
                    Some(Err(e)) => {
                        tracing::error!("read pump error: {e}");
                        break;
                    }
                    None => break, // Stream ended.
                };
                seen_traffic = true;

                match ws_msg {
                    WsMessage::Text(text) => dispatch_text(&handler, &sender, &text).await,
                    WsMessage::Binary(data) => dispatch_binary(&handler, &sender, &data).await,
                    WsMessage::Ping(data) => {
                        if sender.send_frame(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Pong(_) => {}
                    WsMessage::Close(_) => {
                        tracing::info!("received close frame");
                        break;
                    }
                    WsMessage::Frame(_) => {} // Raw frames ignored.
                }
            }
        }
    }
}

/// Dispatches a text (JSON) message to the appropriate handler method.
async fn dispatch_text<H: Handler>(handler: &Arc<H>, sender: &Sender, text: &str) {
    let msg = match Message::from_text(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("invalid message JSON: {e}");
            return;
        }
    };

    let s = sender.clone();
    match msg.msg_type {
        MessageType::Hello => handler.on_hello(s, msg).await,
        MessageType::List => handler.on_list(s, msg).await,
        MessageType::Ping => handler.on_ping(s, msg).await,
        MessageType::UploadOpen => handler.on_upload_open(s, msg).await,
        MessageType::UploadClose => handler.on_upload_close(s, msg).await,
        MessageType::UploadAbort => handler.on_upload_abort(s, msg).await,
        MessageType::Download => handler.on_download(s, msg).await,
        _ => {
            tracing::warn!(msg_type = ?msg.msg_type, "unhandled message type");
            let _ = sender.send_error(&msg, 501, "unknown message type").await;
        }
    }
}

/// Dispatches a binary chunk frame to the handler.
async fn dispatch_binary<H: Handler>(handler: &Arc<H>, sender: &Sender, data: &[u8]) {
    match parse_chunk_frame(data) {
        Ok((header, chunk)) => {
            handler
                .on_binary_chunk(sender.clone(), header.stream_id, chunk)
                .await;
        }
        Err(e) => {
            tracing::error!("failed to parse chunk frame: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_sender(capacity: usize) -> (Sender, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let sender = Sender {
            tx,
            connection_id: "conn-1".into(),
        };
        (sender, rx)
    }

    #[test]
    fn send_error_display() {
        assert!(SendError.to_string().contains("connection closed"));
    }

    #[tokio::test]
    async fn send_msg_writes_json_text() {
        let (sender, mut rx) = test_sender(1);
        sender
            .send_msg(Message::empty("id-1", MessageType::Pong))
            .await
            .unwrap();

        let out = rx.recv().await.unwrap();
        assert!(out.flushed.is_none());
        match out.frame {
            WsMessage::Text(text) => {
                let parsed: Message = serde_json::from_str(&text).unwrap();
                assert_eq!(parsed.id, "id-1");
                assert_eq!(parsed.msg_type, MessageType::Pong);
            }
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_chunk_returns_after_flush() {
        let (sender, mut rx) = test_sender(1);
        let send = tokio::spawn(async move { sender.send_chunk("s-1", b"bytes").await });

        let out = rx.recv().await.unwrap();
        match &out.frame {
            WsMessage::Binary(data) => {
                let (header, chunk) = parse_chunk_frame(data).unwrap();
                assert_eq!(header.stream_id, "s-1");
                assert_eq!(chunk, b"bytes");
            }
            other => panic!("expected binary frame, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!send.is_finished(), "chunk not flushed yet");

        out.flushed.unwrap().send(()).unwrap();
        send.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn send_chunk_fails_if_frame_is_dropped() {
        let (sender, mut rx) = test_sender(1);
        let send = tokio::spawn(async move { sender.send_chunk("s-1", b"x").await });
        drop(rx.recv().await.unwrap());
        assert!(send.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (sender, rx) = test_sender(1);
        drop(rx);
        assert!(!sender.is_connected());
        assert!(sender.send_chunk("s-1", &[1]).await.is_err());
        assert_eq!(sender.connection_id(), "conn-1");
    }

    #[tokio::test]
    async fn ping_is_answered_even_with_a_busy_buffer() {
        struct Quiet;
        impl Handler for Quiet {
            fn on_hello(&self, _sender: Sender, _msg: Message) -> crate::HandlerFuture<'_> {
                Box::pin(async {})
            }
        }

        let (sender, mut rx) = test_sender(1);
        // Fill the buffer so a non-waiting send would drop the pong.
        sender.send_msg(Message::empty("busy", MessageType::Pong)).await.unwrap();

        let frames = futures_util::stream::iter(vec![Ok(WsMessage::Ping(vec![7].into()))]);
        let pump = tokio::spawn(read_pump(
            frames,
            sender,
            Arc::new(Quiet),
            CancellationToken::new(),
        ));

        assert!(matches!(rx.recv().await.unwrap().frame, WsMessage::Text(_)));
        match rx.recv().await.unwrap().frame {
            WsMessage::Pong(data) => assert_eq!(&data[..], &[7u8]),
            other => panic!("expected pong, got {other:?}"),
        }
        pump.await.unwrap();
    }
}
