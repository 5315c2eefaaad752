//! WebSocket read pump: routes replies and stream frames.

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use fileferry_protocol::constants::WS_PONG_WAIT;
use fileferry_protocol::{Message, parse_chunk_frame};

use crate::types::{Outbound, PendingMap, StreamEvent, StreamMap, WriteTx};

/// Reads frames from the WebSocket and routes them.
///
/// Text replies go to the matching pending request, anything else keyed
/// by a stream id goes to that stream. Any incoming frame resets the
/// liveness deadline; silence for [`WS_PONG_WAIT`] ends the loop. On exit
/// every pending request and open stream is dropped, which their owners
/// observe as a closed connection.
pub(crate) async fn read_pump<S>(
    mut read: S,
    pending: PendingMap,
    streams: StreamMap,
    write_tx: WriteTx,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let pong_deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut pong_deadline => {
                warn!("no traffic from server, closing");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_message(&text, &pending, &streams).await;
                            }
                            tungstenite::Message::Binary(data) => {
                                handle_binary_message(&data, &streams).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx
                                    .send(Outbound::frame(tungstenite::Message::Pong(data)))
                                    .await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            tungstenite::Message::Frame(_) => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
    pending.lock().await.clear();
    streams.lock().await.clear();
}

/// Handles a text message from the WebSocket.
async fn handle_text_message(text: &str, pending: &PendingMap, streams: &StreamMap) {
    let msg = match Message::from_text(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse message: {e}");
            return;
        }
    };

    trace!(msg_type = ?msg.msg_type, id = %msg.id, "received message");

    // Route response to pending request.
    let mut map = pending.lock().await;
    if let Some(tx) = map.remove(&msg.id) {
        let _ = tx.send(msg);
        return;
    }
    drop(map);

    let id = msg.id.clone();
    let last = msg.closes_stream();
    let Some(tx) = streams.lock().await.get(&id).cloned() else {
        warn!(msg_type = ?msg.msg_type, id = %id, "no request or stream for message, dropping");
        return;
    };

    if tx.send(StreamEvent::Message(msg)).await.is_err() || last {
        streams.lock().await.remove(&id);
    }
}

/// Handles a binary chunk frame from the WebSocket.
async fn handle_binary_message(data: &[u8], streams: &StreamMap) {
    let (header, chunk) = match parse_chunk_frame(data) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("failed to parse chunk frame: {e}");
            return;
        }
    };

    let Some(tx) = streams.lock().await.get(&header.stream_id).cloned() else {
        debug!(stream = %header.stream_id, "chunk for unknown stream, dropping");
        return;
    };

    // Waiting here holds the whole connection until the stream's consumer
    // catches up.
    if tx.send(StreamEvent::Chunk(chunk)).await.is_err() {
        streams.lock().await.remove(&header.stream_id);
    }
}
