//! WebSocket write pump: the only writer on the socket.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::error;

use fileferry_protocol::constants::WS_PING_PERIOD;

use crate::types::Outbound;

/// Writes queued frames in order and pings every [`WS_PING_PERIOD`].
///
/// A tracked frame's `flushed` signal fires only after the sink has
/// flushed it, which is what lets an upload keep a single chunk in flight.
/// Frames still queued when the pump stops are dropped along with their
/// signals. A close frame goes out on the way out.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut ping = tokio::time::interval_at(Instant::now() + WS_PING_PERIOD, WS_PING_PERIOD);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = ping.tick() => {
                if let Err(e) = write.send(tungstenite::Message::Ping(vec![].into())).await {
                    error!("WebSocket ping error: {e}");
                    break;
                }
            }

            item = write_rx.recv() => {
                let Some(Outbound { frame, flushed }) = item else {
                    break;
                };
                if let Err(e) = write.send(frame).await {
                    error!("WebSocket write error: {e}");
                    break;
                }
                if let Some(flushed) = flushed {
                    let _ = flushed.send(());
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;
    use std::time::Duration;

    fn channel_sink(
        tx: mpsc::Sender<tungstenite::Message>,
    ) -> impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    fn binary(byte: u8) -> tungstenite::Message {
        tungstenite::Message::Binary(vec![byte].into())
    }

    #[tokio::test]
    async fn write_pump_preserves_order_then_closes() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(16);

        write_tx.send(Outbound::frame(binary(1))).await.unwrap();
        write_tx.send(Outbound::frame(binary(2))).await.unwrap();
        drop(write_tx);

        write_pump(channel_sink(sink_tx), write_rx, CancellationToken::new()).await;

        let mut seen = Vec::new();
        while let Some(msg) = sink_rx.recv().await {
            seen.push(msg);
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], binary(1));
        assert_eq!(seen[1], binary(2));
        assert!(matches!(seen[2], tungstenite::Message::Close(_)));
    }

    #[tokio::test]
    async fn tracked_frame_signals_after_sink_accepts_it() {
        // Capacity 1 and no reader: the second frame cannot be written.
        let (sink_tx, mut sink_rx) = mpsc::channel(1);
        let (write_tx, write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(write_pump(channel_sink(sink_tx), write_rx, cancel.clone()));

        let (first, first_flushed) = Outbound::tracked(binary(1));
        let (second, mut second_flushed) = Outbound::tracked(binary(2));
        write_tx.send(first).await.unwrap();
        write_tx.send(second).await.unwrap();

        first_flushed.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(second_flushed.try_recv().is_err(), "second frame is still blocked");

        assert_eq!(sink_rx.recv().await.unwrap(), binary(1));
        second_flushed.await.unwrap();
        assert_eq!(sink_rx.recv().await.unwrap(), binary(2));

        cancel.cancel();
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn write_pump_stops_on_cancel() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let (_write_tx, write_rx) = mpsc::channel(16);
        let handle = tokio::spawn(write_pump(channel_sink(sink_tx), write_rx, cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        let close_msg = sink_rx.recv().await;
        assert!(matches!(close_msg, Some(tungstenite::Message::Close(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn write_pump_pings_after_period() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (_write_tx, write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(write_pump(channel_sink(sink_tx), write_rx, cancel.clone()));

        let first = sink_rx.recv().await.unwrap();
        assert!(matches!(first, tungstenite::Message::Ping(_)));

        cancel.cancel();
        handle.await.unwrap();
    }
}
