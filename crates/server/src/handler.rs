//! Handler trait for processing client messages.
//!
//! Implementors provide the file operations while the server framework
//! handles connection management, routing and the binary chunk frames.

use std::future::Future;
use std::pin::Pin;

use fileferry_protocol::Message;
use fileferry_protocol::constants::{MessageType, WS_ERR_CODE_NOT_IMPLEMENTED};

use crate::connection::Sender;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Trait for handling messages from a client.
///
/// The server dispatches parsed messages to the matching method. Each
/// method receives:
/// - `sender`: channel to send replies and stream frames back
/// - `msg`: the parsed JSON envelope
///
/// Handlers run inline on the connection's read pump, so anything that
/// outlives a single message (a chunk stream) must be spawned.
///
/// Default implementations reply with "not implemented" so handlers only
/// need to override the message types they care about.
pub trait Handler: Send + Sync + 'static {
    /// Called for `hello`.
    fn on_hello(&self, sender: Sender, msg: Message) -> HandlerFuture<'_>;

    /// Called for `list`.
    fn on_list(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `ping` messages.
    fn on_ping(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            if let Ok(reply) = msg.reply(MessageType::Pong, Option::<&()>::None) {
                let _ = sender.send_msg(reply).await;
            }
        })
    }

    /// Called for `upload_open`. `msg.id` is the stream id.
    fn on_upload_open(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for every binary chunk frame.
    fn on_binary_chunk(
        &self,
        sender: Sender,
        stream_id: String,
        _chunk: Vec<u8>,
    ) -> HandlerFuture<'_> {
        not_implemented(sender, Message::empty(stream_id, MessageType::Error))
    }

    /// Called for `upload_close`: the client finished sending chunks.
    fn on_upload_close(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `upload_abort`: the client gave up on the stream.
    fn on_upload_abort(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `download`. `msg.id` is the stream id.
    fn on_download(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called once after the connection's read pump exits.
    fn on_disconnected(&self, _sender: Sender) -> HandlerFuture<'_> {
        Box::pin(async {})
    }
}

fn not_implemented<'a>(sender: Sender, msg: Message) -> HandlerFuture<'a> {
    Box::pin(async move {
        let _ = sender
            .send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented")
            .await;
    })
}
