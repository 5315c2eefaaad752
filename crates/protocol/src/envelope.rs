//! The JSON envelope carried by every text frame.
//!
//! A unary call and its reply share an `id`. A stream uses its id for
//! every control message and for the binary chunk frames, so the same
//! envelope also says when a stream is over.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::constants::MessageType;

/// Code and text of a failed call or stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WsError>,
}

impl Message {
    /// Builds a message, serializing `payload` once up front.
    pub fn new<T: Serialize>(
        id: impl Into<String>,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let mut msg = Self::empty(id, msg_type);
        msg.payload = payload.map(serde_json::value::to_raw_value).transpose()?;
        Ok(msg)
    }

    pub fn empty(id: impl Into<String>, msg_type: MessageType) -> Self {
        Self {
            id: id.into(),
            msg_type,
            payload: None,
            error: None,
        }
    }

    /// An `error` message. For a stream this is also its last message.
    pub fn error(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        let mut msg = Self::empty(id, MessageType::Error);
        msg.error = Some(WsError {
            code,
            message: message.into(),
        });
        msg
    }

    /// Decodes a text frame.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encodes the message for a text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `Ok(None)` when the message carries no payload.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.payload
            .as_deref()
            .map(|raw| serde_json::from_str(raw.get()))
            .transpose()
    }

    /// Whether nothing else arrives on this message's stream after it.
    pub fn closes_stream(&self) -> bool {
        self.error.is_some()
            || matches!(
                self.msg_type,
                MessageType::UploadStatus | MessageType::DownloadEnd | MessageType::Error
            )
    }

    /// A reply on the same id.
    pub fn reply<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Message::new(&self.id, msg_type, payload)
    }

    /// An error reply on the same id.
    pub fn reply_error(&self, code: i32, message: impl Into<String>) -> Self {
        Message::error(&self.id, code, message)
    }
}
