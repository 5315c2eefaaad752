//! Binary chunk frames: 4-byte big-endian header length + JSON header + raw chunk.
//!
//! ```text
//! [4 bytes BE: header_len][header_len bytes: {"streamId": "..."}][rest: chunk bytes]
//! ```

use serde::{Deserialize, Serialize};

/// Header for a binary chunk frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFrameHeader {
    /// Stream the chunk belongs to (the id of its `upload_open` or `download` message).
    pub stream_id: String,
}

/// Encodes a chunk for sending as a binary WebSocket frame.
pub fn encode_chunk_frame(stream_id: &str, chunk: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let header = ChunkFrameHeader {
        stream_id: stream_id.to_string(),
    };
    let header_json =
        serde_json::to_vec(&header).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    let header_len = u32::try_from(header_json.len())
        .map_err(|_| ProtocolError::HeaderTooLarge(header_json.len()))?;

    let mut buf = Vec::with_capacity(4 + header_json.len() + chunk.len());
    buf.extend_from_slice(&header_len.to_be_bytes());
    buf.extend_from_slice(&header_json);
    buf.extend_from_slice(chunk);
    Ok(buf)
}

/// Parses a raw binary WebSocket frame into its header and chunk bytes.
pub fn parse_chunk_frame(data: &[u8]) -> Result<(ChunkFrameHeader, Vec<u8>), ProtocolError> {
    if data.len() < 4 {
        return Err(ProtocolError::TooShort);
    }

    let header_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if data.len() - 4 < header_len {
        return Err(ProtocolError::HeaderTruncated {
            expected: header_len,
            got: data.len() - 4,
        });
    }

    let header: ChunkFrameHeader = serde_json::from_slice(&data[4..4 + header_len])
        .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    let payload = data[4 + header_len..].to_vec();

    Ok((header, payload))
}

/// Errors from binary frame encoding and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message too short (need at least 4 bytes)")]
    TooShort,

    #[error("header truncated: expected {expected} bytes, got {got}")]
    HeaderTruncated { expected: usize, got: usize },

    #[error("header too large: {0} bytes")]
    HeaderTooLarge(usize),

    #[error("invalid header JSON: {0}")]
    InvalidJson(String),
}
