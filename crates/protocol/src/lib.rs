pub mod binary;
pub mod constants;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use binary::{ChunkFrameHeader, ProtocolError, encode_chunk_frame, parse_chunk_frame};
pub use constants::MessageType;
pub use envelope::{Message, WsError};
pub use messages::{FileInfo, StatusCode, TransferMetadata, TransferStatus};
