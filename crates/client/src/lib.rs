//! WebSocket client for a fileferry server.
//!
//! [`WsClient`] owns the connection and correlates replies and stream
//! frames; [`FileClient`] layers the hello, list, upload and download
//! calls on top of it.

pub mod client;
pub(crate) mod pumps;
pub mod streams;
pub mod types;
pub mod ws_client;

pub use client::FileClient;
pub use streams::{DownloadStream, UploadStream};
pub use types::ClientConfig;
pub use ws_client::{ClientError, WsClient};
