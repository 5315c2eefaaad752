//! High-level file client.

use std::path::Path;

use tracing::{debug, info, warn};

use fileferry_protocol::constants::MessageType;
use fileferry_protocol::messages::{HelloReply, HelloRequest, ListResponse};
use fileferry_protocol::{FileInfo, StatusCode};
use fileferry_transfer::{DownloadReport, UploadSource, receive_download, send_chunks};

use crate::types::ClientConfig;
use crate::ws_client::{ClientError, WsClient};

/// Client for one fileferry server.
pub struct FileClient {
    ws: WsClient,
    config: ClientConfig,
}

impl FileClient {
    /// Connects to `config.address`.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let ws = WsClient::connect(&config).await?;
        Ok(Self { ws, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends a greeting and returns the server's reply text.
    pub async fn say_hello(&self, name: &str) -> Result<String, ClientError> {
        let req = HelloRequest {
            name: name.to_string(),
        };
        let resp = self.ws.send_request(MessageType::Hello, Some(&req)).await?;
        let reply = resp
            .parse_payload::<HelloReply>()?
            .ok_or(ClientError::UnexpectedMessage(resp.msg_type))?;
        Ok(reply.message)
    }

    /// Lists the server root.
    pub async fn list(&self) -> Result<Vec<FileInfo>, ClientError> {
        let resp = self.ws.send_request::<()>(MessageType::List, None).await?;
        let list = resp
            .parse_payload::<ListResponse>()?
            .ok_or(ClientError::UnexpectedMessage(resp.msg_type))?;
        Ok(list.files)
    }

    /// Uploads the file at `path` and returns the server's verdict.
    ///
    /// A local file that can't be read fails before any stream is opened.
    /// If sending breaks partway the stream is aborted and the error
    /// returned; the server then writes no status.
    pub async fn upload(&self, path: &Path) -> Result<StatusCode, ClientError> {
        let source = UploadSource::open(path, self.config.transfer.chunk_size).await?;
        let (metadata, mut reader) = source.into_parts();

        let mut stream = self.ws.open_upload(&metadata).await?;
        let sent = match send_chunks(&mut reader, &mut stream).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(file = %metadata.filename, error = %e, "upload interrupted");
                if let Some(rejection) = stream.rejection() {
                    return Err(rejection);
                }
                if let Err(abort_err) = stream.abort().await {
                    debug!(error = %abort_err, "abort not delivered");
                }
                return Err(e.into());
            }
        };

        let status = stream.close_and_recv().await?;
        info!(
            file = %metadata.filename,
            bytes = sent,
            status = ?status.code,
            "upload finished"
        );
        Ok(status.code)
    }

    /// Downloads `name` into the configured download directory.
    pub async fn download(&self, name: &str) -> Result<DownloadReport, ClientError> {
        self.download_to(name, &self.config.download_dir).await
    }

    /// Downloads `name` into `dest_dir`.
    ///
    /// The local file is named after the header, not after `name`.
    pub async fn download_to(&self, name: &str, dest_dir: &Path) -> Result<DownloadReport, ClientError> {
        let mut stream = self.ws.open_download(name).await?;
        let header = stream.header().await?;
        debug!(file = %header.filename, size = header.size, "download header received");

        let report = receive_download(dest_dir, &header, &mut stream, &self.config.transfer).await?;
        info!(file = %name, path = %report.path.display(), bytes = report.size, "download finished");
        Ok(report)
    }

    pub fn is_connected(&self) -> bool {
        self.ws.is_connected()
    }

    /// Closes the connection.
    pub fn close(&self) {
        self.ws.close();
    }
}
