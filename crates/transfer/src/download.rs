//! Download pipeline: server-side driver and client-side receiver.

use std::path::{Path, PathBuf};

use fileferry_protocol::TransferMetadata;
use tracing::{debug, info, warn};

use crate::chunked::{ChunkReader, ChunkWriter};
use crate::state::TransferTracker;
use crate::stream::{ChunkSource, DownloadSink};
use crate::upload::send_chunks;
use crate::validation::resolve_in_root;
use crate::{TransferConfig, TransferError};

/// Streams `name` from `root` into `sink`: header first, then chunks.
///
/// A failed stat is logged and the header goes out with size 0; the open
/// that follows then fails and ends the stream with an error. Returns the
/// number of bytes sent.
pub async fn drive_download<S>(
    root: &Path,
    name: &str,
    sink: &mut S,
    config: &TransferConfig,
) -> Result<u64, TransferError>
where
    S: DownloadSink + ?Sized,
{
    let path = resolve_in_root(root, name).await?;

    let size = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(file = %name, error = %e, "stat failed, sending empty header");
            0
        }
    };

    sink.send_header(TransferMetadata::new(name, size)).await?;
    debug!(file = %name, size, "download header sent");

    let mut reader = ChunkReader::open(&path, config.chunk_size).await?;
    let sent = send_chunks(&mut reader, sink).await?;
    info!(file = %name, bytes = sent, "download sent");
    Ok(sent)
}

/// Result of a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub size: u64,
}

/// Writes a download into `dest_dir` under the name carried by the header.
///
/// The destination is truncated on open. Ending with fewer or more bytes
/// than the header declared is [`TransferError::SizeMismatch`]; the bytes
/// received so far stay on disk.
pub async fn receive_download<S>(
    dest_dir: &Path,
    header: &TransferMetadata,
    source: &mut S,
    config: &TransferConfig,
) -> Result<DownloadReport, TransferError>
where
    S: ChunkSource + ?Sized,
{
    let path = resolve_in_root(dest_dir, &header.filename).await?;

    let mut tracker = TransferTracker::new(config.max_transfer_size);
    tracker.metadata(header.size)?;

    let mut writer = ChunkWriter::create(&path).await?;

    loop {
        let chunk = match source.next_chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                let _ = writer.finish().await;
                return Err(e);
            }
        };
        tracker.chunk(chunk.len())?;
        writer.write_chunk(&chunk).await?;
    }
    let written = writer.finish().await?;

    if !tracker.finish() {
        return Err(TransferError::SizeMismatch {
            declared: header.size,
            received: tracker.received(),
        });
    }

    info!(file = %header.filename, size = written, "download complete");
    Ok(DownloadReport {
        path,
        size: written,
    })
}
