//! Upload pipeline: client-side driver and server-side receiver.

use std::path::{Path, PathBuf};

use fileferry_protocol::{StatusCode, TransferMetadata};
use tokio::fs::File;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::chunked::{ChunkReader, ChunkWriter};
use crate::state::TransferTracker;
use crate::stream::{ChunkSink, ChunkSource};
use crate::validation::{resolve_in_root, upload_file_name};
use crate::{TransferConfig, TransferError};

/// A local file prepared for upload.
///
/// Opening stats and opens the file up front, so a missing or unreadable
/// source fails before any stream is opened.
pub struct UploadSource {
    metadata: TransferMetadata,
    reader: ChunkReader<File>,
}

impl UploadSource {
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file_meta = tokio::fs::metadata(path).await?;
        if file_meta.is_dir() {
            return Err(TransferError::InvalidPath(format!(
                "{} is a directory",
                path.display()
            )));
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TransferError::InvalidPath(format!("no usable file name in {}", path.display()))
            })?
            .to_string();

        let reader = ChunkReader::open(path, chunk_size).await?;
        Ok(Self {
            metadata: TransferMetadata::new(filename, file_meta.len()),
            reader,
        })
    }

    /// Metadata to attach to the stream initiation.
    pub fn metadata(&self) -> &TransferMetadata {
        &self.metadata
    }

    pub fn into_parts(self) -> (TransferMetadata, ChunkReader<File>) {
        (self.metadata, self.reader)
    }
}

/// Pumps every chunk of `reader` into `sink`, one chunk in flight.
///
/// Returns the number of bytes sent. The first failed read or send aborts
/// the loop.
pub async fn send_chunks<R, S>(reader: &mut ChunkReader<R>, sink: &mut S) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
    S: ChunkSink + ?Sized,
{
    let mut sent = 0u64;
    while let Some(chunk) = reader.next_chunk().await? {
        let len = chunk.len() as u64;
        sink.send_chunk(chunk).await?;
        sent += len;
    }
    Ok(sent)
}

/// Result of a completed upload on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub status: StatusCode,
    pub path: PathBuf,
    pub declared: u64,
    pub received: u64,
}

/// Receives an upload into `root`.
///
/// The destination is the base name of the declared filename. A size
/// mismatch is reported as [`StatusCode::Failed`] and leaves the received
/// bytes in place. A non-clean end of the stream is an error and yields no
/// report.
pub async fn receive_upload<S>(
    root: &Path,
    metadata: Option<TransferMetadata>,
    source: &mut S,
    config: &TransferConfig,
) -> Result<UploadReport, TransferError>
where
    S: ChunkSource + ?Sized,
{
    let metadata = metadata.ok_or_else(|| {
        TransferError::MetadataMissing("upload stream opened without metadata".into())
    })?;

    let mut tracker = TransferTracker::new(config.max_transfer_size);
    tracker.metadata(metadata.size)?;

    let name = upload_file_name(&metadata.filename)?;
    let path = resolve_in_root(root, &name).await?;
    debug!(
        declared = %metadata.filename,
        path = %path.display(),
        size = metadata.size,
        "receiving upload"
    );

    let mut writer = ChunkWriter::create(&path).await?;
    loop {
        let chunk = match source.next_chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                tracker.fail();
                warn!(file = %name, received = tracker.received(), error = %e, "upload stream broke");
                // Whatever arrived stays on disk.
                let _ = writer.finish().await;
                return Err(e);
            }
        };
        tracker.chunk(chunk.len())?;
        writer.write_chunk(&chunk).await?;
    }
    writer.finish().await?;

    let status = if tracker.finish() {
        info!(file = %name, size = tracker.received(), "upload complete");
        StatusCode::Ok
    } else {
        warn!(
            file = %name,
            declared = tracker.declared(),
            received = tracker.received(),
            "upload size mismatch"
        );
        StatusCode::Failed
    };

    Ok(UploadReport {
        status,
        path,
        declared: tracker.declared(),
        received: tracker.received(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ChunkFuture, chunk_channel};
    use tempfile::TempDir;

    /// Sink that records chunk sizes instead of sending them anywhere.
    #[derive(Default)]
    struct CountingSink {
        sizes: Vec<usize>,
    }

    impl ChunkSink for CountingSink {
        fn send_chunk(&mut self, chunk: Vec<u8>) -> ChunkFuture<'_, ()> {
            Box::pin(async move {
                self.sizes.push(chunk.len());
                Ok(())
            })
        }
    }

    fn small_config() -> TransferConfig {
        TransferConfig {
            chunk_size: 4,
            max_transfer_size: 1024,
        }
    }

    #[tokio::test]
    async fn open_missing_file_fails_before_streaming() {
        let dir = TempDir::new().unwrap();
        let result = UploadSource::open(&dir.path().join("nope.bin"), 4).await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    #[tokio::test]
    async fn open_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = UploadSource::open(dir.path(), 4).await;
        assert!(matches!(result, Err(TransferError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn open_builds_metadata_from_base_name_and_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, b"0123456789").unwrap();

        let source = UploadSource::open(&path, 4).await.unwrap();
        assert_eq!(source.metadata().filename, "report.txt");
        assert_eq!(source.metadata().size, 10);
        assert!(!source.metadata().timestamp.is_empty());
    }

    #[tokio::test]
    async fn zero_byte_upload_sends_no_chunks_and_succeeds() {
        let src_dir = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let path = src_dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let (metadata, mut reader) = UploadSource::open(&path, 4).await.unwrap().into_parts();
        let mut counter = CountingSink::default();
        assert_eq!(send_chunks(&mut reader, &mut counter).await.unwrap(), 0);
        assert!(counter.sizes.is_empty());

        let (sink, mut source) = chunk_channel(4);
        sink.finish().await.unwrap();
        let report = receive_upload(root.path(), Some(metadata), &mut source, &small_config())
            .await
            .unwrap();

        assert_eq!(report.status, StatusCode::Ok);
        assert_eq!(report.received, 0);
        assert_eq!(std::fs::metadata(root.path().join("empty.bin")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn chunk_boundary_plus_one_sends_two_chunks() {
        let src_dir = TempDir::new().unwrap();
        let path = src_dir.path().join("five.bin");
        std::fs::write(&path, b"abcde").unwrap();

        let (_, mut reader) = UploadSource::open(&path, 4).await.unwrap().into_parts();
        let mut counter = CountingSink::default();
        assert_eq!(send_chunks(&mut reader, &mut counter).await.unwrap(), 5);
        assert_eq!(counter.sizes, vec![4, 1]);
    }

    #[tokio::test]
    async fn full_upload_through_channel() {
        let src_dir = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let path = src_dir.path().join("data.bin");
        let original: Vec<u8> = (0..37u8).collect();
        std::fs::write(&path, &original).unwrap();

        let (metadata, mut reader) = UploadSource::open(&path, 4).await.unwrap().into_parts();
        let (mut sink, mut source) = chunk_channel(2);

        let root_path = root.path().to_path_buf();
        let receiver = tokio::spawn(async move {
            receive_upload(&root_path, Some(metadata), &mut source, &small_config()).await
        });

        send_chunks(&mut reader, &mut sink).await.unwrap();
        sink.finish().await.unwrap();

        let report = receiver.await.unwrap().unwrap();
        assert_eq!(report.status, StatusCode::Ok);
        assert_eq!(report.received, 37);
        assert_eq!(std::fs::read(root.path().join("data.bin")).unwrap(), original);
    }

    #[tokio::test]
    async fn missing_metadata_is_data_loss() {
        let root = TempDir::new().unwrap();
        let (_sink, mut source) = chunk_channel(1);
        let result = receive_upload(root.path(), None, &mut source, &small_config()).await;
        assert!(matches!(result, Err(TransferError::MetadataMissing(_))));
    }

    #[tokio::test]
    async fn short_stream_reports_failed_and_keeps_bytes() {
        let root = TempDir::new().unwrap();
        let (mut sink, mut source) = chunk_channel(4);
        sink.send_chunk(b"abc".to_vec()).await.unwrap();
        sink.finish().await.unwrap();

        let metadata = TransferMetadata::new("short.bin", 10);
        let report = receive_upload(root.path(), Some(metadata), &mut source, &small_config())
            .await
            .unwrap();

        assert_eq!(report.status, StatusCode::Failed);
        assert_eq!(report.declared, 10);
        assert_eq!(report.received, 3);
        assert_eq!(std::fs::read(root.path().join("short.bin")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn broken_stream_is_an_error() {
        let root = TempDir::new().unwrap();
        let (mut sink, mut source) = chunk_channel(4);
        sink.send_chunk(b"abc".to_vec()).await.unwrap();
        drop(sink);

        let metadata = TransferMetadata::new("broken.bin", 10);
        let result = receive_upload(root.path(), Some(metadata), &mut source, &small_config()).await;
        assert!(matches!(result, Err(TransferError::Closed)));
        assert_eq!(std::fs::read(root.path().join("broken.bin")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn declared_size_over_limit_is_rejected_before_writing() {
        let root = TempDir::new().unwrap();
        let (_sink, mut source) = chunk_channel(1);
        let metadata = TransferMetadata::new("huge.bin", 4096);

        let result = receive_upload(root.path(), Some(metadata), &mut source, &small_config()).await;
        assert!(matches!(result, Err(TransferError::TooLarge { .. })));
        assert!(!root.path().join("huge.bin").exists());
    }

    #[tokio::test]
    async fn traversal_name_lands_inside_root() {
        let root = TempDir::new().unwrap();

        for declared in ["a.txt", "../a.txt"] {
            let (mut sink, mut source) = chunk_channel(4);
            sink.send_chunk(declared.as_bytes().to_vec()).await.unwrap();
            sink.finish().await.unwrap();

            let metadata = TransferMetadata::new(declared, declared.len() as u64);
            let report = receive_upload(root.path(), Some(metadata), &mut source, &small_config())
                .await
                .unwrap();
            assert_eq!(report.path, root.path().join("a.txt"));
        }

        // The second upload overwrote the first, inside the root.
        assert_eq!(std::fs::read(root.path().join("a.txt")).unwrap(), b"../a.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dangling_symlink_in_root_is_not_followed() {
        let outside = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let planted = outside.path().join("planted.txt");
        std::os::unix::fs::symlink(&planted, root.path().join("a.txt")).unwrap();

        let (mut sink, mut source) = chunk_channel(4);
        sink.send_chunk(b"pwned".to_vec()).await.unwrap();
        sink.finish().await.unwrap();

        let metadata = TransferMetadata::new("../a.txt", 5);
        let result = receive_upload(root.path(), Some(metadata), &mut source, &small_config()).await;
        assert!(matches!(result, Err(TransferError::InvalidPath(_))));
        assert!(!planted.exists());
    }

    #[tokio::test]
    async fn overwrites_existing_destination() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("x.bin"), b"old old old old").unwrap();

        let (mut sink, mut source) = chunk_channel(4);
        sink.send_chunk(b"new".to_vec()).await.unwrap();
        sink.finish().await.unwrap();

        let metadata = TransferMetadata::new("x.bin", 3);
        receive_upload(root.path(), Some(metadata), &mut source, &small_config())
            .await
            .unwrap();
        assert_eq!(std::fs::read(root.path().join("x.bin")).unwrap(), b"new");
    }
}
