use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::TransferError;

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Splits a byte stream into consecutive chunks of at most `chunk_size` bytes.
///
/// Every chunk except the last is exactly `chunk_size` long. A zero-length
/// read means end of stream and never produces an empty chunk.
pub struct ChunkReader<R = File> {
    inner: R,
    chunk_size: usize,
    offset: u64,
    eof: bool,
}

impl ChunkReader<File> {
    /// Opens `path` for chunked reading.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = File::open(path).await?;
        Ok(Self::new(file, chunk_size))
    }
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wraps any async reader. A `chunk_size` of 0 is treated as 1.
    pub fn new(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            chunk_size: chunk_size.max(1),
            offset: 0,
            eof: false,
        }
    }

    /// Reads the next chunk. Returns `None` at EOF.
    ///
    /// Keeps reading until the chunk is full so that short reads from the
    /// underlying source do not fragment the stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransferError> {
        if self.eof {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.eof = true;
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        self.offset += filled as u64;
        Ok(Some(buf))
    }

    /// Bytes handed out so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Appends chunks to a destination file in arrival order.
pub struct ChunkWriter {
    file: File,
    path: PathBuf,
    written: u64,
}

impl ChunkWriter {
    /// Creates (or truncates) the destination file.
    pub async fn create(path: &Path) -> Result<Self, TransferError> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            written: 0,
        })
    }

    /// Appends one chunk.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransferError> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes pending writes and releases the file handle.
    ///
    /// Returns the number of bytes written.
    pub async fn finish(mut self) -> Result<u64, TransferError> {
        self.file.flush().await?;
        Ok(self.written)
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
