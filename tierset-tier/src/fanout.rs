//! Synchronized multi-writer copy.
//!
//! [`fan_out_copy`] reads one source in chunks and hands every chunk to all
//! sinks before reading the next one, so no sink can lag behind another.

use async_trait::async_trait;
use futures::future::try_join_all;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{TierError, TierResult};

/// Default copy chunk size (64 KiB).
pub const CHUNK_SIZE_DEFAULT: usize = 64 * 1024;

/// Destination of a fan-out copy.
#[async_trait]
pub trait ChunkSink: Send {
    /// Writes the whole chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink rejects the chunk.
    async fn write_chunk(&mut self, chunk: &[u8]) -> TierResult<()>;
}

/// Adapts a tokio [`AsyncWrite`] into a [`ChunkSink`].
///
/// `label` names the stream in errors (a file path, "destination", ...).
pub struct StreamSink<'a, W: ?Sized> {
    inner: &'a mut W,
    label: String,
}

impl<'a, W: AsyncWrite + Unpin + Send + ?Sized> StreamSink<'a, W> {
    /// Wraps `inner`.
    pub fn new(inner: &'a mut W, label: impl Into<String>) -> Self {
        Self {
            inner,
            label: label.into(),
        }
    }

    /// Flushes the wrapped writer.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::WriteFailed`] if the flush fails.
    pub async fn flush(&mut self) -> TierResult<()> {
        self.inner
            .flush()
            .await
            .map_err(|e| TierError::WriteFailed {
                key: self.label.clone(),
                message: format!("flush failed: {e}"),
            })
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + ?Sized> ChunkSink for StreamSink<'_, W> {
    async fn write_chunk(&mut self, chunk: &[u8]) -> TierResult<()> {
        self.inner
            .write_all(chunk)
            .await
            .map_err(|e| TierError::WriteFailed {
                key: self.label.clone(),
                message: e.to_string(),
            })
    }
}

/// Copies `source` into every sink in lockstep and returns the byte count.
///
/// Each chunk is written to all sinks concurrently and all writes must
/// succeed before the next read. The first sink error aborts the copy.
///
/// # Errors
///
/// Returns [`TierError::ReadFailed`] labelled with `source_label` if reading
/// fails, or the failing sink's error.
///
/// # Panics
///
/// Panics if `sinks` is empty or `chunk_size` is zero.
pub async fn fan_out_copy<R>(
    source: &mut R,
    source_label: &str,
    sinks: &mut [&mut dyn ChunkSink],
    chunk_size: usize,
) -> TierResult<u64>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    assert!(!sinks.is_empty(), "fan-out needs at least one sink");
    assert!(chunk_size > 0, "chunk size must be positive");

    let mut buf = vec![0u8; chunk_size];
    let mut total: u64 = 0;

    loop {
        let n = source
            .read(&mut buf)
            .await
            .map_err(|e| TierError::ReadFailed {
                key: source_label.to_string(),
                message: e.to_string(),
            })?;
        if n == 0 {
            break;
        }

        let chunk = &buf[..n];
        try_join_all(sinks.iter_mut().map(|sink| sink.write_chunk(chunk))).await?;
        total += n as u64;
    }

    Ok(total)
}
