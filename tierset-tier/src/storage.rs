//! Tier client abstraction.
//!
//! This module provides the trait every storage tier implements (S3,
//! filesystem, simulated in-memory for tests) along with the simulated
//! backend itself.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{TierError, TierResult};
use crate::fanout::ChunkSink;

// -----------------------------------------------------------------------------
// ObjectKey
// -----------------------------------------------------------------------------

/// Object key within one tier's bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Creates a new object key from a string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata returned alongside an opened reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Size of the object in bytes, when the backend reports it.
    pub content_length: Option<u64>,
}

/// Streaming reader over one stored object.
///
/// Dropping the reader releases the underlying connection or file handle.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

// -----------------------------------------------------------------------------
// ObjectWriter Trait
// -----------------------------------------------------------------------------

/// Streaming writer for one object.
///
/// Bytes become visible under the key only after [`ObjectWriter::finish`]
/// succeeds. Dropping a writer without finishing it discards everything
/// written so far.
#[async_trait]
pub trait ObjectWriter: Send {
    /// Appends a chunk to the object being written.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk cannot be buffered or sent.
    async fn write_chunk(&mut self, chunk: &[u8]) -> TierResult<()>;

    /// Commits the object and returns the number of bytes stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be finalized.
    async fn finish(self: Box<Self>) -> TierResult<u64>;
}

#[async_trait]
impl ChunkSink for Box<dyn ObjectWriter> {
    async fn write_chunk(&mut self, chunk: &[u8]) -> TierResult<()> {
        (**self).write_chunk(chunk).await
    }
}

// -----------------------------------------------------------------------------
// TierClient Trait
// -----------------------------------------------------------------------------

/// One storage tier: a bucket on an endpoint with fixed credentials.
///
/// Implementations must be `Send + Sync`; every call opens independent
/// streams so a client can be shared without locking.
#[async_trait]
pub trait TierClient: Send + Sync {
    /// Opens a writer for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier is unreachable or rejects the request.
    async fn open_writer(&self, key: &ObjectKey) -> TierResult<Box<dyn ObjectWriter>>;

    /// Opens a reader for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::NotFound`] if the object doesn't exist, or another
    /// error if the tier is unreachable.
    async fn open_reader(&self, key: &ObjectKey) -> TierResult<(ObjectReader, ObjectMetadata)>;

    /// Deletes `key`. Deleting a missing object succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    async fn delete(&self, key: &ObjectKey) -> TierResult<()>;
}

#[async_trait]
impl<T: TierClient + ?Sized> TierClient for Box<T> {
    async fn open_writer(&self, key: &ObjectKey) -> TierResult<Box<dyn ObjectWriter>> {
        (**self).open_writer(key).await
    }

    async fn open_reader(&self, key: &ObjectKey) -> TierResult<(ObjectReader, ObjectMetadata)> {
        (**self).open_reader(key).await
    }

    async fn delete(&self, key: &ObjectKey) -> TierResult<()> {
        (**self).delete(key).await
    }
}

#[async_trait]
impl<T: TierClient + ?Sized> TierClient for Arc<T> {
    async fn open_writer(&self, key: &ObjectKey) -> TierResult<Box<dyn ObjectWriter>> {
        (**self).open_writer(key).await
    }

    async fn open_reader(&self, key: &ObjectKey) -> TierResult<(ObjectReader, ObjectMetadata)> {
        (**self).open_reader(key).await
    }

    async fn delete(&self, key: &ObjectKey) -> TierResult<()> {
        (**self).delete(key).await
    }
}

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Configuration for fault injection in [`SimulatedTier`].
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct TierFaultConfig {
    /// Probability of `open_reader` failing with an outage. Range: 0.0 - 1.0.
    pub open_reader_fail_rate: f64,
    /// Probability of `open_writer` failing. Range: 0.0 - 1.0.
    pub open_writer_fail_rate: f64,
    /// Probability of any single chunk write failing. Range: 0.0 - 1.0.
    pub write_fail_rate: f64,
    /// Probability of `delete` failing. Range: 0.0 - 1.0.
    pub delete_fail_rate: f64,
    /// If true, next `open_reader` fails as an outage (one-shot).
    pub force_open_reader_fail: bool,
    /// If true, next `open_writer` fails (one-shot).
    pub force_open_writer_fail: bool,
    /// If true, the next opened writer fails its first chunk write (one-shot).
    pub force_write_fail: bool,
    /// If true, the next opened reader fails halfway through (one-shot).
    pub force_read_fail: bool,
    /// If true, the next opened writer fails on `finish` (one-shot).
    pub force_commit_fail: bool,
    /// If true, next `delete` fails (one-shot).
    pub force_delete_fail: bool,
}

impl TierFaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a fault config that simulates a flaky remote tier.
    #[must_use]
    pub fn flaky() -> Self {
        Self {
            open_reader_fail_rate: 0.05,
            open_writer_fail_rate: 0.05,
            write_fail_rate: 0.01,
            delete_fail_rate: 0.01,
            ..Self::default()
        }
    }

    /// Sets the open-reader failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_open_reader_fail_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.open_reader_fail_rate = rate;
        self
    }

    /// Sets the open-writer failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_open_writer_fail_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.open_writer_fail_rate = rate;
        self
    }

    /// Sets the per-chunk write failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_write_fail_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.write_fail_rate = rate;
        self
    }

    /// Forces the next `open_reader` to fail (one-shot).
    #[must_use]
    pub const fn with_force_open_reader_fail(mut self) -> Self {
        self.force_open_reader_fail = true;
        self
    }

    /// Forces the next `open_writer` to fail (one-shot).
    #[must_use]
    pub const fn with_force_open_writer_fail(mut self) -> Self {
        self.force_open_writer_fail = true;
        self
    }

    /// Forces the next writer's first chunk write to fail (one-shot).
    #[must_use]
    pub const fn with_force_write_fail(mut self) -> Self {
        self.force_write_fail = true;
        self
    }

    /// Forces the next reader to fail mid-stream (one-shot).
    #[must_use]
    pub const fn with_force_read_fail(mut self) -> Self {
        self.force_read_fail = true;
        self
    }

    /// Forces the next writer's commit to fail (one-shot).
    #[must_use]
    pub const fn with_force_commit_fail(mut self) -> Self {
        self.force_commit_fail = true;
        self
    }

    /// Forces the next delete to fail (one-shot).
    #[must_use]
    pub const fn with_force_delete_fail(mut self) -> Self {
        self.force_delete_fail = true;
        self
    }
}

// -----------------------------------------------------------------------------
// SimulatedTier
// -----------------------------------------------------------------------------

/// In-memory tier for deterministic testing.
///
/// All fault injection uses a hash of the seed and an operation counter, so
/// the same seed reproduces the same fault pattern.
///
/// Clones share the same underlying objects, fault config and counters.
#[derive(Debug, Clone)]
pub struct SimulatedTier {
    objects: Arc<Mutex<HashMap<ObjectKey, Bytes>>>,
    fault_config: Arc<Mutex<TierFaultConfig>>,
    seed: u64,
    counter: Arc<AtomicU64>,
    reader_opens: Arc<AtomicU64>,
    writer_opens: Arc<AtomicU64>,
}

impl SimulatedTier {
    /// Creates a new simulated tier with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, TierFaultConfig::default())
    }

    /// Creates a new simulated tier with fault injection enabled.
    #[must_use]
    pub fn with_faults(seed: u64, config: TierFaultConfig) -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            fault_config: Arc::new(Mutex::new(config)),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
            reader_opens: Arc::new(AtomicU64::new(0)),
            writer_opens: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the fault configuration for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> std::sync::MutexGuard<'_, TierFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Gets the committed content of an object for inspection in tests.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn get_raw_content(&self, key: &ObjectKey) -> Option<Vec<u8>> {
        let objects = self.objects.lock().expect("objects lock poisoned");
        objects.get(key).map(|data| data.to_vec())
    }

    /// Sets object content directly (for simulating pre-existing data).
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn set_raw_content(&self, key: &ObjectKey, content: impl Into<Bytes>) {
        let mut objects = self.objects.lock().expect("objects lock poisoned");
        objects.insert(key.clone(), content.into());
    }

    /// Returns the number of objects stored.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn object_count(&self) -> usize {
        let objects = self.objects.lock().expect("objects lock poisoned");
        objects.len()
    }

    /// Number of `open_reader` calls made against this tier, including failed ones.
    #[must_use]
    pub fn reader_open_count(&self) -> u64 {
        self.reader_opens.load(Ordering::Relaxed)
    }

    /// Number of `open_writer` calls made against this tier, including failed ones.
    #[must_use]
    pub fn writer_open_count(&self) -> u64 {
        self.writer_opens.load(Ordering::Relaxed)
    }

    /// Deterministic RNG based on seed and counter.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self.seed.wrapping_add(counter).wrapping_mul(0x5851_f42d_4c95_7f2d);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }

    fn write_fail_rate(&self) -> f64 {
        self.fault_config().write_fail_rate
    }

    fn commit(&self, key: &ObjectKey, data: Vec<u8>) {
        let mut objects = self.objects.lock().expect("objects lock poisoned");
        let len = data.len();
        objects.insert(key.clone(), Bytes::from(data));

        // Postcondition: committed object is visible with the written length.
        assert!(
            objects.get(key).is_some_and(|v| v.len() == len),
            "data should be stored after commit"
        );
    }
}

#[allow(clippy::significant_drop_tightening)]
#[async_trait]
impl TierClient for SimulatedTier {
    async fn open_writer(&self, key: &ObjectKey) -> TierResult<Box<dyn ObjectWriter>> {
        assert!(!key.as_str().is_empty(), "object key must not be empty");
        self.writer_opens.fetch_add(1, Ordering::Relaxed);

        let mut config = self.fault_config();
        if config.force_open_writer_fail {
            config.force_open_writer_fail = false;
            drop(config);
            return Err(TierError::OpenFailed {
                key: key.to_string(),
                message: "simulated writer open failure (forced)".to_string(),
            });
        }
        let fail_first_write = std::mem::take(&mut config.force_write_fail);
        let fail_commit = std::mem::take(&mut config.force_commit_fail);
        let open_writer_fail_rate = config.open_writer_fail_rate;
        drop(config);

        if self.should_inject_fault(open_writer_fail_rate) {
            return Err(TierError::OpenFailed {
                key: key.to_string(),
                message: "simulated writer open failure (random)".to_string(),
            });
        }

        Ok(Box::new(SimulatedWriter {
            tier: self.clone(),
            key: key.clone(),
            buffer: Vec::new(),
            fail_next_write: fail_first_write,
            fail_commit,
        }))
    }

    async fn open_reader(&self, key: &ObjectKey) -> TierResult<(ObjectReader, ObjectMetadata)> {
        assert!(!key.as_str().is_empty(), "object key must not be empty");
        self.reader_opens.fetch_add(1, Ordering::Relaxed);

        let mut config = self.fault_config();
        if config.force_open_reader_fail {
            config.force_open_reader_fail = false;
            drop(config);
            return Err(TierError::OpenFailed {
                key: key.to_string(),
                message: "simulated reader open failure (forced)".to_string(),
            });
        }
        let fail_mid_read = std::mem::take(&mut config.force_read_fail);
        let open_reader_fail_rate = config.open_reader_fail_rate;
        drop(config);

        if self.should_inject_fault(open_reader_fail_rate) {
            return Err(TierError::OpenFailed {
                key: key.to_string(),
                message: "simulated reader open failure (random)".to_string(),
            });
        }

        let data = {
            let objects = self.objects.lock().expect("objects lock poisoned");
            objects.get(key).cloned().ok_or_else(|| TierError::NotFound {
                key: key.to_string(),
            })?
        };

        let metadata = ObjectMetadata {
            content_length: Some(data.len() as u64),
        };
        let fail_at = fail_mid_read.then_some(data.len() / 2);
        let reader: ObjectReader = Box::pin(SimulatedReader {
            data,
            pos: 0,
            fail_at,
        });
        Ok((reader, metadata))
    }

    async fn delete(&self, key: &ObjectKey) -> TierResult<()> {
        assert!(!key.as_str().is_empty(), "object key must not be empty");

        let mut config = self.fault_config();
        if config.force_delete_fail {
            config.force_delete_fail = false;
            drop(config);
            return Err(TierError::DeleteFailed {
                key: key.to_string(),
                message: "simulated delete failure (forced)".to_string(),
            });
        }
        let delete_fail_rate = config.delete_fail_rate;
        drop(config);

        if self.should_inject_fault(delete_fail_rate) {
            return Err(TierError::DeleteFailed {
                key: key.to_string(),
                message: "simulated delete failure (random)".to_string(),
            });
        }

        let mut objects = self.objects.lock().expect("objects lock poisoned");
        objects.remove(key);

        assert!(!objects.contains_key(key), "key should not exist after delete");
        Ok(())
    }
}

/// Writer returned by [`SimulatedTier::open_writer`].
///
/// Buffers in memory and inserts into the shared map on `finish`.
struct SimulatedWriter {
    tier: SimulatedTier,
    key: ObjectKey,
    buffer: Vec<u8>,
    fail_next_write: bool,
    fail_commit: bool,
}

#[async_trait]
impl ObjectWriter for SimulatedWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> TierResult<()> {
        if std::mem::take(&mut self.fail_next_write) {
            return Err(TierError::WriteFailed {
                key: self.key.to_string(),
                message: "simulated write failure (forced)".to_string(),
            });
        }
        let rate = self.tier.write_fail_rate();
        if self.tier.should_inject_fault(rate) {
            return Err(TierError::WriteFailed {
                key: self.key.to_string(),
                message: "simulated write failure (random)".to_string(),
            });
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> TierResult<u64> {
        if self.fail_commit {
            return Err(TierError::CommitFailed {
                key: self.key.to_string(),
                message: "simulated commit failure (forced)".to_string(),
            });
        }
        let len = self.buffer.len() as u64;
        let Self {
            tier, key, buffer, ..
        } = *self;
        tier.commit(&key, buffer);
        Ok(len)
    }
}

/// Reader returned by [`SimulatedTier::open_reader`].
///
/// When `fail_at` is set, the reader yields bytes up to that offset and then
/// returns a connection-reset error.
struct SimulatedReader {
    data: Bytes,
    pos: usize,
    fail_at: Option<usize>,
}

impl AsyncRead for SimulatedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let end = this.fail_at.unwrap_or(this.data.len());
        if this.pos >= end {
            if this.fail_at.is_some() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "simulated read failure",
                )));
            }
            return Poll::Ready(Ok(()));
        }
        let n = std::cmp::min(buf.remaining(), end - this.pos);
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
