//! Tiered store: one cache tier in front of one permanent tier.
//!
//! Uploads fan out to both tiers. Downloads are served from the cache tier
//! when possible; on any cache open failure they fall back to the permanent
//! tier and warm the cache with the bytes streamed to the caller.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::TierResult;
use crate::fanout::{fan_out_copy, ChunkSink, StreamSink, CHUNK_SIZE_DEFAULT};
use crate::storage::{ObjectKey, ObjectWriter, TierClient};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// One of the two storage tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Fast-access tier, consulted first on download.
    Cache,
    /// Durable backing tier.
    Permanent,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Keys addressing one logical object in each tier.
///
/// The two keys need not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Key in the cache tier.
    pub cache: ObjectKey,
    /// Key in the permanent tier.
    pub permanent: ObjectKey,
}

impl KeyPair {
    /// Creates a key pair.
    #[must_use]
    pub fn new(cache: impl Into<String>, permanent: impl Into<String>) -> Self {
        Self {
            cache: ObjectKey::new(cache),
            permanent: ObjectKey::new(permanent),
        }
    }

    /// Creates a key pair using the same key in both tiers.
    #[must_use]
    pub fn same(key: impl Into<String>) -> Self {
        let key = ObjectKey::new(key);
        Self {
            cache: key.clone(),
            permanent: key,
        }
    }

    /// Returns the key for `tier`.
    #[must_use]
    pub const fn for_tier(&self, tier: Tier) -> &ObjectKey {
        match tier {
            Tier::Cache => &self.cache,
            Tier::Permanent => &self.permanent,
        }
    }
}

/// Configuration for the tiered store.
#[derive(Debug, Clone)]
pub struct TieredStoreConfig {
    /// Bytes read from the source per fan-out step.
    pub chunk_size: usize,
}

impl Default for TieredStoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE_DEFAULT,
        }
    }
}

impl TieredStoreConfig {
    /// Creates a config with tiny chunks so tests exercise many fan-out steps.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self { chunk_size: 7 }
    }

    /// Sets the chunk size.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        self.chunk_size = chunk_size;
        self
    }
}

// -----------------------------------------------------------------------------
// TieredStore
// -----------------------------------------------------------------------------

/// Keeps objects in a cache tier and a permanent tier at once.
///
/// Both tier clients are fixed at construction. Every call opens its own
/// streams, so a store can serve concurrent calls; concurrent writes to the
/// same keys race at the tier level and the last commit wins.
pub struct TieredStore<C: TierClient, P: TierClient> {
    cache: C,
    permanent: P,
    config: TieredStoreConfig,
}

impl<C: TierClient, P: TierClient> TieredStore<C, P> {
    /// Creates a store over the two tiers.
    #[must_use]
    pub const fn new(cache: C, permanent: P, config: TieredStoreConfig) -> Self {
        Self {
            cache,
            permanent,
            config,
        }
    }

    /// Returns the cache tier client.
    #[must_use]
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Returns the permanent tier client.
    #[must_use]
    pub const fn permanent(&self) -> &P {
        &self.permanent
    }

    /// Writes `source` to both tiers and returns the number of bytes copied.
    ///
    /// The permanent writer is opened first, then the cache writer. Every
    /// chunk must be accepted by both before the next one is read. On
    /// success the permanent object is committed before the cache object.
    /// Writers that are not committed are discarded, so a failure before
    /// the commits leaves neither tier changed.
    ///
    /// # Errors
    ///
    /// Returns the first open, read, write or commit error.
    pub async fn upload<R>(&self, keys: &KeyPair, source: &mut R) -> TierResult<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        debug!(
            cache_key = %keys.cache,
            permanent_key = %keys.permanent,
            "Starting upload"
        );

        let mut permanent_writer = self.permanent.open_writer(&keys.permanent).await?;
        let mut cache_writer = self.cache.open_writer(&keys.cache).await?;

        let copied = {
            let sinks: &mut [&mut dyn ChunkSink] = &mut [&mut permanent_writer, &mut cache_writer];
            fan_out_copy(source, "upload source", sinks, self.config.chunk_size).await?
        };

        let permanent_bytes = permanent_writer.finish().await?;
        let cache_bytes = cache_writer.finish().await?;

        // Postcondition: both tiers stored exactly what was copied.
        assert_eq!(permanent_bytes, copied, "permanent tier byte count mismatch");
        assert_eq!(cache_bytes, copied, "cache tier byte count mismatch");

        info!(
            cache_key = %keys.cache,
            permanent_key = %keys.permanent,
            bytes = copied,
            "Uploaded to both tiers"
        );
        Ok(copied)
    }

    /// Streams the object into `destination` and returns the byte count.
    ///
    /// Reads from the cache tier when it can be opened. Otherwise reads the
    /// permanent tier and writes the same bytes into the cache tier while
    /// streaming them to `destination`.
    ///
    /// Any cache open error triggers the fallback, including outages. The
    /// two cases are only told apart in the logs.
    ///
    /// # Errors
    ///
    /// Returns the permanent tier's open error when neither tier can serve
    /// the object, or the first copy or commit error.
    pub async fn download<W>(&self, keys: &KeyPair, destination: &mut W) -> TierResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        match self.cache.open_reader(&keys.cache).await {
            Ok((mut cache_reader, metadata)) => {
                debug!(
                    cache_key = %keys.cache,
                    content_length = ?metadata.content_length,
                    "Cache hit"
                );
                let mut sink = StreamSink::new(destination, "destination");
                let copied = {
                    let sinks: &mut [&mut dyn ChunkSink] = &mut [&mut sink];
                    fan_out_copy(
                        &mut cache_reader,
                        keys.cache.as_str(),
                        sinks,
                        self.config.chunk_size,
                    )
                    .await?
                };
                sink.flush().await?;

                info!(cache_key = %keys.cache, bytes = copied, "Served from cache");
                Ok(copied)
            }
            Err(e) => {
                if e.is_not_found() {
                    debug!(cache_key = %keys.cache, "Cache miss");
                } else {
                    warn!(
                        cache_key = %keys.cache,
                        error = %e,
                        "Cache tier unavailable, falling back to permanent tier"
                    );
                }
                self.warm_cache_and_download(keys, destination).await
            }
        }
    }

    /// Removes the object from both tiers.
    ///
    /// Both deletes are attempted even if the first fails.
    ///
    /// # Errors
    ///
    /// Returns the permanent tier's delete error if it failed, otherwise the
    /// cache tier's.
    pub async fn purge(&self, keys: &KeyPair) -> TierResult<()> {
        let permanent_result = self.permanent.delete(&keys.permanent).await;
        let cache_result = self.cache.delete(&keys.cache).await;

        if let Err(e) = &permanent_result {
            warn!(permanent_key = %keys.permanent, error = %e, "Permanent delete failed");
        }
        if let Err(e) = &cache_result {
            warn!(cache_key = %keys.cache, error = %e, "Cache delete failed");
        }

        permanent_result?;
        cache_result?;

        info!(
            cache_key = %keys.cache,
            permanent_key = %keys.permanent,
            "Purged from both tiers"
        );
        Ok(())
    }

    /// Fallback path of [`Self::download`].
    async fn warm_cache_and_download<W>(
        &self,
        keys: &KeyPair,
        destination: &mut W,
    ) -> TierResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let (mut permanent_reader, metadata) =
            self.permanent.open_reader(&keys.permanent).await?;
        let mut cache_writer: Box<dyn ObjectWriter> = self.cache.open_writer(&keys.cache).await?;

        let mut sink = StreamSink::new(destination, "destination");
        let copied = {
            let sinks: &mut [&mut dyn ChunkSink] = &mut [&mut sink, &mut cache_writer];
            fan_out_copy(
                &mut permanent_reader,
                keys.permanent.as_str(),
                sinks,
                self.config.chunk_size,
            )
            .await?
        };
        sink.flush().await?;
        let cached = cache_writer.finish().await?;
        drop(permanent_reader);

        assert_eq!(cached, copied, "cache tier byte count mismatch");
        if let Some(expected) = metadata.content_length {
            if expected != copied {
                warn!(
                    permanent_key = %keys.permanent,
                    expected,
                    copied,
                    "Permanent object length differs from advertised content length"
                );
            }
        }

        info!(
            cache_key = %keys.cache,
            permanent_key = %keys.permanent,
            bytes = copied,
            "Served from permanent tier and warmed cache"
        );
        Ok(copied)
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TierError};
    use crate::storage::{SimulatedTier, TierFaultConfig};

    fn create_store() -> (TieredStore<SimulatedTier, SimulatedTier>, SimulatedTier, SimulatedTier) {
        let cache = SimulatedTier::new(1);
        let permanent = SimulatedTier::new(2);
        let store = TieredStore::new(
            cache.clone(),
            permanent.clone(),
            TieredStoreConfig::for_testing(),
        );
        (store, cache, permanent)
    }

    #[tokio::test]
    async fn test_upload_writes_both_tiers() {
        let (store, cache, permanent) = create_store();
        let keys = KeyPair::new("c/obj", "p/obj");
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();

        let written = store
            .upload(&keys, &mut std::io::Cursor::new(data.clone()))
            .await
            .unwrap();

        assert_eq!(written, data.len() as u64);
        assert_eq!(cache.get_raw_content(&keys.cache).unwrap(), data);
        assert_eq!(permanent.get_raw_content(&keys.permanent).unwrap(), data);
    }

    #[tokio::test]
    async fn test_download_cache_hit_skips_permanent() {
        let (store, cache, permanent) = create_store();
        let keys = KeyPair::same("obj");
        cache.set_raw_content(&keys.cache, &b"cached"[..]);
        permanent.set_raw_content(&keys.permanent, &b"permanent"[..]);

        let mut out = Vec::new();
        let read = store.download(&keys, &mut out).await.unwrap();

        assert_eq!(read, 6);
        assert_eq!(out, b"cached");
        assert_eq!(permanent.reader_open_count(), 0);
        assert_eq!(cache.writer_open_count(), 0);
    }

    #[tokio::test]
    async fn test_download_miss_warms_cache() {
        let (store, cache, permanent) = create_store();
        let keys = KeyPair::new("c/obj", "p/obj");
        permanent.set_raw_content(&keys.permanent, &b"from permanent"[..]);

        let mut out = Vec::new();
        let read = store.download(&keys, &mut out).await.unwrap();

        assert_eq!(read, 14);
        assert_eq!(out, b"from permanent");
        assert_eq!(cache.get_raw_content(&keys.cache).unwrap(), b"from permanent");
    }

    #[tokio::test]
    async fn test_download_total_miss() {
        let (store, cache, _permanent) = create_store();
        let keys = KeyPair::same("nowhere");

        let mut out = Vec::new();
        let err = store.download(&keys, &mut out).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Open);
        assert!(err.is_not_found());
        assert!(out.is_empty());
        assert_eq!(cache.writer_open_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_cache_open_failure_leaves_permanent_untouched() {
        let (store, cache, permanent) = create_store();
        cache.fault_config().force_open_writer_fail = true;
        let keys = KeyPair::same("obj");

        let err = store
            .upload(&keys, &mut std::io::Cursor::new(b"data".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, TierError::OpenFailed { .. }));
        assert!(permanent.get_raw_content(&keys.permanent).is_none());
        assert!(cache.get_raw_content(&keys.cache).is_none());
    }

    #[tokio::test]
    async fn test_download_cache_outage_falls_back() {
        let cache = SimulatedTier::with_faults(1, TierFaultConfig::none().with_force_open_reader_fail());
        let permanent = SimulatedTier::new(2);
        let store = TieredStore::new(cache.clone(), permanent.clone(), TieredStoreConfig::default());
        let keys = KeyPair::same("obj");
        cache.set_raw_content(&keys.cache, &b"stale"[..]);
        permanent.set_raw_content(&keys.permanent, &b"fresh"[..]);

        let mut out = Vec::new();
        store.download(&keys, &mut out).await.unwrap();

        assert_eq!(out, b"fresh");
        assert_eq!(cache.get_raw_content(&keys.cache).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_purge_removes_both() {
        let (store, cache, permanent) = create_store();
        let keys = KeyPair::new("c", "p");
        cache.set_raw_content(&keys.cache, &b"x"[..]);
        permanent.set_raw_content(&keys.permanent, &b"x"[..]);

        store.purge(&keys).await.unwrap();

        assert_eq!(cache.object_count(), 0);
        assert_eq!(permanent.object_count(), 0);
    }

    #[tokio::test]
    async fn test_purge_attempts_both_on_failure() {
        let (store, cache, permanent) = create_store();
        let keys = KeyPair::same("obj");
        cache.set_raw_content(&keys.cache, &b"x"[..]);
        permanent.set_raw_content(&keys.permanent, &b"x"[..]);
        permanent.fault_config().force_delete_fail = true;

        let err = store.purge(&keys).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Delete);
        assert_eq!(cache.object_count(), 0);
        assert_eq!(permanent.object_count(), 1);
    }

    #[test]
    fn test_key_pair_for_tier() {
        let keys = KeyPair::new("c", "p");
        assert_eq!(keys.for_tier(Tier::Cache).as_str(), "c");
        assert_eq!(keys.for_tier(Tier::Permanent).as_str(), "p");
        assert_eq!(Tier::Cache.to_string(), "cache");
    }
}
