//! Filesystem-based tier for local development and testing.
//!
//! Objects are stored as files under `{base_path}/{key}`. Writers stream
//! into a temporary file in the destination directory and rename it into
//! place on `finish`, so readers never observe a partial object.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{TierError, TierResult};
use crate::storage::{ObjectKey, ObjectMetadata, ObjectReader, ObjectWriter, TierClient};

const INVALID_KEY: &str = "key must be a relative path without '.' or '..' segments";

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Configuration for filesystem-based tiers.
#[derive(Debug, Clone)]
pub struct FilesystemConfig {
    /// Base directory for all objects.
    pub base_path: PathBuf,

    /// Whether to call fsync before committing an object.
    ///
    /// Default: `true`. Set to `false` for faster tests.
    pub sync_on_write: bool,

    /// Create base directory if it doesn't exist.
    ///
    /// Default: `true`.
    pub create_if_missing: bool,
}

impl FilesystemConfig {
    /// Creates a new configuration with the given base path.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            sync_on_write: true,
            create_if_missing: true,
        }
    }

    /// Creates a configuration optimized for testing (no fsync).
    #[must_use]
    pub fn for_testing(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            sync_on_write: false,
            create_if_missing: true,
        }
    }
}

// -----------------------------------------------------------------------------
// FilesystemTier
// -----------------------------------------------------------------------------

/// Tier backed by a local directory.
#[derive(Debug, Clone)]
pub struct FilesystemTier {
    config: FilesystemConfig,
}

impl FilesystemTier {
    /// Creates a new filesystem tier.
    ///
    /// # Errors
    ///
    /// Returns an error if `create_if_missing` is set and the base directory
    /// cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if `base_path` is empty.
    pub async fn new(config: FilesystemConfig) -> TierResult<Self> {
        assert!(
            !config.base_path.as_os_str().is_empty(),
            "base_path must not be empty"
        );

        if config.create_if_missing {
            tokio::fs::create_dir_all(&config.base_path)
                .await
                .map_err(|e| TierError::Config {
                    message: format!(
                        "failed to create base directory '{}': {e}",
                        config.base_path.display()
                    ),
                })?;
        }

        Ok(Self { config })
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Returns the full filesystem path for an object key.
    ///
    /// Returns `None` for keys that would resolve outside the base
    /// directory: absolute paths, `..` segments and `.` segments.
    fn object_path(&self, key: &ObjectKey) -> Option<PathBuf> {
        let relative = Path::new(key.as_str());
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        contained.then(|| self.config.base_path.join(relative))
    }
}

#[async_trait]
impl TierClient for FilesystemTier {
    async fn open_writer(&self, key: &ObjectKey) -> TierResult<Box<dyn ObjectWriter>> {
        assert!(!key.as_str().is_empty(), "key must not be empty");

        let open_failed = |message: String| TierError::OpenFailed {
            key: key.to_string(),
            message,
        };
        let path = self
            .object_path(key)
            .ok_or_else(|| open_failed(INVALID_KEY.to_string()))?;

        let parent = path
            .parent()
            .map_or_else(|| self.config.base_path.clone(), Path::to_path_buf);
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| open_failed(format!("failed to create '{}': {e}", parent.display())))?;

        // The temp file lives next to the target so the final rename stays on
        // one filesystem. It is removed when dropped unless persisted.
        let temp = NamedTempFile::new_in(&parent)
            .map_err(|e| open_failed(format!("failed to create temp file: {e}")))?;
        let handle = temp
            .reopen()
            .map_err(|e| open_failed(format!("failed to reopen temp file: {e}")))?;

        debug!(key = %key, path = %path.display(), "Opened filesystem writer");
        Ok(Box::new(FilesystemWriter {
            key: key.clone(),
            path,
            temp,
            file: tokio::fs::File::from_std(handle),
            written: 0,
            sync_on_write: self.config.sync_on_write,
        }))
    }

    async fn open_reader(&self, key: &ObjectKey) -> TierResult<(ObjectReader, ObjectMetadata)> {
        assert!(!key.as_str().is_empty(), "key must not be empty");

        let path = self.object_path(key).ok_or_else(|| TierError::OpenFailed {
            key: key.to_string(),
            message: INVALID_KEY.to_string(),
        })?;
        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TierError::NotFound {
                    key: key.to_string(),
                }
            } else {
                TierError::OpenFailed {
                    key: key.to_string(),
                    message: format!("failed to open '{}': {e}", path.display()),
                }
            }
        })?;

        let metadata = file.metadata().await.map_err(|e| TierError::OpenFailed {
            key: key.to_string(),
            message: format!("failed to stat '{}': {e}", path.display()),
        })?;
        if !metadata.is_file() {
            return Err(TierError::NotFound {
                key: key.to_string(),
            });
        }

        let reader: ObjectReader = Box::pin(file);
        Ok((
            reader,
            ObjectMetadata {
                content_length: Some(metadata.len()),
            },
        ))
    }

    async fn delete(&self, key: &ObjectKey) -> TierResult<()> {
        assert!(!key.as_str().is_empty(), "key must not be empty");

        let path = self.object_path(key).ok_or_else(|| TierError::DeleteFailed {
            key: key.to_string(),
            message: INVALID_KEY.to_string(),
        })?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Idempotent: deleting non-existent key succeeds.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TierError::DeleteFailed {
                key: key.to_string(),
                message: format!("failed to delete '{}': {e}", path.display()),
            }),
        }
    }
}

/// Writer returned by [`FilesystemTier::open_writer`].
struct FilesystemWriter {
    key: ObjectKey,
    path: PathBuf,
    temp: NamedTempFile,
    file: tokio::fs::File,
    written: u64,
    sync_on_write: bool,
}

#[async_trait]
impl ObjectWriter for FilesystemWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> TierResult<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| TierError::WriteFailed {
                key: self.key.to_string(),
                message: e.to_string(),
            })?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> TierResult<u64> {
        let Self {
            key,
            path,
            temp,
            mut file,
            written,
            sync_on_write,
        } = *self;
        let commit_failed = |message: String| TierError::CommitFailed {
            key: key.to_string(),
            message,
        };

        file.flush()
            .await
            .map_err(|e| commit_failed(format!("failed to flush: {e}")))?;
        if sync_on_write {
            file.sync_all()
                .await
                .map_err(|e| commit_failed(format!("failed to sync: {e}")))?;
        }
        drop(file);

        temp.persist(&path).map_err(|e| {
            commit_failed(format!(
                "failed to rename into '{}': {}",
                path.display(),
                e.error
            ))
        })?;

        debug!(key = %key, bytes = written, "Committed filesystem object");
        Ok(written)
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
