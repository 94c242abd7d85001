//! Turning a storage descriptor into a tier client.

use std::path::PathBuf;

use async_trait::async_trait;
use tierset_tier::{
    FilesystemConfig, FilesystemTier, ObjectKey, ObjectMetadata, ObjectReader, ObjectWriter,
    S3Config, S3Tier, Tier, TierClient, TierError, TierResult,
};
use tracing::debug;

use crate::config::StorageDescriptor;
use crate::CliError;

const FILE_SCHEME: &str = "file://";

/// Tier client selected from a descriptor's endpoint.
#[derive(Debug)]
pub enum ResolvedTier {
    /// S3-compatible endpoint.
    S3(S3Tier),
    /// `file:///dir` endpoint, rooted at `dir/<bucket>`.
    Filesystem(FilesystemTier),
    /// No bucket was given. Every operation fails with a config error.
    Unconfigured(Tier),
}

impl ResolvedTier {
    /// Builds the client for `tier` from `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 client cannot be configured or the local
    /// directory cannot be created.
    pub async fn resolve(tier: Tier, descriptor: &StorageDescriptor) -> Result<Self, CliError> {
        if !descriptor.is_configured() {
            debug!(tier = %tier, "No bucket configured");
            return Ok(Self::Unconfigured(tier));
        }

        if let Some(dir) = descriptor.endpoint.strip_prefix(FILE_SCHEME) {
            let root = PathBuf::from(dir).join(&descriptor.bucket_name);
            debug!(tier = %tier, root = %root.display(), "Using filesystem tier");
            let filesystem = FilesystemTier::new(FilesystemConfig::new(root)).await?;
            return Ok(Self::Filesystem(filesystem));
        }

        let config = s3_config(descriptor);
        debug!(
            tier = %tier,
            endpoint = %descriptor.endpoint,
            bucket = %descriptor.bucket_name,
            "Using S3 tier"
        );
        let s3 = S3Tier::new(config)
            .await
            .map_err(|source| CliError::S3 { tier, source })?;
        Ok(Self::S3(s3))
    }

    fn unconfigured(tier: Tier) -> TierError {
        TierError::Config {
            message: format!("{tier} tier is not configured: --{tier}-bucket is required"),
        }
    }
}

/// Maps a descriptor onto S3 client settings.
///
/// An empty endpoint leaves the SDK's default endpoint for the region.
fn s3_config(descriptor: &StorageDescriptor) -> S3Config {
    let mut config = S3Config::new(&descriptor.bucket_name);
    if !descriptor.endpoint.is_empty() {
        config = config.with_endpoint(&descriptor.endpoint);
    }
    if !descriptor.region.is_empty() {
        config = config.with_region(&descriptor.region);
    }
    if descriptor.path_style {
        config = config.with_path_style();
    }
    if !descriptor.access_key_id.is_empty() {
        config = config.with_credentials(&descriptor.access_key_id, &descriptor.secret_access_key);
    }
    config
}

#[async_trait]
impl TierClient for ResolvedTier {
    async fn open_writer(&self, key: &ObjectKey) -> TierResult<Box<dyn ObjectWriter>> {
        match self {
            Self::S3(tier) => tier.open_writer(key).await,
            Self::Filesystem(tier) => tier.open_writer(key).await,
            Self::Unconfigured(tier) => Err(Self::unconfigured(*tier)),
        }
    }

    async fn open_reader(&self, key: &ObjectKey) -> TierResult<(ObjectReader, ObjectMetadata)> {
        match self {
            Self::S3(tier) => tier.open_reader(key).await,
            Self::Filesystem(tier) => tier.open_reader(key).await,
            Self::Unconfigured(tier) => Err(Self::unconfigured(*tier)),
        }
    }

    async fn delete(&self, key: &ObjectKey) -> TierResult<()> {
        match self {
            Self::S3(tier) => tier.delete(key).await,
            Self::Filesystem(tier) => tier.delete(key).await,
            Self::Unconfigured(tier) => Err(Self::unconfigured(*tier)),
        }
    }
}
