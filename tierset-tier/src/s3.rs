//! S3-based tier for AWS S3 and S3-compatible services (`MinIO`,
//! `LocalStack`, ...).
//!
//! Readers stream the `GetObject` response body directly. Writers spool
//! chunks to a local temporary file and issue a single `PutObject` on
//! `finish`; a writer dropped before `finish` sends nothing.
//!
//! # Example
//!
//! ```ignore
//! use tierset_tier::{S3Config, S3Tier};
//!
//! let config = S3Config::new("my-bucket")
//!     .with_endpoint("http://localhost:9000")
//!     .with_path_style()
//!     .with_credentials("minio", "minio123");
//! let tier = S3Tier::new(config).await?;
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response as HttpResponse;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{TierError, TierResult};
use crate::storage::{ObjectKey, ObjectMetadata, ObjectReader, ObjectWriter, TierClient};

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Default region used when none is configured.
pub const REGION_DEFAULT: &str = "us-east-1";

/// Configuration for one S3 tier.
#[derive(Clone, Default)]
pub struct S3Config {
    /// S3 bucket name (required).
    pub bucket: String,

    /// AWS region.
    ///
    /// If not set, uses the default region from environment/config.
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services.
    pub endpoint_url: Option<String>,

    /// Force path-style addressing.
    ///
    /// Required for `MinIO` and `LocalStack`. AWS S3 uses virtual-hosted style.
    pub force_path_style: bool,

    /// Static access key id and secret access key.
    ///
    /// If not set, credentials come from the standard AWS credential chain.
    pub credentials: Option<(String, String)>,

    /// Directory for writer spool files.
    ///
    /// Default: the system temporary directory.
    pub spool_dir: Option<PathBuf>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .field(
                "access_key_id",
                &self.credentials.as_ref().map(|(id, _)| id.as_str()),
            )
            .field("spool_dir", &self.spool_dir)
            .finish_non_exhaustive()
    }
}

/// Error during S3 configuration or initialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum S3ConfigError {
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl S3Config {
    /// Creates a new configuration with the given bucket name.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Sets a custom endpoint URL.
    ///
    /// `https://` is prepended when the endpoint carries no scheme, so a
    /// bare host such as `s3.amazonaws.com` is accepted. An empty endpoint
    /// clears any custom endpoint and leaves the SDK default in place.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            self.endpoint_url = None;
            return self;
        }
        self.endpoint_url = Some(if endpoint.contains("://") {
            endpoint
        } else {
            format!("https://{endpoint}")
        });
        self
    }

    /// Enables path-style addressing.
    #[must_use]
    pub const fn with_path_style(mut self) -> Self {
        self.force_path_style = true;
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets static credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.credentials = Some((access_key_id.into(), secret_access_key.into()));
        self
    }

    /// Sets the spool directory used by writers.
    #[must_use]
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }
}

// -----------------------------------------------------------------------------
// S3Tier
// -----------------------------------------------------------------------------

/// Tier backed by one S3 bucket.
#[derive(Clone)]
pub struct S3Tier {
    client: aws_sdk_s3::Client,
    config: S3Config,
}

impl S3Tier {
    /// Creates a new S3 tier from configuration.
    ///
    /// Without static credentials, loads AWS credentials from the standard
    /// credential chain (environment, shared credentials file, IAM role).
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket name is empty.
    pub async fn new(config: S3Config) -> Result<Self, S3ConfigError> {
        if config.bucket.is_empty() {
            return Err(S3ConfigError::Invalid(
                "bucket name must not be empty".to_string(),
            ));
        }

        let mut aws_config_loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.region {
            aws_config_loader = aws_config_loader.region(Region::new(region.clone()));
        }

        if let Some((access_key_id, secret_access_key)) = &config.credentials {
            aws_config_loader = aws_config_loader.credentials_provider(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                "tierset-static",
            ));
        }

        let aws_config = aws_config_loader.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if aws_config.region().is_none() {
            s3_config_builder = s3_config_builder.region(Region::new(REGION_DEFAULT));
        }

        if let Some(endpoint) = &config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());

        Ok(Self { client, config })
    }
}

impl std::fmt::Debug for S3Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Tier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TierClient for S3Tier {
    async fn open_writer(&self, key: &ObjectKey) -> TierResult<Box<dyn ObjectWriter>> {
        assert!(!key.as_str().is_empty(), "key must not be empty");

        let spool = match &self.config.spool_dir {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(|e| TierError::OpenFailed {
            key: key.to_string(),
            message: format!("failed to create spool file: {e}"),
        })?;
        let handle = spool.reopen().map_err(|e| TierError::OpenFailed {
            key: key.to_string(),
            message: format!("failed to reopen spool file: {e}"),
        })?;

        Ok(Box::new(S3Writer {
            client: self.client.clone(),
            bucket: self.config.bucket.clone(),
            s3_key: key.to_string(),
            key: key.clone(),
            spool,
            file: tokio::fs::File::from_std(handle),
            written: 0,
        }))
    }

    async fn open_reader(&self, key: &ObjectKey) -> TierResult<(ObjectReader, ObjectMetadata)> {
        assert!(!key.as_str().is_empty(), "key must not be empty");

        let s3_key = key.to_string();

        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&s3_key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found_error(&e) {
                    TierError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    TierError::OpenFailed {
                        key: key.to_string(),
                        message: format!("S3 GetObject failed: {e}"),
                    }
                }
            })?;

        let metadata = ObjectMetadata {
            content_length: response
                .content_length()
                .and_then(|len| u64::try_from(len).ok()),
        };
        debug!(
            bucket = %self.config.bucket,
            key = %s3_key,
            content_length = ?metadata.content_length,
            "Opened S3 reader"
        );

        let reader: ObjectReader = Box::pin(response.body.into_async_read());
        Ok((reader, metadata))
    }

    async fn delete(&self, key: &ObjectKey) -> TierResult<()> {
        assert!(!key.as_str().is_empty(), "key must not be empty");

        let s3_key = key.to_string();

        // S3 delete is idempotent - doesn't error if key doesn't exist.
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&s3_key)
            .send()
            .await
            .map_err(|e| TierError::DeleteFailed {
                key: key.to_string(),
                message: format!("S3 DeleteObject failed: {e}"),
            })?;

        Ok(())
    }
}

/// Writer returned by [`S3Tier::open_writer`].
struct S3Writer {
    client: aws_sdk_s3::Client,
    bucket: String,
    s3_key: String,
    key: ObjectKey,
    spool: NamedTempFile,
    file: tokio::fs::File,
    written: u64,
}

#[async_trait]
impl ObjectWriter for S3Writer {
    async fn write_chunk(&mut self, chunk: &[u8]) -> TierResult<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| TierError::WriteFailed {
                key: self.key.to_string(),
                message: format!("failed to spool chunk: {e}"),
            })?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> TierResult<u64> {
        let Self {
            client,
            bucket,
            s3_key,
            key,
            spool,
            mut file,
            written,
        } = *self;
        let commit_failed = |message: String| TierError::CommitFailed {
            key: key.to_string(),
            message,
        };

        file.flush()
            .await
            .map_err(|e| commit_failed(format!("failed to flush spool file: {e}")))?;
        drop(file);

        let body = ByteStream::from_path(spool.path())
            .await
            .map_err(|e| commit_failed(format!("failed to open spool file: {e}")))?;

        client
            .put_object()
            .bucket(&bucket)
            .key(&s3_key)
            .body(body)
            .send()
            .await
            .map_err(|e| commit_failed(format!("S3 PutObject failed: {e}")))?;

        debug!(bucket = %bucket, key = %s3_key, bytes = written, "Committed S3 object");
        Ok(written)
    }
}

// -----------------------------------------------------------------------------
// Helper Functions
// -----------------------------------------------------------------------------

/// Checks if an AWS SDK error indicates a "not found" condition.
fn is_not_found_error<E>(err: &SdkError<E, HttpResponse>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => service_err.raw().status().as_u16() == 404,
        _ => false,
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
