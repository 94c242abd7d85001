//! Tierset CLI - put and get files through a cache tier and a permanent tier.
//!
//! `put` uploads a local file to both tiers at once. `get` downloads from the
//! cache tier, falling back to the permanent tier and warming the cache on a
//! miss. `delete` removes the object from both tiers.
//!
//! Tiers are described by a JSON config file, command-line flags, or both.
//! An endpoint of the form `file:///dir` selects a local directory tier;
//! anything else is treated as an S3-compatible endpoint.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tierset_tier::{KeyPair, S3ConfigError, Tier, TierError, TieredStore, TieredStoreConfig};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn, Level};

mod resolve;

pub use config::{ConfigError, StorageDescriptor, StorageSet};
pub use resolve::ResolvedTier;

// -----------------------------------------------------------------------------
// Command Line
// -----------------------------------------------------------------------------

/// Put and get objects from a permanent and a cache S3-compatible storage.
#[derive(Parser, Debug)]
#[command(name = "tierset")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: Level,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Put a local file onto both the permanent and cache storage.
    Put(TransferArgs),
    /// Get a file and ensure there is a local copy and a copy in the cache.
    Get(TransferArgs),
    /// Delete an object from both the permanent and cache storage.
    Delete(TierArgs),
}

/// Arguments for commands that move a local file.
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Path to the local file.
    #[arg(long)]
    pub file: PathBuf,

    /// Tier settings.
    #[command(flatten)]
    pub tiers: TierArgs,
}

/// Tier settings shared by every command.
#[derive(Args, Debug, Default)]
pub struct TierArgs {
    /// JSON file describing both tiers. Flags override its fields.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Endpoint of permanent storage server.
    #[arg(long)]
    pub permanent_endpoint: Option<String>,
    /// Bucket on permanent storage.
    #[arg(long)]
    pub permanent_bucket: Option<String>,
    /// Access Key ID for permanent storage.
    #[arg(long)]
    pub permanent_access_key_id: Option<String>,
    /// Secret Access Key for permanent storage.
    #[arg(long)]
    pub permanent_secret_access_key: Option<String>,
    /// Region of permanent storage.
    #[arg(long)]
    pub permanent_region: Option<String>,
    /// Use path-style addressing for permanent storage.
    #[arg(long)]
    pub permanent_path_style: bool,
    /// Key (path within bucket) for permanent storage.
    #[arg(long)]
    pub permanent_key: Option<String>,

    /// Endpoint of cache storage server.
    #[arg(long)]
    pub cache_endpoint: Option<String>,
    /// Bucket on cache storage.
    #[arg(long)]
    pub cache_bucket: Option<String>,
    /// Access Key ID for cache storage.
    #[arg(long)]
    pub cache_access_key_id: Option<String>,
    /// Secret Access Key for cache storage.
    #[arg(long)]
    pub cache_secret_access_key: Option<String>,
    /// Region of cache storage.
    #[arg(long)]
    pub cache_region: Option<String>,
    /// Use path-style addressing for cache storage.
    #[arg(long)]
    pub cache_path_style: bool,
    /// Key (path within bucket) for cache storage.
    #[arg(long)]
    pub cache_key: Option<String>,
}

impl TierArgs {
    /// Returns the storage settings given as flags.
    #[must_use]
    pub fn overrides(&self) -> StorageSet {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        StorageSet {
            permanent: StorageDescriptor {
                endpoint: text(&self.permanent_endpoint),
                bucket_name: text(&self.permanent_bucket),
                access_key_id: text(&self.permanent_access_key_id),
                secret_access_key: text(&self.permanent_secret_access_key),
                region: text(&self.permanent_region),
                path_style: self.permanent_path_style,
            },
            cache: StorageDescriptor {
                endpoint: text(&self.cache_endpoint),
                bucket_name: text(&self.cache_bucket),
                access_key_id: text(&self.cache_access_key_id),
                secret_access_key: text(&self.cache_secret_access_key),
                region: text(&self.cache_region),
                path_style: self.cache_path_style,
            },
        }
    }

    /// Loads the config file, if any, merges the flags over it and fills
    /// in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn storage_set(&self) -> Result<StorageSet, ConfigError> {
        let mut set = match &self.config {
            Some(path) => StorageSet::from_file(path)?,
            None => StorageSet::default(),
        };
        set.merge(&self.overrides());
        Ok(set.with_defaults())
    }

    /// Returns the key pair. When only one key is given it is used for both
    /// tiers.
    ///
    /// # Errors
    ///
    /// Returns an error if neither key is given.
    pub fn keys(&self) -> Result<KeyPair, ConfigError> {
        let given = |key: &Option<String>| key.clone().filter(|k| !k.is_empty());
        match (given(&self.cache_key), given(&self.permanent_key)) {
            (Some(cache), Some(permanent)) => Ok(KeyPair::new(cache, permanent)),
            (Some(key), None) | (None, Some(key)) => Ok(KeyPair::same(key)),
            (None, None) => Err(ConfigError::Missing {
                name: "--cache-key or --permanent-key".to_string(),
            }),
        }
    }
}

// -----------------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------------

/// Error returned by a command.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A tier operation failed.
    #[error(transparent)]
    Tier(#[from] TierError),

    /// An S3 tier could not be built from its settings.
    #[error("invalid {tier} tier settings: {source}")]
    S3 {
        /// Tier whose settings were rejected.
        tier: Tier,
        /// Underlying error.
        source: S3ConfigError,
    },

    /// The local file could not be opened, created or inspected.
    #[error("local file '{}': {source}", path.display())]
    LocalFile {
        /// Local file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

fn local_file_error(path: &Path) -> impl FnOnce(std::io::Error) -> CliError + '_ {
    move |source| CliError::LocalFile {
        path: path.to_path_buf(),
        source,
    }
}

// -----------------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------------

/// Runs one command to completion.
///
/// # Errors
///
/// Returns the first configuration, tier or local file error.
pub async fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Put(args) => put(&args).await.map(|_| ()),
        Command::Get(args) => get(&args).await.map(|_| ()),
        Command::Delete(args) => delete(&args).await,
    }
}

/// Uploads `args.file` to both tiers and returns the bytes written.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the upload fails.
pub async fn put(args: &TransferArgs) -> Result<u64, CliError> {
    let keys = args.tiers.keys()?;
    let store = build_store(&args.tiers).await?;

    let mut source = tokio::fs::File::open(&args.file)
        .await
        .map_err(local_file_error(&args.file))?;
    let written = store.upload(&keys, &mut source).await?;

    check_local_size(&args.file, written, "written").await?;
    info!(
        file = %args.file.display(),
        cache_key = %keys.cache,
        permanent_key = %keys.permanent,
        bytes = written,
        "Put complete"
    );
    Ok(written)
}

/// Downloads into a newly created `args.file` and returns the bytes read.
///
/// # Errors
///
/// Returns an error if the file cannot be created or the download fails.
pub async fn get(args: &TransferArgs) -> Result<u64, CliError> {
    let keys = args.tiers.keys()?;
    let store = build_store(&args.tiers).await?;

    let mut destination = tokio::fs::File::create(&args.file)
        .await
        .map_err(local_file_error(&args.file))?;
    let read = store.download(&keys, &mut destination).await?;
    destination
        .flush()
        .await
        .map_err(local_file_error(&args.file))?;
    drop(destination);

    check_local_size(&args.file, read, "read").await?;
    info!(
        file = %args.file.display(),
        cache_key = %keys.cache,
        permanent_key = %keys.permanent,
        bytes = read,
        "Get complete"
    );
    Ok(read)
}

/// Removes the object from both tiers.
///
/// # Errors
///
/// Returns the first delete error.
pub async fn delete(args: &TierArgs) -> Result<(), CliError> {
    let keys = args.keys()?;
    let store = build_store(args).await?;
    store.purge(&keys).await?;

    info!(
        cache_key = %keys.cache,
        permanent_key = %keys.permanent,
        "Delete complete"
    );
    Ok(())
}

/// Builds the tiered store described by `args`.
///
/// # Errors
///
/// Returns an error if the configuration cannot be resolved or a tier
/// cannot be built from it.
pub async fn build_store(
    args: &TierArgs,
) -> Result<TieredStore<ResolvedTier, ResolvedTier>, CliError> {
    let set = args.storage_set()?;
    let cache = ResolvedTier::resolve(Tier::Cache, &set.cache).await?;
    let permanent = ResolvedTier::resolve(Tier::Permanent, &set.permanent).await?;
    Ok(TieredStore::new(cache, permanent, TieredStoreConfig::default()))
}

/// Warns when the local file size differs from the transferred byte count.
async fn check_local_size(path: &Path, transferred: u64, verb: &str) -> Result<(), CliError> {
    let local = tokio::fs::metadata(path)
        .await
        .map_err(local_file_error(path))?
        .len();
    if local != transferred {
        warn!(
            file = %path.display(),
            expected = local,
            actual = transferred,
            "Byte count {verb} does not match local file size"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tierset").chain(args.iter().copied())).unwrap()
    }

    fn tier_args(cli: Cli) -> TierArgs {
        match cli.command {
            Command::Put(args) | Command::Get(args) => args.tiers,
            Command::Delete(args) => args,
        }
    }

    #[test]
    fn test_keys_both_given() {
        let args = tier_args(parse(&[
            "get",
            "--file",
            "out",
            "--cache-key",
            "c",
            "--permanent-key",
            "p",
        ]));
        assert_eq!(args.keys().unwrap(), KeyPair::new("c", "p"));
    }

    #[test]
    fn test_keys_default_to_each_other() {
        let args = tier_args(parse(&["delete", "--cache-key", "only"]));
        assert_eq!(args.keys().unwrap(), KeyPair::same("only"));

        let args = tier_args(parse(&["delete", "--permanent-key", "only"]));
        assert_eq!(args.keys().unwrap(), KeyPair::same("only"));
    }

    #[test]
    fn test_keys_missing() {
        let args = tier_args(parse(&["delete", "--cache-key", ""]));
        assert!(matches!(args.keys(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_flags_map_to_descriptors() {
        let args = tier_args(parse(&[
            "put",
            "--file",
            "in",
            "--permanent-endpoint",
            "http://localhost:9000",
            "--permanent-bucket",
            "archive",
            "--permanent-path-style",
            "--cache-bucket",
            "hot",
            "--cache-region",
            "eu-west-1",
        ]));

        let set = args.storage_set().unwrap();
        assert_eq!(set.permanent.endpoint, "http://localhost:9000");
        assert_eq!(set.permanent.bucket_name, "archive");
        assert!(set.permanent.path_style);
        assert_eq!(set.cache.bucket_name, "hot");
        assert_eq!(set.cache.region, "eu-west-1");
        assert!(!set.cache.path_style);
    }

    #[test]
    fn test_log_level_is_global() {
        let cli = parse(&["delete", "--cache-key", "k", "--log-level", "debug"]);
        assert_eq!(cli.log_level, Level::DEBUG);
    }

    #[test]
    fn test_get_requires_file() {
        let result = Cli::try_parse_from(["tierset", "get", "--cache-key", "k"]);
        assert!(result.is_err());
    }

    /// Log sink shared between a subscriber and the test.
    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_size_mismatch_warns_without_failing() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("local.bin");
        std::fs::write(&path, [0u8; 5]).unwrap();

        check_local_size(&path, 5, "written").await.unwrap();
        assert!(captured.text().is_empty());

        check_local_size(&path, 10, "written").await.unwrap();
        let logs = captured.text();
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("expected=5"), "{logs}");
        assert!(logs.contains("actual=10"), "{logs}");

        let missing = check_local_size(&dir.path().join("absent.bin"), 5, "read").await;
        assert!(matches!(missing, Err(CliError::LocalFile { .. })));
    }
}
