//! End-to-end command tests over local `file://` tiers.

use std::path::{Path, PathBuf};

use clap::Parser;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tempfile::TempDir;
use tierset_cli::{Cli, CliError, ConfigError};
use tierset_tier::{ErrorKind, TierError};

const FILESIZE: usize = 10_000;

/// A scratch directory holding both tiers and the local files.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    fn endpoint(&self) -> String {
        format!("file://{}", self.dir.path().join("tiers").display())
    }

    fn local(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn object(&self, bucket: &str, key: &str) -> PathBuf {
        self.dir.path().join("tiers").join(bucket).join(key)
    }

    fn write_object(&self, bucket: &str, key: &str, data: &[u8]) {
        let path = self.object(bucket, key);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        std::fs::write(path, data).expect("write object");
    }

    fn tier_flags(&self, cache_bucket: &str, permanent_bucket: &str) -> Vec<String> {
        let endpoint = self.endpoint();
        let mut flags = vec![
            "--cache-endpoint".to_string(),
            endpoint.clone(),
            "--cache-bucket".to_string(),
            cache_bucket.to_string(),
        ];
        if !permanent_bucket.is_empty() {
            flags.extend([
                "--permanent-endpoint".to_string(),
                endpoint,
                "--permanent-bucket".to_string(),
                permanent_bucket.to_string(),
            ]);
        }
        flags
    }
}

fn random_content(seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; FILESIZE];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

async fn run(args: &[String]) -> Result<(), CliError> {
    let argv = std::iter::once("tierset").chain(args.iter().map(String::as_str));
    let cli = Cli::try_parse_from(argv).expect("valid arguments");
    tierset_cli::run(cli.command).await
}

fn command(name: &str, file: &Path, key: &str, flags: Vec<String>) -> Vec<String> {
    let mut args = vec![
        name.to_string(),
        "--file".to_string(),
        file.display().to_string(),
        "--cache-key".to_string(),
        key.to_string(),
    ];
    args.extend(flags);
    args
}

// -----------------------------------------------------------------------------
// put
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_put_writes_both_tiers() {
    let fixture = Fixture::new();
    let data = random_content(1);
    let local = fixture.local("upload.bin");
    std::fs::write(&local, &data).unwrap();

    run(&command(
        "put",
        &local,
        "objects/upload.bin",
        fixture.tier_flags("cache", "permanent"),
    ))
    .await
    .unwrap();

    let permanent = std::fs::read(fixture.object("permanent", "objects/upload.bin")).unwrap();
    let cache = std::fs::read(fixture.object("cache", "objects/upload.bin")).unwrap();
    assert_eq!(permanent, data);
    assert_eq!(cache, data);
}

#[tokio::test]
async fn test_put_with_distinct_keys() {
    let fixture = Fixture::new();
    let data = random_content(2);
    let local = fixture.local("upload.bin");
    std::fs::write(&local, &data).unwrap();

    let mut args = command("put", &local, "hot/copy", fixture.tier_flags("cache", "permanent"));
    args.extend(["--permanent-key".to_string(), "cold/copy".to_string()]);
    run(&args).await.unwrap();

    assert_eq!(std::fs::read(fixture.object("permanent", "cold/copy")).unwrap(), data);
    assert_eq!(std::fs::read(fixture.object("cache", "hot/copy")).unwrap(), data);
    assert!(!fixture.object("permanent", "hot/copy").exists());
}

#[tokio::test]
async fn test_put_missing_local_file() {
    let fixture = Fixture::new();
    let local = fixture.local("absent.bin");

    let result = run(&command("put", &local, "key", fixture.tier_flags("cache", "permanent"))).await;

    assert!(matches!(result, Err(CliError::LocalFile { .. })));
    assert!(!fixture.object("permanent", "key").exists());
}

#[tokio::test]
async fn test_put_without_cache_bucket_writes_nothing() {
    let fixture = Fixture::new();
    let local = fixture.local("upload.bin");
    std::fs::write(&local, random_content(3)).unwrap();

    let args = vec![
        "put".to_string(),
        "--file".to_string(),
        local.display().to_string(),
        "--permanent-key".to_string(),
        "key".to_string(),
        "--permanent-endpoint".to_string(),
        fixture.endpoint(),
        "--permanent-bucket".to_string(),
        "permanent".to_string(),
    ];
    let result = run(&args).await;

    match result {
        Err(CliError::Tier(e)) => assert_eq!(e.kind(), ErrorKind::Config),
        other => panic!("expected config error, got {other:?}"),
    }
    assert!(!fixture.object("permanent", "key").exists());
}

// -----------------------------------------------------------------------------
// get
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_get_cache_hit() {
    let fixture = Fixture::new();
    let data = random_content(4);
    fixture.write_object("cache", "object", &data);
    let local = fixture.local("download.bin");

    run(&command("get", &local, "object", fixture.tier_flags("cache", "permanent")))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&local).unwrap(), data);
    assert!(!fixture.object("permanent", "object").exists());
}

#[tokio::test]
async fn test_get_cache_only_without_permanent_settings() {
    let fixture = Fixture::new();
    let data = random_content(5);
    fixture.write_object("cache", "object", &data);
    let local = fixture.local("download.bin");

    run(&command("get", &local, "object", fixture.tier_flags("cache", "")))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&local).unwrap(), data);
}

#[tokio::test]
async fn test_get_miss_warms_cache() {
    let fixture = Fixture::new();
    let data = random_content(6);
    fixture.write_object("permanent", "object", &data);
    let local = fixture.local("download.bin");

    run(&command("get", &local, "object", fixture.tier_flags("cache", "permanent")))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&local).unwrap(), data);
    assert_eq!(std::fs::read(fixture.object("cache", "object")).unwrap(), data);
}

#[tokio::test]
async fn test_get_missing_everywhere() {
    let fixture = Fixture::new();
    let local = fixture.local("download.bin");

    let result = run(&command("get", &local, "absent", fixture.tier_flags("cache", "permanent"))).await;

    match result {
        Err(CliError::Tier(TierError::NotFound { key })) => assert_eq!(key, "absent"),
        other => panic!("expected not found, got {other:?}"),
    }
    assert!(!fixture.object("cache", "absent").exists());
}

#[tokio::test]
async fn test_get_without_key() {
    let fixture = Fixture::new();
    let local = fixture.local("download.bin");

    let mut args = vec![
        "get".to_string(),
        "--file".to_string(),
        local.display().to_string(),
    ];
    args.extend(fixture.tier_flags("cache", "permanent"));

    let result = run(&args).await;
    assert!(matches!(
        result,
        Err(CliError::Config(ConfigError::Missing { .. }))
    ));
}

// -----------------------------------------------------------------------------
// Config file
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_config_file_with_flag_override() {
    let fixture = Fixture::new();
    let data = random_content(7);
    let local = fixture.local("upload.bin");
    std::fs::write(&local, &data).unwrap();

    let config = serde_json::json!({
        "Permanent": { "Endpoint": fixture.endpoint(), "BucketName": "permanent" },
        "Cache": { "Endpoint": fixture.endpoint(), "BucketName": "cache" },
    });
    let config_path = fixture.local("tiers.json");
    std::fs::write(&config_path, config.to_string()).unwrap();

    let flags = vec![
        "--config".to_string(),
        config_path.display().to_string(),
        "--cache-bucket".to_string(),
        "override".to_string(),
    ];
    run(&command("put", &local, "object", flags)).await.unwrap();

    assert_eq!(std::fs::read(fixture.object("permanent", "object")).unwrap(), data);
    assert_eq!(std::fs::read(fixture.object("override", "object")).unwrap(), data);
    assert!(!fixture.object("cache", "object").exists());
}

#[tokio::test]
async fn test_malformed_config_file() {
    let fixture = Fixture::new();
    let local = fixture.local("upload.bin");
    std::fs::write(&local, b"data").unwrap();
    let config_path = fixture.local("tiers.json");
    std::fs::write(&config_path, "{ not json").unwrap();

    let flags = vec!["--config".to_string(), config_path.display().to_string()];
    let result = run(&command("put", &local, "object", flags)).await;

    assert!(matches!(
        result,
        Err(CliError::Config(ConfigError::Parse { .. }))
    ));
}

// -----------------------------------------------------------------------------
// delete
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_delete_removes_both_tiers() {
    let fixture = Fixture::new();
    fixture.write_object("permanent", "object", b"permanent copy");
    fixture.write_object("cache", "object", b"cache copy");

    let mut args = vec!["delete".to_string(), "--cache-key".to_string(), "object".to_string()];
    args.extend(fixture.tier_flags("cache", "permanent"));
    run(&args).await.unwrap();

    assert!(!fixture.object("permanent", "object").exists());
    assert!(!fixture.object("cache", "object").exists());

    // Deleting again succeeds.
    run(&args).await.unwrap();
}

#[tokio::test]
async fn test_put_then_get_roundtrip_through_cache() {
    let fixture = Fixture::new();
    let data = random_content(8);
    let upload = fixture.local("upload.bin");
    let download = fixture.local("download.bin");
    std::fs::write(&upload, &data).unwrap();

    let flags = || fixture.tier_flags("cache", "permanent");
    run(&command("put", &upload, "object", flags())).await.unwrap();

    // Drop the cache copy so the get has to warm it again.
    std::fs::remove_file(fixture.object("cache", "object")).unwrap();
    run(&command("get", &download, "object", flags())).await.unwrap();

    assert_eq!(std::fs::read(&download).unwrap(), data);
    assert_eq!(std::fs::read(fixture.object("cache", "object")).unwrap(), data);
}
