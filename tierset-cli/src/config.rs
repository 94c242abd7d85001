//! Storage configuration from a JSON file and command-line flags.
//!
//! The file holds one object per tier:
//!
//! ```json
//! {
//!   "Permanent": { "Endpoint": "s3.amazonaws.com", "BucketName": "archive",
//!                  "AccessKeyId": "...", "SecretAccessKey": "..." },
//!   "Cache":     { "Endpoint": "http://cache.local:9000", "BucketName": "hot",
//!                  "PathStyle": true }
//! }
//! ```
//!
//! Flags are merged over the file field by field. An empty string never
//! overrides anything.

use std::path::Path;

use serde::Deserialize;

/// Endpoint used for the permanent tier when none is configured.
pub const PERMANENT_ENDPOINT_DEFAULT: &str = "s3.amazonaws.com";

/// Region used when none is configured.
pub const REGION_DEFAULT: &str = "us-east-1";

/// Connection settings for one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StorageDescriptor {
    /// Host, URL or `file:///dir` endpoint.
    pub endpoint: String,
    /// Bucket name. An empty bucket leaves the tier unconfigured.
    pub bucket_name: String,
    /// Access key id. Empty means the SDK's default credential chain.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Signing region.
    pub region: String,
    /// Use path-style addressing.
    pub path_style: bool,
}

impl StorageDescriptor {
    /// Overlays every non-empty field of `overrides` onto `self`.
    pub fn merge(&mut self, overrides: &Self) {
        fn overlay(target: &mut String, value: &str) {
            if !value.is_empty() {
                value.clone_into(target);
            }
        }

        overlay(&mut self.endpoint, &overrides.endpoint);
        overlay(&mut self.bucket_name, &overrides.bucket_name);
        overlay(&mut self.access_key_id, &overrides.access_key_id);
        overlay(&mut self.secret_access_key, &overrides.secret_access_key);
        overlay(&mut self.region, &overrides.region);
        // A flag can only switch path style on.
        self.path_style |= overrides.path_style;
    }

    /// Returns true if a bucket has been given.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.bucket_name.is_empty()
    }

    fn apply_region_default(&mut self) {
        if self.region.is_empty() {
            REGION_DEFAULT.clone_into(&mut self.region);
        }
    }
}

/// Descriptors for both tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StorageSet {
    /// Durable backing tier.
    pub permanent: StorageDescriptor,
    /// Fast-access tier.
    pub cache: StorageDescriptor,
}

impl StorageSet {
    /// Loads a storage set from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parses a storage set from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Overlays `overrides` onto both tiers.
    pub fn merge(&mut self, overrides: &Self) {
        self.permanent.merge(&overrides.permanent);
        self.cache.merge(&overrides.cache);
    }

    /// Fills in defaults for anything still empty after merging.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if self.permanent.endpoint.is_empty() {
            PERMANENT_ENDPOINT_DEFAULT.clone_into(&mut self.permanent.endpoint);
        }
        self.permanent.apply_region_default();
        self.cache.apply_region_default();
        self
    }
}

/// Error type for configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("failed to read config from {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Malformed JSON.
    #[error("failed to parse config: {message}")]
    Parse {
        /// Error message.
        message: String,
    },
    /// A required value was not supplied.
    #[error("missing required setting: {name}")]
    Missing {
        /// Setting name as the user would type it.
        name: String,
    },
}
