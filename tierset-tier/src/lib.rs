//! Tierset Tier - a cache tier and a permanent tier behind one object store.
//!
//! Every object is kept in both tiers. Uploads fan out to both at once;
//! downloads prefer the cache tier and, on a miss, stream from the permanent
//! tier while writing the same bytes back into the cache.
//!
//! # Design Principles
//!
//! - **Deterministic testing**: `SimulatedTier` enables fault injection
//! - **Lockstep copies**: a chunk reaches every sink before the next is read
//! - **Explicit commits**: writers publish nothing until `finish`
//! - **No unsafe code**
//!
//! # Tier Backends
//!
//! - [`SimulatedTier`]: In-memory tier with fault injection for tests
//! - [`FilesystemTier`]: Local directory tier for development and testing
//! - `S3Tier`: S3-compatible tier (behind the `s3` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use tierset_tier::{KeyPair, SimulatedTier, TieredStore, TieredStoreConfig};
//!
//! let store = TieredStore::new(
//!     SimulatedTier::new(1),
//!     SimulatedTier::new(2),
//!     TieredStoreConfig::default(),
//! );
//!
//! let keys = KeyPair::same("reports/2024.csv");
//! store.upload(&keys, &mut source).await?;
//! store.download(&keys, &mut destination).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod fanout;
mod filesystem;
#[cfg(feature = "s3")]
mod s3;
mod storage;
mod store;

pub use error::{ErrorKind, TierError, TierResult};
pub use fanout::{fan_out_copy, ChunkSink, StreamSink, CHUNK_SIZE_DEFAULT};
pub use filesystem::{FilesystemConfig, FilesystemTier};
#[cfg(feature = "s3")]
pub use s3::{S3Config, S3ConfigError, S3Tier, REGION_DEFAULT};
pub use storage::{
    ObjectKey, ObjectMetadata, ObjectReader, ObjectWriter, SimulatedTier, TierClient,
    TierFaultConfig,
};
pub use store::{KeyPair, Tier, TieredStore, TieredStoreConfig};
