//! Tier error types.
//!
//! This module defines the error types returned by tier clients and the
//! tiered store.

use thiserror::Error;

/// Result type for tier operations.
pub type TierResult<T> = Result<T, TierError>;

/// Coarse classification of a [`TierError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A stream could not be opened: tier unreachable, auth failure or key
    /// not found.
    Open,
    /// I/O failed mid-transfer on a participating stream.
    Copy,
    /// A delete request failed.
    Delete,
    /// The tier is not configured well enough to attempt the operation.
    Config,
}

/// Errors that can occur during tier operations.
#[derive(Debug, Error)]
pub enum TierError {
    /// Object not found in storage.
    #[error("object not found: {key}")]
    NotFound {
        /// The object key that was not found.
        key: String,
    },

    /// A read or write stream could not be opened.
    #[error("failed to open {key}: {message}")]
    OpenFailed {
        /// The object key.
        key: String,
        /// Error message.
        message: String,
    },

    /// Reading from a source stream failed mid-transfer.
    #[error("read failed for {key}: {message}")]
    ReadFailed {
        /// The key or stream label being read.
        key: String,
        /// Error message.
        message: String,
    },

    /// Writing to a sink failed mid-transfer.
    #[error("write failed for {key}: {message}")]
    WriteFailed {
        /// The key or stream label being written.
        key: String,
        /// Error message.
        message: String,
    },

    /// Finalizing a written object failed.
    #[error("commit failed for {key}: {message}")]
    CommitFailed {
        /// The object key.
        key: String,
        /// Error message.
        message: String,
    },

    /// Delete failed.
    #[error("delete failed for {key}: {message}")]
    DeleteFailed {
        /// The object key.
        key: String,
        /// Error message.
        message: String,
    },

    /// Tier is misconfigured.
    #[error("tier configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}

impl TierError {
    /// Returns the coarse kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::OpenFailed { .. } => ErrorKind::Open,
            Self::ReadFailed { .. } | Self::WriteFailed { .. } | Self::CommitFailed { .. } => {
                ErrorKind::Copy
            }
            Self::DeleteFailed { .. } => ErrorKind::Delete,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Returns true if the object was definitely absent, as opposed to the
    /// tier being unreachable or rejecting the request.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
