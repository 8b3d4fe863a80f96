//! Error types for movenet-sync.
//!
//! Every error here is scoped to a single variant: the orchestrator catches it,
//! marks that variant failed, and moves on.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Retrieval failures.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx response, connection error, timeout, or redirect loop.
    #[error("source unreachable ({locator}){}: {reason}", .status.map(|s| format!(" status {s}")).unwrap_or_default())]
    Unreachable {
        locator: String,
        status: Option<u16>,
        reason: String,
    },

    /// The bytes are not a usable artifact (an HTML/XML error page, a corrupt
    /// archive, an archive entry escaping the staging directory).
    #[error("invalid payload at {path}: {reason}")]
    InvalidPayload { path: PathBuf, reason: String },

    /// Writing into the staging directory failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Local read failure while hashing.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("failed to read {path} while hashing: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Publication failures. Either one leaves the manifest untouched.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("upload failed for {key}: {reason}")]
    UploadFailed { key: String, reason: String },

    #[error("manifest write failed for {key}: {reason}")]
    ManifestWriteFailed { key: String, reason: String },
}

/// Object-store adapter failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store error for {key}: {message}")]
    Backend { key: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object store request for {key} timed out after {after:?}")]
    Timeout { key: String, after: Duration },
}

/// Everything that can fail a single variant's sync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("staging directory error at {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("conversion command `{command}` failed: {reason}")]
    Convert { command: String, reason: String },

    #[error("hash failed: {0}")]
    Hash(#[from] HashError),

    #[error("manifest read failed: {0}")]
    ManifestRead(#[source] StoreError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

/// Convenience constructor for [`FetchError::Io`].
pub(crate) fn fetch_io(path: impl Into<PathBuf>, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
