//! Object store port and adapters.
//!
//! Keys are `/`-separated strings. Adapters:
//! - [`s3::S3ObjectStore`]: the production bucket
//! - [`fs::FsObjectStore`]: a local directory treated as a bucket
//! - [`memory::MemoryObjectStore`]: in-process, with call counters and
//!   injectable failures

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub mod fs;
pub mod memory;
pub mod s3;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write an object in a single request. Readers see either the previous
    /// object or the new one, never a partial body.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    /// Every key starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Remove an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Bound one store request; expiry becomes [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(key: &str, after: Duration, request: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(after, request).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            key: key.to_string(),
            after,
        }),
    }
}

/// MIME type for an artifact key, by extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
