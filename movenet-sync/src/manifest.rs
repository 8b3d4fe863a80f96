//! Last-published hash per variant, stored as raw hash text at
//! `{prefix}/{variant}/model_hash.txt`.

use std::sync::Arc;
use std::time::Duration;

use movenet_core::{ContentHash, ManifestEntry, Variant};

use crate::error::{PublishError, StoreError};
use crate::store::{with_timeout, ObjectStore};

#[derive(Clone)]
pub struct ManifestStore {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl ManifestStore {
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// The stored hash, or `None` when the variant was never published.
    pub async fn get(&self, variant: &Variant) -> Result<Option<ContentHash>, StoreError> {
        let key = variant.manifest_key();
        let body = with_timeout(&key, self.timeout, self.store.get(&key)).await?;
        Ok(body.and_then(|bytes| ContentHash::parse_stored(&String::from_utf8_lossy(&bytes))))
    }

    /// Overwrite the manifest in one request. Call only after every artifact
    /// upload for the variant has been acknowledged.
    pub async fn put(&self, variant: &Variant, entry: &ManifestEntry) -> Result<(), PublishError> {
        let key = variant.manifest_key();
        let body = entry.hash.as_str().as_bytes().to_vec();
        with_timeout(&key, self.timeout, self.store.put(&key, body))
            .await
            .map_err(|e| PublishError::ManifestWriteFailed {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(
            variant = %entry.variant,
            hash = %entry.hash,
            version = %entry.version,
            published_at = %entry.published_at,
            "manifest updated",
        );
        Ok(())
    }
}
